//! Print callbacks invoked from inside foreign calls
//!
//! The compiled library reports progress and diagnostics by calling back
//! into the host synchronously, possibly from deep inside `sample` or
//! `pathfinder`. A sink must never unwind across that boundary, so every
//! invocation goes through [`PrintCallback::emit`], which contains panics.

use std::fmt;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

type Sink = dyn Fn(&str, bool) + Send + Sync;

/// A print sink receiving `(message, is_error)`
#[derive(Clone)]
pub struct PrintCallback {
    sink: Arc<Sink>,
}

impl PrintCallback {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Sink that writes to stdout, or stderr for error output
    pub fn stdio() -> Self {
        Self::new(|msg, is_error| {
            if is_error {
                eprint!("{}", msg);
            } else {
                print!("{}", msg);
            }
        })
    }

    /// Deliver one message. A panicking sink is logged and swallowed.
    pub fn emit(&self, message: &str, is_error: bool) {
        let sink = &self.sink;
        let outcome = catch_unwind(AssertUnwindSafe(|| sink(message, is_error)));
        if outcome.is_err() {
            tracing::warn!("print callback panicked; message dropped");
        }
    }
}

impl fmt::Debug for PrintCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrintCallback").finish_non_exhaustive()
    }
}

/// Callback the native trampoline forwards to
static INSTALLED: RwLock<Option<PrintCallback>> = RwLock::new(None);

/// Make `callback` the process-wide target of [`print_trampoline`],
/// replacing whatever was installed before
pub(crate) fn install(callback: Option<PrintCallback>) {
    match INSTALLED.write() {
        Ok(mut slot) => *slot = callback,
        Err(poisoned) => *poisoned.into_inner() = callback,
    }
}

/// Entry point handed to `tinystan_set_print_callback`
///
/// # Safety
/// Called by the library with `msg` pointing to `len` readable bytes.
pub(crate) unsafe extern "C" fn print_trampoline(msg: *const c_char, len: usize, is_error: bool) {
    if msg.is_null() {
        return;
    }
    let bytes = std::slice::from_raw_parts(msg as *const u8, len);
    let text = String::from_utf8_lossy(bytes);

    let callback = match INSTALLED.read() {
        Ok(slot) => slot.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    if let Some(callback) = callback {
        callback.emit(&text, is_error);
    }
}
