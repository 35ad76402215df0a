//! Error propagation across the foreign boundary
//!
//! A fallible entry point returns a status and writes an error object
//! through an out-parameter cell we allocate. [`ErrorCell`] owns that cell
//! for exactly one call:
//!
//! 1. status zero: free the cell without reading it
//! 2. status non-zero: read the error handle, take its message and type,
//!    destroy the error object, free the cell, echo, then fail
//!
//! A cell that is never checked (an early `?` between allocation and the
//! call) is freed on drop without being read.

use crate::error::{Result, StanError};
use crate::ffi::{ErrorPtr, PrintCallback, Ptr, StanErrorKind, StanModule};
use std::os::raw::c_int;

/// Out-parameter cell for one fallible foreign call
pub struct ErrorCell<'m, M: StanModule + ?Sized> {
    module: &'m M,
    cell: Option<Ptr>,
    echo: Option<&'m PrintCallback>,
}

impl<'m, M: StanModule + ?Sized> ErrorCell<'m, M> {
    /// Allocate a zeroed pointer-sized cell
    pub fn new(module: &'m M) -> Result<Self> {
        let size = module.ptr_size();
        let cell = module.malloc(size);
        if cell.is_null() {
            return Err(StanError::Allocation { bytes: size });
        }
        // A failing call that writes nothing must read back as NULL.
        unsafe { module.write_bytes(cell, &vec![0u8; size]) };
        tracing::trace!(?cell, "error cell");

        Ok(Self {
            module,
            cell: Some(cell),
            echo: None,
        })
    }

    /// Also deliver a foreign error message to `sink` before failing
    pub fn echo_to(mut self, sink: Option<&'m PrintCallback>) -> Self {
        self.echo = sink;
        self
    }

    /// Address to pass as the call's error out-parameter
    pub fn ptr(&self) -> Ptr {
        self.cell.unwrap_or(Ptr::NULL)
    }

    /// Consume the cell after the call returned `status`
    pub fn check(mut self, status: c_int) -> Result<()> {
        let Some(cell) = self.cell.take() else {
            return Ok(());
        };
        let module = self.module;

        if status == 0 {
            unsafe { module.free(cell) };
            return Ok(());
        }

        let err = ErrorPtr::from_addr(unsafe { module.read_addr(cell) });
        if err.is_null() {
            unsafe { module.free(cell) };
            return Err(StanError::Unknown { code: status });
        }

        let (message, kind) = unsafe {
            let message = module.read_c_string(module.get_error_message(err));
            let kind = StanErrorKind::from_code(module.get_error_type(err));
            module.destroy_error(err);
            module.free(cell);
            (message, kind)
        };

        let error = StanError::Stan { kind, message };
        if let Some(sink) = self.echo {
            sink.emit(&error.to_string(), true);
        }
        Err(error)
    }
}

impl<M: StanModule + ?Sized> Drop for ErrorCell<'_, M> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            unsafe { self.module.free(cell) };
        }
    }
}
