//! Scoped model lifetime
//!
//! A [`ModelSession`] owns one model handle plus the buffers registered
//! while it is open. Dropping it, on success, on `?` or while unwinding,
//! frees the registered buffers and then destroys the model.

use crate::error::Result;
use crate::ffi::{ModelPtr, PrintCallback, Ptr, StanModule};
use crate::marshal::Allocations;
use crate::protocol::ErrorCell;

/// An instantiated model and its deferred releases
pub struct ModelSession<'m, M: StanModule + ?Sized> {
    module: &'m M,
    model: ModelPtr,
    deferred: Allocations<'m, M>,
    echo: Option<&'m PrintCallback>,
}

impl<'m, M: StanModule + ?Sized> ModelSession<'m, M> {
    /// Instantiate a model from JSON `data`
    ///
    /// The data buffer lives only for the `create_model` call. On failure no
    /// model exists and the foreign error is returned.
    pub fn open(
        module: &'m M,
        data: &str,
        seed: u32,
        echo: Option<&'m PrintCallback>,
    ) -> Result<Self> {
        let mut transient = Allocations::new(module);
        let data_ptr = transient.encode_str(data)?;
        let err = ErrorCell::new(module)?.echo_to(echo);

        let model = unsafe { module.create_model(data_ptr, seed, err.ptr()) };
        transient.release_all();
        err.check(c_int_flag(model.is_null()))?;

        tracing::debug!(?model, seed, "model session opened");
        Ok(Self {
            module,
            model,
            deferred: Allocations::new(module),
            echo,
        })
    }

    pub fn model(&self) -> ModelPtr {
        self.model
    }

    pub fn module(&self) -> &'m M {
        self.module
    }

    /// Buffers released when the session closes
    pub fn deferred(&mut self) -> &mut Allocations<'m, M> {
        &mut self.deferred
    }

    /// Fresh error cell for one fallible call against this model
    pub fn error_cell(&self) -> Result<ErrorCell<'m, M>> {
        Ok(ErrorCell::new(self.module)?.echo_to(self.echo))
    }

    /// Number of unconstrained parameters
    pub fn num_free_params(&self) -> usize {
        unsafe { self.module.model_num_free_params(self.model) }
    }

    /// Constrained parameter names reported by the model
    pub fn param_names(&self) -> Vec<String> {
        let raw = unsafe {
            let names = self.module.model_param_names(self.model);
            self.module.read_c_string(names)
        };
        split_param_names(&raw)
    }
}

impl<M: StanModule + ?Sized> Drop for ModelSession<'_, M> {
    fn drop(&mut self) {
        tracing::debug!(
            model = ?self.model,
            deferred = self.deferred.len(),
            "model session closed"
        );
        self.deferred.release_all();
        unsafe { self.module.destroy_model(self.model) };
    }
}

/// Run `body` against a freshly instantiated model
///
/// Whatever `body` returns, including an error, is passed through after the
/// session has been torn down.
pub fn with_model<'m, M, T, F>(
    module: &'m M,
    data: &str,
    seed: u32,
    echo: Option<&'m PrintCallback>,
    body: F,
) -> Result<T>
where
    M: StanModule + ?Sized,
    F: FnOnce(&mut ModelSession<'m, M>) -> Result<T>,
{
    let mut session = ModelSession::open(module, data, seed, echo)?;
    body(&mut session)
}

/// Run a three-cell version query and read back `(major, minor, patch)`
pub(crate) fn query_version<M, F>(module: &M, query: F) -> Result<(i32, i32, i32)>
where
    M: StanModule + ?Sized,
    F: FnOnce(Ptr, Ptr, Ptr),
{
    let mut cells = Allocations::new(module);
    let major = cells.alloc(4)?;
    let minor = cells.alloc(4)?;
    let patch = cells.alloc(4)?;

    query(major, minor, patch);

    let version = unsafe {
        (
            module.read_i32(major),
            module.read_i32(minor),
            module.read_i32(patch),
        )
    };
    Ok(version)
}

fn c_int_flag(failed: bool) -> std::os::raw::c_int {
    failed.into()
}

/// Split the comma-separated name list; blank means no names
pub(crate) fn split_param_names(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split(',').map(str::to_string).collect()
}
