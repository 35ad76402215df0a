//! Marshaling of inputs into foreign memory
//!
//! # Memory Safety
//!
//! - Every buffer obtained through [`Allocations`] is tracked and released
//!   exactly once, when the owning `Allocations` is drained or dropped
//! - NULL registrations are ignored
//! - A NULL from `malloc` for a non-empty request is an error, never a
//!   handle that escapes into a foreign call

use crate::error::{Result, StanError};
use crate::ffi::{CStrPtr, Ptr, StanModule};
use crate::params::Inits;

/// Width of one foreign `double`
pub const F64_SIZE: usize = std::mem::size_of::<f64>();

/// Ordered set of foreign buffers released together
///
/// # Example
///
/// ```
/// # use tinystan::marshal::Allocations;
/// # fn demo<M: tinystan::StanModule>(module: &M) -> tinystan::Result<()> {
/// let mut allocs = Allocations::new(module);
/// let json = allocs.encode_str("{\"N\": 10}")?;
/// let out = allocs.alloc_f64s(128)?;
/// // both buffers are freed when `allocs` goes out of scope
/// # let _ = (json, out);
/// # Ok(())
/// # }
/// ```
pub struct Allocations<'m, M: StanModule + ?Sized> {
    module: &'m M,
    ptrs: Vec<Ptr>,
}

impl<'m, M: StanModule + ?Sized> Allocations<'m, M> {
    pub fn new(module: &'m M) -> Self {
        Self {
            module,
            ptrs: Vec::new(),
        }
    }

    /// Take ownership of a buffer allocated elsewhere
    pub fn register(&mut self, ptr: impl Into<Ptr>) {
        let ptr = ptr.into();
        if !ptr.is_null() {
            self.ptrs.push(ptr);
        }
    }

    /// Allocate `n_bytes` and take ownership of the buffer
    pub fn alloc(&mut self, n_bytes: usize) -> Result<Ptr> {
        let ptr = self.module.malloc(n_bytes);
        if ptr.is_null() {
            if n_bytes == 0 {
                return Ok(Ptr::NULL);
            }
            return Err(StanError::Allocation { bytes: n_bytes });
        }
        tracing::trace!(?ptr, n_bytes, "malloc");
        self.ptrs.push(ptr);
        Ok(ptr)
    }

    /// Allocate room for `len` doubles
    pub fn alloc_f64s(&mut self, len: usize) -> Result<Ptr> {
        let n_bytes = len
            .checked_mul(F64_SIZE)
            .ok_or_else(|| StanError::too_large("output buffer"))?;
        self.alloc(n_bytes)
    }

    /// Copy `values` into a fresh buffer of doubles
    pub fn write_f64s(&mut self, values: &[f64]) -> Result<Ptr> {
        let ptr = self.alloc_f64s(values.len())?;
        if !ptr.is_null() {
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
            unsafe { self.module.write_bytes(ptr, &bytes) };
        }
        Ok(ptr)
    }

    /// Copy `s` into a fresh NUL-terminated buffer
    pub fn encode_str(&mut self, s: &str) -> Result<CStrPtr> {
        if s.as_bytes().contains(&0) {
            return Err(StanError::InvalidString);
        }
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);

        let ptr = self.alloc(bytes.len())?;
        unsafe { self.module.write_bytes(ptr, &bytes) };
        Ok(ptr.as_cstr())
    }

    /// Encode initial values; absent inits become NULL without allocating
    pub fn encode_inits(&mut self, inits: Option<&Inits>) -> Result<CStrPtr> {
        match inits {
            None => Ok(CStrPtr::NULL),
            Some(inits) => {
                let sep = char::from(self.module.separator_char());
                let joined = inits.to_joined_json(sep)?;
                self.encode_str(&joined)
            }
        }
    }

    /// Number of buffers currently owned
    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    /// Free every owned buffer now
    pub fn release_all(&mut self) {
        for ptr in self.ptrs.drain(..) {
            tracing::trace!(?ptr, "free");
            unsafe { self.module.free(ptr) };
        }
    }
}

impl<M: StanModule + ?Sized> Drop for Allocations<'_, M> {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl<M: StanModule + ?Sized> std::fmt::Debug for Allocations<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocations").field("ptrs", &self.ptrs).finish()
    }
}
