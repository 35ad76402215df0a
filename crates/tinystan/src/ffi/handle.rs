//! Branded handles into a foreign module's address space
//!
//! Every value that crosses the boundary is an address, but the module
//! hands out addresses of different kinds:
//! - `Ptr`: a raw buffer obtained from `malloc`
//! - `CStrPtr`: a NUL-terminated UTF-8 string
//! - `ModelPtr`: an instantiated model
//! - `ErrorPtr`: an error object written by a failing call
//!
//! Each kind is its own type, so a model handle can never be passed where
//! a buffer or error object is expected. Address `0` is NULL for all kinds.

use std::fmt;

macro_rules! foreign_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// The NULL handle
            pub const NULL: Self = Self(0);

            /// Wrap a foreign address
            pub const fn from_addr(addr: usize) -> Self {
                Self(addr)
            }

            /// The underlying foreign address
            pub const fn addr(self) -> usize {
                self.0
            }

            /// Whether this is the NULL handle
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", $label, self.0)
            }
        }
    };
}

foreign_handle!(
    /// Raw buffer allocated with the module's `malloc`
    Ptr,
    "Ptr"
);

foreign_handle!(
    /// NUL-terminated string in foreign memory
    CStrPtr,
    "CStrPtr"
);

foreign_handle!(
    /// Model instance returned by `create_model`
    ModelPtr,
    "ModelPtr"
);

foreign_handle!(
    /// Error object written through an error cell
    ErrorPtr,
    "ErrorPtr"
);

// A string buffer we encoded ourselves is released like any other buffer.
impl From<CStrPtr> for Ptr {
    fn from(s: CStrPtr) -> Self {
        Ptr(s.0)
    }
}

impl Ptr {
    /// Reinterpret a buffer we filled with string bytes as a C string
    pub(crate) const fn as_cstr(self) -> CStrPtr {
        CStrPtr(self.0)
    }
}
