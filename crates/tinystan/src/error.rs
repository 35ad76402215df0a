//! Error types for model operations

use crate::ffi::{LoadError, StanErrorKind};
use thiserror::Error;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, StanError>;

/// Failure of a model operation
#[derive(Debug, Error)]
pub enum StanError {
    /// Malformed arguments, rejected before any foreign call
    #[error("{0}")]
    Validation(String),

    /// Error reported by the compiled library
    #[error("Exception from Stan:\n{message}")]
    Stan { kind: StanErrorKind, message: String },

    /// The library signaled failure without writing an error object
    #[error("Unknown error, function returned code {code}")]
    Unknown { code: i32 },

    /// The library's allocator returned NULL
    #[error("failed to allocate {bytes} bytes in the model library")]
    Allocation { bytes: usize },

    /// Input text contains an interior NUL byte
    #[error("string passed to the model library contains a NUL byte")]
    InvalidString,

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// The library speaks an API this crate does not
    #[error("incompatible TinyStan API: expected {expected}, library reports {found}")]
    IncompatibleApi { expected: String, found: String },
}

impl StanError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        StanError::Validation(msg.into())
    }

    /// A buffer size that does not fit in `usize`
    pub(crate) fn too_large(what: &str) -> Self {
        StanError::Validation(format!("{} is too large", what))
    }

    /// Category of a library-reported error, if this is one
    pub fn kind(&self) -> Option<StanErrorKind> {
        match self {
            StanError::Stan { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the run was interrupted rather than failing
    pub fn is_interrupt(&self) -> bool {
        self.kind() == Some(StanErrorKind::Interrupt)
    }
}
