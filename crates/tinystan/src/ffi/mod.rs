//! Boundary with a compiled model library
//!
//! - `handle`: branded foreign addresses
//! - `types`: integer-coded enums shared with the library
//! - `module`: the `StanModule` contract every backend implements
//! - `loader` / `native`: the `libloading` backend
//! - `callbacks`: print output routed back from inside foreign calls
//!
//! # Safety
//!
//! All raw pointer work lives in `native` and `callbacks`. Everything above
//! this module speaks in branded handles through `StanModule`.

pub mod callbacks;
pub mod handle;
pub mod loader;
pub mod module;
pub mod native;
pub mod types;

pub use callbacks::PrintCallback;
pub use handle::{CStrPtr, ErrorPtr, ModelPtr, Ptr};
pub use loader::{LibraryLoader, LoadError};
pub use module::{OptimizeArgs, PathfinderArgs, SampleArgs, StanModule};
pub use native::NativeModule;
pub use types::{HmcMetric, OptimizationAlgorithm, StanErrorKind};
