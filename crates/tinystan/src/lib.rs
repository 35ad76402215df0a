//! Safe bindings to compiled TinyStan model libraries
//!
//! A compiled Stan model exposes NUTS-HMC, Pathfinder and optimization
//! through a small C interface. This crate marshals configuration and data
//! into the library's memory, drives one foreign call per operation, and
//! decodes the flat output buffers, while guaranteeing that every foreign
//! allocation, model handle and error object is released on every exit path.
//!
//! - [`ffi`]: the foreign contract ([`StanModule`]) and its native backend
//! - [`marshal`], [`protocol`], [`session`]: the memory and error protocol
//! - [`params`]: configuration records with engine defaults
//! - [`output`]: decoded draws
//! - [`model`]: the [`StanModel`] drivers

pub mod error;
pub mod ffi;
pub mod marshal;
pub mod model;
pub mod output;
pub mod params;
pub mod protocol;
pub mod session;

pub use error::{Result, StanError};
pub use ffi::{
    HmcMetric, LibraryLoader, LoadError, NativeModule, OptimizationAlgorithm, PrintCallback,
    StanErrorKind, StanModule,
};
pub use model::{StanModel, API_VERSION};
pub use output::{InvMetric, StanDraws};
pub use params::{Inits, OptimizeParams, PathfinderParams, SamplerParams, StanData};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
