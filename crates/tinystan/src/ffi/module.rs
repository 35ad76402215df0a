//! The foreign module contract
//!
//! `StanModule` is the fixed interface a compiled model library exposes:
//! memory primitives over its own address space, plus the model and
//! algorithm entry points. Nothing in this crate assumes where that address
//! space lives; the native backend maps it onto process memory, and test
//! doubles can simulate it entirely.
//!
//! # Safety
//!
//! Methods that take a handle are `unsafe`: the handle must have been
//! produced by the same module and must not have been released yet. Buffers
//! passed to an entry point must be large enough for what that entry point
//! writes.

use crate::ffi::callbacks::PrintCallback;
use crate::ffi::handle::{CStrPtr, ErrorPtr, ModelPtr, Ptr};
use crate::ffi::types::{HmcMetric, OptimizationAlgorithm};
use std::os::raw::c_int;

/// Positional arguments of the foreign `sample` entry point
#[derive(Debug, Clone, PartialEq)]
pub struct SampleArgs {
    pub model: ModelPtr,
    pub num_chains: usize,
    pub inits: CStrPtr,
    pub seed: u32,
    pub chain_id: u32,
    pub init_radius: f64,
    pub num_warmup: c_int,
    pub num_samples: c_int,
    pub metric: HmcMetric,
    pub init_inv_metric: Ptr,
    pub adapt: bool,
    pub delta: f64,
    pub gamma: f64,
    pub kappa: f64,
    pub t0: f64,
    pub init_buffer: u32,
    pub term_buffer: u32,
    pub window: u32,
    pub save_warmup: bool,
    pub stepsize: f64,
    pub stepsize_jitter: f64,
    pub max_depth: c_int,
    pub refresh: c_int,
    pub num_threads: c_int,
    pub out: Ptr,
    pub out_size: usize,
    pub metric_out: Ptr,
    pub err: Ptr,
}

/// Positional arguments of the foreign `pathfinder` entry point
#[derive(Debug, Clone, PartialEq)]
pub struct PathfinderArgs {
    pub model: ModelPtr,
    pub num_paths: usize,
    pub inits: CStrPtr,
    pub seed: u32,
    pub path_id: u32,
    pub init_radius: f64,
    pub num_draws: c_int,
    pub max_history_size: c_int,
    pub init_alpha: f64,
    pub tol_obj: f64,
    pub tol_rel_obj: f64,
    pub tol_grad: f64,
    pub tol_rel_grad: f64,
    pub tol_param: f64,
    pub num_iterations: c_int,
    pub num_elbo_draws: c_int,
    pub num_multi_draws: c_int,
    pub calculate_lp: bool,
    pub psis_resample: bool,
    pub refresh: c_int,
    pub num_threads: c_int,
    pub out: Ptr,
    pub out_size: usize,
    pub err: Ptr,
}

/// Positional arguments of the foreign `optimize` entry point
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeArgs {
    pub model: ModelPtr,
    pub init: CStrPtr,
    pub seed: u32,
    pub id: u32,
    pub init_radius: f64,
    pub algorithm: OptimizationAlgorithm,
    pub num_iterations: c_int,
    pub jacobian: bool,
    pub max_history_size: c_int,
    pub init_alpha: f64,
    pub tol_obj: f64,
    pub tol_rel_obj: f64,
    pub tol_grad: f64,
    pub tol_rel_grad: f64,
    pub tol_param: f64,
    pub refresh: c_int,
    pub num_threads: c_int,
    pub out: Ptr,
    pub out_size: usize,
    pub err: Ptr,
}

/// A compiled model library, seen through its exported entry points
pub trait StanModule {
    // ===== Memory primitives =====

    /// Width in bytes of a foreign pointer
    fn ptr_size(&self) -> usize;

    /// Allocate `n_bytes` of foreign memory; NULL on exhaustion
    fn malloc(&self, n_bytes: usize) -> Ptr;

    /// Release a buffer obtained from `malloc`. Freeing NULL is a no-op.
    ///
    /// # Safety
    /// `ptr` must be NULL or a live allocation of this module.
    unsafe fn free(&self, ptr: Ptr);

    /// Copy `bytes` into foreign memory starting at `ptr`
    ///
    /// # Safety
    /// `ptr` must point to at least `bytes.len()` writable bytes.
    unsafe fn write_bytes(&self, ptr: Ptr, bytes: &[u8]);

    /// Copy `len` bytes out of foreign memory
    ///
    /// # Safety
    /// `ptr` must point to at least `len` readable bytes.
    unsafe fn read_bytes(&self, ptr: Ptr, len: usize) -> Vec<u8>;

    /// Read one foreign pointer stored in the cell at `cell`
    ///
    /// # Safety
    /// `cell` must point to at least `ptr_size()` readable bytes.
    unsafe fn read_addr(&self, cell: Ptr) -> usize;

    /// Read one 32-bit signed integer
    ///
    /// # Safety
    /// `ptr` must point to at least 4 readable bytes.
    unsafe fn read_i32(&self, ptr: Ptr) -> i32;

    /// Copy `len` doubles out of foreign memory
    ///
    /// # Safety
    /// `ptr` must point to at least `len * 8` readable bytes.
    unsafe fn read_f64s(&self, ptr: Ptr, len: usize) -> Vec<f64>;

    /// Decode a NUL-terminated UTF-8 string (lossily)
    ///
    /// # Safety
    /// `s` must point to a NUL-terminated string.
    unsafe fn read_c_string(&self, s: CStrPtr) -> String;

    // ===== Model entry points =====

    /// Instantiate a model; NULL on failure with an error written to `err`
    ///
    /// # Safety
    /// `data` must be a NUL-terminated string, `err` a pointer-sized cell.
    unsafe fn create_model(&self, data: CStrPtr, seed: u32, err: Ptr) -> ModelPtr;

    /// # Safety
    /// `model` must be live; it is invalid afterwards.
    unsafe fn destroy_model(&self, model: ModelPtr);

    /// Comma-separated parameter names, owned by the model
    ///
    /// # Safety
    /// `model` must be live.
    unsafe fn model_param_names(&self, model: ModelPtr) -> CStrPtr;

    /// # Safety
    /// `model` must be live.
    unsafe fn model_num_free_params(&self, model: ModelPtr) -> usize;

    /// ASCII code used to join several JSON init blobs into one string
    fn separator_char(&self) -> u8;

    // ===== Algorithms =====

    /// Run NUTS-HMC; non-zero return means an error was written
    ///
    /// # Safety
    /// Every handle in `args` must be live and `out`/`metric_out` large
    /// enough for the configured run.
    unsafe fn sample(&self, args: &SampleArgs) -> c_int;

    /// Run Pathfinder; non-zero return means an error was written
    ///
    /// # Safety
    /// Every handle in `args` must be live and `out` large enough.
    unsafe fn pathfinder(&self, args: &PathfinderArgs) -> c_int;

    /// Run an optimizer; non-zero return means an error was written
    ///
    /// # Safety
    /// Every handle in `args` must be live and `out` large enough.
    unsafe fn optimize(&self, args: &OptimizeArgs) -> c_int;

    // ===== Errors =====

    /// Message owned by the error object
    ///
    /// # Safety
    /// `err` must be a live error object.
    unsafe fn get_error_message(&self, err: ErrorPtr) -> CStrPtr;

    /// Raw error category code
    ///
    /// # Safety
    /// `err` must be a live error object.
    unsafe fn get_error_type(&self, err: ErrorPtr) -> c_int;

    /// # Safety
    /// `err` must be a live error object; it is invalid afterwards.
    unsafe fn destroy_error(&self, err: ErrorPtr);

    // ===== Versions =====

    /// Write the library API version into three 4-byte cells
    ///
    /// # Safety
    /// Each pointer must reference 4 writable bytes.
    unsafe fn api_version(&self, major: Ptr, minor: Ptr, patch: Ptr);

    /// Write the Stan version into three 4-byte cells
    ///
    /// # Safety
    /// Each pointer must reference 4 writable bytes.
    unsafe fn stan_version(&self, major: Ptr, minor: Ptr, patch: Ptr);

    /// Route the module's own print output to `callback`.
    ///
    /// Modules without a print hook ignore this.
    fn set_print_callback(&self, _callback: Option<PrintCallback>) {}
}

impl<M: StanModule + ?Sized> StanModule for &M {
    fn ptr_size(&self) -> usize {
        (**self).ptr_size()
    }
    fn malloc(&self, n_bytes: usize) -> Ptr {
        (**self).malloc(n_bytes)
    }
    unsafe fn free(&self, ptr: Ptr) {
        (**self).free(ptr)
    }
    unsafe fn write_bytes(&self, ptr: Ptr, bytes: &[u8]) {
        (**self).write_bytes(ptr, bytes)
    }
    unsafe fn read_bytes(&self, ptr: Ptr, len: usize) -> Vec<u8> {
        (**self).read_bytes(ptr, len)
    }
    unsafe fn read_addr(&self, cell: Ptr) -> usize {
        (**self).read_addr(cell)
    }
    unsafe fn read_i32(&self, ptr: Ptr) -> i32 {
        (**self).read_i32(ptr)
    }
    unsafe fn read_f64s(&self, ptr: Ptr, len: usize) -> Vec<f64> {
        (**self).read_f64s(ptr, len)
    }
    unsafe fn read_c_string(&self, s: CStrPtr) -> String {
        (**self).read_c_string(s)
    }
    unsafe fn create_model(&self, data: CStrPtr, seed: u32, err: Ptr) -> ModelPtr {
        (**self).create_model(data, seed, err)
    }
    unsafe fn destroy_model(&self, model: ModelPtr) {
        (**self).destroy_model(model)
    }
    unsafe fn model_param_names(&self, model: ModelPtr) -> CStrPtr {
        (**self).model_param_names(model)
    }
    unsafe fn model_num_free_params(&self, model: ModelPtr) -> usize {
        (**self).model_num_free_params(model)
    }
    fn separator_char(&self) -> u8 {
        (**self).separator_char()
    }
    unsafe fn sample(&self, args: &SampleArgs) -> c_int {
        (**self).sample(args)
    }
    unsafe fn pathfinder(&self, args: &PathfinderArgs) -> c_int {
        (**self).pathfinder(args)
    }
    unsafe fn optimize(&self, args: &OptimizeArgs) -> c_int {
        (**self).optimize(args)
    }
    unsafe fn get_error_message(&self, err: ErrorPtr) -> CStrPtr {
        (**self).get_error_message(err)
    }
    unsafe fn get_error_type(&self, err: ErrorPtr) -> c_int {
        (**self).get_error_type(err)
    }
    unsafe fn destroy_error(&self, err: ErrorPtr) {
        (**self).destroy_error(err)
    }
    unsafe fn api_version(&self, major: Ptr, minor: Ptr, patch: Ptr) {
        (**self).api_version(major, minor, patch)
    }
    unsafe fn stan_version(&self, major: Ptr, minor: Ptr, patch: Ptr) {
        (**self).stan_version(major, minor, patch)
    }
    fn set_print_callback(&self, callback: Option<PrintCallback>) {
        (**self).set_print_callback(callback)
    }
}
