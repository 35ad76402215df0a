//! Native backend: a compiled model library loaded into this process
//!
//! The library's address space is the process's own, so foreign handles
//! are plain machine addresses and the memory primitives are direct reads
//! and writes. Every entry point is resolved once at load time.

use crate::ffi::callbacks::{self, PrintCallback};
use crate::ffi::handle::{CStrPtr, ErrorPtr, ModelPtr, Ptr};
use crate::ffi::loader::{LibraryLoader, LoadError};
use crate::ffi::module::{OptimizeArgs, PathfinderArgs, SampleArgs, StanModule};
use libloading::Library;
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int, c_uint};
use std::path::{Path, PathBuf};

type RawModel = *mut c_void;
type RawError = *mut c_void;
type PrintFn = unsafe extern "C" fn(*const c_char, usize, bool);

type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;
type FreeFn = unsafe extern "C" fn(*mut c_void);
type VersionFn = unsafe extern "C" fn(*mut c_int, *mut c_int, *mut c_int);
type CreateModelFn = unsafe extern "C" fn(*const c_char, c_uint, *mut RawError) -> RawModel;
type DestroyModelFn = unsafe extern "C" fn(RawModel);
type ParamNamesFn = unsafe extern "C" fn(RawModel) -> *const c_char;
type NumFreeParamsFn = unsafe extern "C" fn(RawModel) -> usize;
type SeparatorFn = unsafe extern "C" fn() -> c_char;
type GetErrorMessageFn = unsafe extern "C" fn(RawError) -> *const c_char;
type GetErrorTypeFn = unsafe extern "C" fn(RawError) -> c_int;
type DestroyErrorFn = unsafe extern "C" fn(RawError);
type SetPrintCallbackFn = unsafe extern "C" fn(Option<PrintFn>);

type SampleFn = unsafe extern "C" fn(
    RawModel,
    usize,
    *const c_char,
    c_uint,
    c_uint,
    f64,
    c_int,
    c_int,
    c_int,
    *const f64,
    bool,
    f64,
    f64,
    f64,
    f64,
    c_uint,
    c_uint,
    c_uint,
    bool,
    f64,
    f64,
    c_int,
    c_int,
    c_int,
    *mut f64,
    usize,
    *mut f64,
    *mut RawError,
) -> c_int;

type PathfinderFn = unsafe extern "C" fn(
    RawModel,
    usize,
    *const c_char,
    c_uint,
    c_uint,
    f64,
    c_int,
    c_int,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    c_int,
    c_int,
    c_int,
    bool,
    bool,
    c_int,
    c_int,
    *mut f64,
    usize,
    *mut RawError,
) -> c_int;

type OptimizeFn = unsafe extern "C" fn(
    RawModel,
    *const c_char,
    c_uint,
    c_uint,
    f64,
    c_int,
    c_int,
    bool,
    c_int,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    c_int,
    c_int,
    *mut f64,
    usize,
    *mut RawError,
) -> c_int;

struct EntryPoints {
    malloc: MallocFn,
    free: FreeFn,
    api_version: VersionFn,
    stan_version: VersionFn,
    create_model: CreateModelFn,
    destroy_model: DestroyModelFn,
    param_names: ParamNamesFn,
    num_free_params: NumFreeParamsFn,
    separator_char: SeparatorFn,
    sample: SampleFn,
    pathfinder: PathfinderFn,
    optimize: OptimizeFn,
    get_error_message: GetErrorMessageFn,
    get_error_type: GetErrorTypeFn,
    destroy_error: DestroyErrorFn,
    set_print_callback: Option<SetPrintCallbackFn>,
}

/// A compiled model library loaded with `libloading`
///
/// # Allocator
///
/// Buffers handed to the library come from the `malloc`/`free` the library
/// itself links against. On Unix these resolve through its dependency chain.
/// A Windows DLL usually does not export them, so they are then taken from
/// the C runtime (`ucrtbase.dll`). The library only reads and writes those
/// buffers and never frees them, so the pair stays matched either way.
pub struct NativeModule {
    path: PathBuf,
    fns: EntryPoints,
    // Must outlive every function pointer in `fns`.
    _library: Library,
    _runtime: Option<Library>,
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModule")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(windows)]
const C_RUNTIME: &str = "ucrtbase.dll";
#[cfg(not(windows))]
const C_RUNTIME: &str = "C runtime";

#[cfg(unix)]
unsafe fn open_c_runtime() -> Result<Library, LoadError> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
unsafe fn open_c_runtime() -> Result<Library, LoadError> {
    Library::new(C_RUNTIME).map_err(|e| LoadError::LoadFailed {
        library: C_RUNTIME.to_string(),
        reason: e.to_string(),
    })
}

/// `malloc`/`free` from the C runtime, with the library that owns them
unsafe fn runtime_allocator() -> Result<(MallocFn, FreeFn, Library), LoadError> {
    let runtime = open_c_runtime()?;
    let malloc = symbol::<MallocFn>(&runtime, Path::new(C_RUNTIME), "malloc")?;
    let free = symbol::<FreeFn>(&runtime, Path::new(C_RUNTIME), "free")?;
    Ok((malloc, free, runtime))
}

/// Copy a function pointer out of the library
///
/// # Safety
/// `T` must match the symbol's real signature.
unsafe fn symbol<T: Copy>(library: &Library, path: &Path, name: &str) -> Result<T, LoadError> {
    library
        .get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|_| LoadError::SymbolNotFound {
            library: path.display().to_string(),
            symbol: name.to_string(),
        })
}

impl NativeModule {
    /// Load a model library by name or path using the default loader
    ///
    /// # Safety
    /// The library must be a genuine compiled model exporting the
    /// `tinystan_*` entry points with their documented signatures.
    pub unsafe fn load(name: &str) -> Result<Self, LoadError> {
        Self::load_with(&LibraryLoader::new(), name)
    }

    /// Load a model library through a configured loader
    ///
    /// # Safety
    /// See [`NativeModule::load`].
    pub unsafe fn load_with(loader: &LibraryLoader, name: &str) -> Result<Self, LoadError> {
        let (path, library) = loader.load(name)?;
        let (malloc, free, runtime) = Self::resolve_allocator(&library, &path)?;
        let fns = Self::resolve(&library, &path, malloc, free)?;
        Ok(Self {
            path,
            fns,
            _library: library,
            _runtime: runtime,
        })
    }

    unsafe fn resolve_allocator(
        lib: &Library,
        path: &Path,
    ) -> Result<(MallocFn, FreeFn, Option<Library>), LoadError> {
        let malloc = symbol::<MallocFn>(lib, path, "malloc");
        let free = symbol::<FreeFn>(lib, path, "free");
        if let (Ok(malloc), Ok(free)) = (malloc, free) {
            return Ok((malloc, free, None));
        }
        tracing::debug!(library = %path.display(), "allocator not exported; using C runtime");
        let (malloc, free, runtime) = runtime_allocator()?;
        Ok((malloc, free, Some(runtime)))
    }

    unsafe fn resolve(
        lib: &Library,
        path: &Path,
        malloc: MallocFn,
        free: FreeFn,
    ) -> Result<EntryPoints, LoadError> {
        let destroy_error = symbol::<DestroyErrorFn>(lib, path, "tinystan_destroy_error")
            .or_else(|_| symbol::<DestroyErrorFn>(lib, path, "tinystan_free_stan_error"))?;

        Ok(EntryPoints {
            malloc,
            free,
            api_version: symbol(lib, path, "tinystan_api_version")?,
            stan_version: symbol(lib, path, "tinystan_stan_version")?,
            create_model: symbol(lib, path, "tinystan_create_model")?,
            destroy_model: symbol(lib, path, "tinystan_destroy_model")?,
            param_names: symbol(lib, path, "tinystan_model_param_names")?,
            num_free_params: symbol(lib, path, "tinystan_model_num_free_params")?,
            separator_char: symbol(lib, path, "tinystan_separator_char")?,
            sample: symbol(lib, path, "tinystan_sample")?,
            pathfinder: symbol(lib, path, "tinystan_pathfinder")?,
            optimize: symbol(lib, path, "tinystan_optimize")?,
            get_error_message: symbol(lib, path, "tinystan_get_error_message")?,
            get_error_type: symbol(lib, path, "tinystan_get_error_type")?,
            destroy_error,
            set_print_callback: symbol(lib, path, "tinystan_set_print_callback").ok(),
        })
    }

    /// File the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn raw<T>(addr: usize) -> *mut T {
    addr as *mut T
}

impl StanModule for NativeModule {
    fn ptr_size(&self) -> usize {
        std::mem::size_of::<usize>()
    }

    fn malloc(&self, n_bytes: usize) -> Ptr {
        let p = unsafe { (self.fns.malloc)(n_bytes) };
        Ptr::from_addr(p as usize)
    }

    unsafe fn free(&self, ptr: Ptr) {
        if !ptr.is_null() {
            (self.fns.free)(raw(ptr.addr()));
        }
    }

    unsafe fn write_bytes(&self, ptr: Ptr, bytes: &[u8]) {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), raw::<u8>(ptr.addr()), bytes.len());
    }

    unsafe fn read_bytes(&self, ptr: Ptr, len: usize) -> Vec<u8> {
        std::slice::from_raw_parts(raw::<u8>(ptr.addr()), len).to_vec()
    }

    unsafe fn read_addr(&self, cell: Ptr) -> usize {
        std::ptr::read_unaligned(raw::<usize>(cell.addr()))
    }

    unsafe fn read_i32(&self, ptr: Ptr) -> i32 {
        std::ptr::read_unaligned(raw::<i32>(ptr.addr()))
    }

    unsafe fn read_f64s(&self, ptr: Ptr, len: usize) -> Vec<f64> {
        let base = raw::<f64>(ptr.addr());
        (0..len)
            .map(|i| std::ptr::read_unaligned(base.add(i)))
            .collect()
    }

    unsafe fn read_c_string(&self, s: CStrPtr) -> String {
        if s.is_null() {
            return String::new();
        }
        CStr::from_ptr(raw::<c_char>(s.addr()))
            .to_string_lossy()
            .into_owned()
    }

    unsafe fn create_model(&self, data: CStrPtr, seed: u32, err: Ptr) -> ModelPtr {
        let model = (self.fns.create_model)(raw(data.addr()), seed, raw(err.addr()));
        ModelPtr::from_addr(model as usize)
    }

    unsafe fn destroy_model(&self, model: ModelPtr) {
        (self.fns.destroy_model)(raw(model.addr()))
    }

    unsafe fn model_param_names(&self, model: ModelPtr) -> CStrPtr {
        CStrPtr::from_addr((self.fns.param_names)(raw(model.addr())) as usize)
    }

    unsafe fn model_num_free_params(&self, model: ModelPtr) -> usize {
        (self.fns.num_free_params)(raw(model.addr()))
    }

    fn separator_char(&self) -> u8 {
        unsafe { (self.fns.separator_char)() as u8 }
    }

    unsafe fn sample(&self, a: &SampleArgs) -> c_int {
        (self.fns.sample)(
            raw(a.model.addr()),
            a.num_chains,
            raw(a.inits.addr()),
            a.seed,
            a.chain_id,
            a.init_radius,
            a.num_warmup,
            a.num_samples,
            a.metric.code(),
            raw(a.init_inv_metric.addr()),
            a.adapt,
            a.delta,
            a.gamma,
            a.kappa,
            a.t0,
            a.init_buffer,
            a.term_buffer,
            a.window,
            a.save_warmup,
            a.stepsize,
            a.stepsize_jitter,
            a.max_depth,
            a.refresh,
            a.num_threads,
            raw(a.out.addr()),
            a.out_size,
            raw(a.metric_out.addr()),
            raw(a.err.addr()),
        )
    }

    unsafe fn pathfinder(&self, a: &PathfinderArgs) -> c_int {
        (self.fns.pathfinder)(
            raw(a.model.addr()),
            a.num_paths,
            raw(a.inits.addr()),
            a.seed,
            a.path_id,
            a.init_radius,
            a.num_draws,
            a.max_history_size,
            a.init_alpha,
            a.tol_obj,
            a.tol_rel_obj,
            a.tol_grad,
            a.tol_rel_grad,
            a.tol_param,
            a.num_iterations,
            a.num_elbo_draws,
            a.num_multi_draws,
            a.calculate_lp,
            a.psis_resample,
            a.refresh,
            a.num_threads,
            raw(a.out.addr()),
            a.out_size,
            raw(a.err.addr()),
        )
    }

    unsafe fn optimize(&self, a: &OptimizeArgs) -> c_int {
        (self.fns.optimize)(
            raw(a.model.addr()),
            raw(a.init.addr()),
            a.seed,
            a.id,
            a.init_radius,
            a.algorithm.code(),
            a.num_iterations,
            a.jacobian,
            a.max_history_size,
            a.init_alpha,
            a.tol_obj,
            a.tol_rel_obj,
            a.tol_grad,
            a.tol_rel_grad,
            a.tol_param,
            a.refresh,
            a.num_threads,
            raw(a.out.addr()),
            a.out_size,
            raw(a.err.addr()),
        )
    }

    unsafe fn get_error_message(&self, err: ErrorPtr) -> CStrPtr {
        CStrPtr::from_addr((self.fns.get_error_message)(raw(err.addr())) as usize)
    }

    unsafe fn get_error_type(&self, err: ErrorPtr) -> c_int {
        (self.fns.get_error_type)(raw(err.addr()))
    }

    unsafe fn destroy_error(&self, err: ErrorPtr) {
        (self.fns.destroy_error)(raw(err.addr()))
    }

    unsafe fn api_version(&self, major: Ptr, minor: Ptr, patch: Ptr) {
        (self.fns.api_version)(raw(major.addr()), raw(minor.addr()), raw(patch.addr()))
    }

    unsafe fn stan_version(&self, major: Ptr, minor: Ptr, patch: Ptr) {
        (self.fns.stan_version)(raw(major.addr()), raw(minor.addr()), raw(patch.addr()))
    }

    fn set_print_callback(&self, callback: Option<PrintCallback>) {
        let Some(set) = self.fns.set_print_callback else {
            tracing::debug!(path = %self.path.display(), "library has no print hook");
            return;
        };
        let hook: Option<PrintFn> = callback.as_ref().map(|_| callbacks::print_trampoline as PrintFn);
        callbacks::install(callback);
        unsafe { set(hook) };
    }
}
