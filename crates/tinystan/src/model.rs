//! Algorithm drivers over a compiled model
//!
//! The sampling drivers validate their configuration before touching the library,
//! opens a [`ModelSession`](crate::session::ModelSession), sizes and
//! allocates the output buffers, makes one foreign call, and decodes the
//! result. All foreign memory is released before the driver returns.

use crate::error::{Result, StanError};
use crate::ffi::{
    HmcMetric, LibraryLoader, NativeModule, OptimizeArgs, PathfinderArgs, PrintCallback, Ptr,
    SampleArgs, StanModule,
};
use crate::output::{
    decode_dense_metric, decode_diag_metric, decode_draws, prefixed_names, InvMetric, StanDraws,
    HMC_SAMPLER_VARIABLES, OPTIMIZE_VARIABLES, PATHFINDER_VARIABLES,
};
use crate::params::{resolve_seed, Inits, OptimizeParams, PathfinderParams, SamplerParams};
use crate::session::{query_version, with_model};

/// API version of the library interface this crate was written against
pub const API_VERSION: (i32, i32, i32) = (0, 1, 0);

/// A compiled model, ready to run algorithms
///
/// # Example
///
/// ```no_run
/// use tinystan::{SamplerParams, StanData, StanModel};
///
/// let model = unsafe { StanModel::load("./bernoulli_model.so") }?;
/// let params = SamplerParams {
///     data: StanData::from(r#"{"N": 3, "y": [0, 1, 0]}"#),
///     num_chains: 2,
///     ..Default::default()
/// };
/// let fit = model.sample(&params)?;
/// println!("{} draws of theta", fit.get("theta").map_or(0, |d| d.len()));
/// # Ok::<(), tinystan::StanError>(())
/// ```
pub struct StanModel<M: StanModule> {
    module: M,
    print: Option<PrintCallback>,
}

impl StanModel<NativeModule> {
    /// Load a compiled model library and check its API version
    ///
    /// # Safety
    /// The file must be a genuine compiled model library.
    pub unsafe fn load(name: &str) -> Result<Self> {
        Self::load_with(&LibraryLoader::new(), name)
    }

    /// Like [`StanModel::load`], resolving `name` through `loader`
    ///
    /// # Safety
    /// See [`StanModel::load`].
    pub unsafe fn load_with(loader: &LibraryLoader, name: &str) -> Result<Self> {
        let model = Self::new(NativeModule::load_with(loader, name)?);
        model.check_api_version()?;
        Ok(model)
    }
}

impl<M: StanModule> StanModel<M> {
    pub fn new(module: M) -> Self {
        Self {
            module,
            print: None,
        }
    }

    /// Route the library's print output, and echoed errors, to `callback`
    ///
    /// The native library keeps one print hook per process, so the sink is
    /// shared by every loaded model. The most recent call wins.
    pub fn with_print_callback(mut self, callback: PrintCallback) -> Self {
        self.module.set_print_callback(Some(callback.clone()));
        self.print = Some(callback);
        self
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    /// Interface version reported by the library
    pub fn api_version(&self) -> Result<(i32, i32, i32)> {
        let module = &self.module;
        query_version(module, |major, minor, patch| unsafe {
            module.api_version(major, minor, patch)
        })
    }

    /// Fail on a major version mismatch, warn on any other drift
    pub fn check_api_version(&self) -> Result<()> {
        let found = self.api_version()?;
        if found.0 != API_VERSION.0 {
            return Err(StanError::IncompatibleApi {
                expected: dotted(API_VERSION),
                found: dotted(found),
            });
        }
        if found != API_VERSION {
            tracing::warn!(
                expected = %dotted(API_VERSION),
                found = %dotted(found),
                "TinyStan API version does not match; the model may need recompiling"
            );
        }
        Ok(())
    }

    /// Stan version the library was built with, as `major.minor.patch`
    pub fn stan_version(&self) -> Result<String> {
        let module = &self.module;
        let version = query_version(module, |major, minor, patch| unsafe {
            module.stan_version(major, minor, patch)
        })?;
        Ok(dotted(version))
    }

    /// Sample with NUTS-HMC
    pub fn sample(&self, p: &SamplerParams) -> Result<StanDraws> {
        p.validate()?;
        let seed = resolve_seed(p.seed);
        let data = p.data.to_json()?;

        with_model(&self.module, &data, seed, self.print.as_ref(), |session| {
            let module = session.module();
            let model = session.model();
            let free_params = session.num_free_params();
            let param_names = prefixed_names(&HMC_SAMPLER_VARIABLES, session.param_names());
            let n_params = param_names.len();
            let rows = p.num_draw_rows()?;
            let out_len = draws_len(rows, n_params)?;
            let metric_len = p.metric_len(free_params)?;
            let init_metric = p.expand_init_inv_metric(free_params)?;

            tracing::debug!(
                chains = p.num_chains,
                rows,
                n_params,
                free_params,
                seed,
                "sample"
            );

            let allocs = session.deferred();
            let metric_out = if p.save_inv_metric {
                allocs.alloc_f64s(metric_len)?
            } else {
                Ptr::NULL
            };
            let init_inv_metric = match &init_metric {
                Some(values) => allocs.write_f64s(values)?,
                None => Ptr::NULL,
            };
            let inits = allocs.encode_inits(p.inits.as_ref())?;
            let out = allocs.alloc_f64s(out_len)?;

            let err = session.error_cell()?;
            let args = SampleArgs {
                model,
                num_chains: p.num_chains,
                inits,
                seed,
                chain_id: p.id,
                init_radius: p.init_radius,
                num_warmup: p.num_warmup,
                num_samples: p.num_samples,
                metric: p.metric,
                init_inv_metric,
                adapt: p.adapt,
                delta: p.delta,
                gamma: p.gamma,
                kappa: p.kappa,
                t0: p.t0,
                init_buffer: p.init_buffer,
                term_buffer: p.term_buffer,
                window: p.window,
                save_warmup: p.save_warmup,
                stepsize: p.stepsize,
                stepsize_jitter: p.stepsize_jitter,
                max_depth: p.max_depth,
                refresh: p.refresh,
                num_threads: p.num_threads,
                out,
                out_size: out_len,
                metric_out,
                err: err.ptr(),
            };
            let rc = unsafe { module.sample(&args) };
            err.check(rc)?;

            let buf = unsafe { module.read_f64s(out, out_len) };
            let metric = if p.save_inv_metric {
                let raw = unsafe { module.read_f64s(metric_out, metric_len) };
                Some(match p.metric {
                    HmcMetric::Dense => {
                        InvMetric::Dense(decode_dense_metric(&raw, p.num_chains, free_params))
                    }
                    HmcMetric::Unit | HmcMetric::Diagonal => {
                        InvMetric::Diagonal(decode_diag_metric(&raw, p.num_chains, free_params))
                    }
                })
            } else {
                None
            };

            Ok(StanDraws {
                draws: decode_draws(&buf, n_params),
                param_names,
                metric,
            })
        })
    }

    /// Approximate the posterior with Pathfinder
    pub fn pathfinder(&self, p: &PathfinderParams) -> Result<StanDraws> {
        p.validate()?;
        let seed = resolve_seed(p.seed);
        let data = p.data.to_json()?;

        with_model(&self.module, &data, seed, self.print.as_ref(), |session| {
            let module = session.module();
            let model = session.model();
            if session.num_free_params() == 0 {
                return Err(StanError::validation("Model has no parameters."));
            }
            let param_names = prefixed_names(&PATHFINDER_VARIABLES, session.param_names());
            let n_params = param_names.len();
            let rows = p.num_draw_rows()?;
            let out_len = draws_len(rows, n_params)?;

            tracing::debug!(
                paths = p.num_paths,
                rows,
                n_params,
                seed,
                "pathfinder"
            );

            let allocs = session.deferred();
            let inits = allocs.encode_inits(p.inits.as_ref())?;
            let out = allocs.alloc_f64s(out_len)?;

            let err = session.error_cell()?;
            let args = PathfinderArgs {
                model,
                num_paths: p.num_paths,
                inits,
                seed,
                path_id: p.id,
                init_radius: p.init_radius,
                num_draws: p.num_draws,
                max_history_size: p.max_history_size,
                init_alpha: p.init_alpha,
                tol_obj: p.tol_obj,
                tol_rel_obj: p.tol_rel_obj,
                tol_grad: p.tol_grad,
                tol_rel_grad: p.tol_rel_grad,
                tol_param: p.tol_param,
                num_iterations: p.num_iterations,
                num_elbo_draws: p.num_elbo_draws,
                num_multi_draws: p.num_multi_draws,
                calculate_lp: p.calculate_lp,
                psis_resample: p.psis_resample,
                refresh: p.refresh,
                num_threads: p.num_threads,
                out,
                out_size: out_len,
                err: err.ptr(),
            };
            let rc = unsafe { module.pathfinder(&args) };
            err.check(rc)?;

            let buf = unsafe { module.read_f64s(out, out_len) };
            Ok(StanDraws {
                draws: decode_draws(&buf, n_params),
                param_names,
                metric: None,
            })
        })
    }

    /// Find a posterior mode (or the MLE without the Jacobian)
    pub fn optimize(&self, p: &OptimizeParams) -> Result<StanDraws> {
        let seed = resolve_seed(p.seed);
        let data = p.data.to_json()?;
        let init = p.init.clone().map(Inits::Single);

        with_model(&self.module, &data, seed, self.print.as_ref(), |session| {
            let module = session.module();
            let model = session.model();
            let param_names = prefixed_names(&OPTIMIZE_VARIABLES, session.param_names());
            let n_params = param_names.len();

            tracing::debug!(algorithm = ?p.algorithm, n_params, seed, "optimize");

            let allocs = session.deferred();
            let init_ptr = allocs.encode_inits(init.as_ref())?;
            let out = allocs.alloc_f64s(n_params)?;

            let err = session.error_cell()?;
            let args = OptimizeArgs {
                model,
                init: init_ptr,
                seed,
                id: p.id,
                init_radius: p.init_radius,
                algorithm: p.algorithm,
                num_iterations: p.num_iterations,
                jacobian: p.jacobian,
                max_history_size: p.max_history_size,
                init_alpha: p.init_alpha,
                tol_obj: p.tol_obj,
                tol_rel_obj: p.tol_rel_obj,
                tol_grad: p.tol_grad,
                tol_rel_grad: p.tol_rel_grad,
                tol_param: p.tol_param,
                refresh: p.refresh,
                num_threads: p.num_threads,
                out,
                out_size: n_params,
                err: err.ptr(),
            };
            let rc = unsafe { module.optimize(&args) };
            err.check(rc)?;

            let buf = unsafe { module.read_f64s(out, n_params) };
            Ok(StanDraws {
                draws: decode_draws(&buf, n_params),
                param_names,
                metric: None,
            })
        })
    }
}

fn dotted((major, minor, patch): (i32, i32, i32)) -> String {
    format!("{}.{}.{}", major, minor, patch)
}

/// Doubles in a row-major draws buffer
fn draws_len(rows: usize, n_params: usize) -> Result<usize> {
    rows.checked_mul(n_params)
        .ok_or_else(|| StanError::too_large("draws buffer"))
}
