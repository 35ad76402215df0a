//! Inputs and configuration records for the algorithm drivers
//!
//! Every record implements `Default` with the engine's documented defaults
//! and deserializes with `#[serde(default)]`, so a partial table only
//! overrides the fields it names.

use crate::error::{Result, StanError};
use crate::ffi::{HmcMetric, OptimizationAlgorithm};
use rand::RngExt;
use serde::{Deserialize, Serialize};

/// Model data or initial values, as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StanData {
    /// Pre-encoded JSON text; empty means "no data"
    Json(String),
    /// A JSON tree
    Value(serde_json::Value),
}

impl StanData {
    /// Encode any serializable value
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(StanData::Value(serde_json::to_value(value)?))
    }

    /// JSON text handed to the model library
    pub fn to_json(&self) -> Result<String> {
        match self {
            StanData::Json(text) => Ok(text.clone()),
            StanData::Value(value) => Ok(serde_json::to_string(value)?),
        }
    }
}

impl Default for StanData {
    fn default() -> Self {
        StanData::Json(String::new())
    }
}

impl From<&str> for StanData {
    fn from(text: &str) -> Self {
        StanData::Json(text.to_string())
    }
}

impl From<String> for StanData {
    fn from(text: String) -> Self {
        StanData::Json(text)
    }
}

impl From<serde_json::Value> for StanData {
    fn from(value: serde_json::Value) -> Self {
        StanData::Value(value)
    }
}

/// Initial values for one or several chains (paths)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Inits {
    /// One initialization per chain, in chain order
    PerChain(Vec<StanData>),
    /// Shared by every chain
    Single(StanData),
}

impl Inits {
    /// Join per-chain inits with the module's separator character
    pub fn to_joined_json(&self, separator: char) -> Result<String> {
        match self {
            Inits::Single(data) => data.to_json(),
            Inits::PerChain(all) => {
                let encoded = all
                    .iter()
                    .map(StanData::to_json)
                    .collect::<Result<Vec<_>>>()?;
                Ok(encoded.join(&separator.to_string()))
            }
        }
    }

    fn check_count(&self, expected: usize, what: &str) -> Result<()> {
        match self {
            Inits::PerChain(all) if all.len() != expected => Err(StanError::validation(format!(
                "expected {} inits, one per {}, but got {}",
                expected,
                what,
                all.len()
            ))),
            _ => Ok(()),
        }
    }
}

impl From<StanData> for Inits {
    fn from(data: StanData) -> Self {
        Inits::Single(data)
    }
}

impl From<Vec<StanData>> for Inits {
    fn from(all: Vec<StanData>) -> Self {
        Inits::PerChain(all)
    }
}

/// Caller-supplied seed, or a random one
pub(crate) fn resolve_seed(seed: Option<u32>) -> u32 {
    match seed {
        Some(seed) => seed,
        None => {
            let mut rng = rand::rng();
            rng.random()
        }
    }
}

/// NUTS-HMC configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerParams {
    pub data: StanData,
    pub num_chains: usize,
    pub inits: Option<Inits>,
    pub seed: Option<u32>,
    pub id: u32,
    pub init_radius: f64,
    pub num_warmup: i32,
    pub num_samples: i32,
    pub metric: HmcMetric,
    /// Flattened initial inverse metric, for one chain or for all chains
    pub init_inv_metric: Option<Vec<f64>>,
    pub save_inv_metric: bool,
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
    pub max_depth: i32,
    pub refresh: i32,
    pub num_threads: i32,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            data: StanData::default(),
            num_chains: 4,
            inits: None,
            seed: None,
            id: 1,
            init_radius: 2.0,
            num_warmup: 1000,
            num_samples: 1000,
            metric: HmcMetric::Diagonal,
            init_inv_metric: None,
            save_inv_metric: false,
            adapt: true,
            delta: 0.8,
            gamma: 0.05,
            kappa: 0.75,
            t0: 10.0,
            init_buffer: 75,
            term_buffer: 50,
            window: 25,
            save_warmup: false,
            stepsize: 1.0,
            stepsize_jitter: 0.0,
            max_depth: 10,
            refresh: 0,
            num_threads: -1,
        }
    }
}

impl SamplerParams {
    /// Reject configurations that would size the output buffer wrongly
    pub fn validate(&self) -> Result<()> {
        if self.num_chains < 1 {
            return Err(StanError::validation("num_chains must be at least 1"));
        }
        if self.num_warmup < 0 {
            return Err(StanError::validation("num_warmup must be non-negative"));
        }
        if self.num_samples < 1 {
            return Err(StanError::validation("num_samples must be at least 1"));
        }
        if let Some(inits) = &self.inits {
            inits.check_count(self.num_chains, "chain")?;
        }
        self.num_draw_rows()?;
        Ok(())
    }

    /// Draw rows per parameter across all chains
    pub fn num_draw_rows(&self) -> Result<usize> {
        let per_chain = if self.save_warmup {
            self.num_samples
                .checked_add(self.num_warmup)
                .ok_or_else(|| StanError::too_large("num_samples + num_warmup"))?
        } else {
            self.num_samples
        };
        self.num_chains
            .checked_mul(per_chain.max(0) as usize)
            .ok_or_else(|| StanError::too_large("number of draws"))
    }

    /// `f64` slots of the adapted metric across all chains
    pub(crate) fn metric_len(&self, free_params: usize) -> Result<usize> {
        self.metric
            .slots_per_chain(free_params)
            .and_then(|slots| slots.checked_mul(self.num_chains))
            .ok_or_else(|| StanError::too_large("inverse metric"))
    }

    /// Expand the initial metric to one block per chain
    ///
    /// Accepts either a single block of `slots` values, repeated for every
    /// chain, or `num_chains * slots` values.
    pub(crate) fn expand_init_inv_metric(&self, free_params: usize) -> Result<Option<Vec<f64>>> {
        let Some(metric) = &self.init_inv_metric else {
            return Ok(None);
        };
        let total = self.metric_len(free_params)?;
        let slots = total / self.num_chains.max(1);
        if metric.len() == slots {
            Ok(Some(metric.repeat(self.num_chains)))
        } else if metric.len() == total {
            Ok(Some(metric.clone()))
        } else {
            Err(StanError::validation(format!(
                "invalid initial metric size: expected {} or {} values, got {}",
                slots,
                total,
                metric.len()
            )))
        }
    }
}

/// Pathfinder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathfinderParams {
    pub data: StanData,
    pub num_paths: usize,
    pub inits: Option<Inits>,
    pub seed: Option<u32>,
    pub id: u32,
    pub init_radius: f64,
    pub num_draws: i32,
    pub max_history_size: i32,
    pub init_alpha: f64,
    pub tol_obj: f64,
    pub tol_rel_obj: f64,
    pub tol_grad: f64,
    pub tol_rel_grad: f64,
    pub tol_param: f64,
    pub num_iterations: i32,
    pub num_elbo_draws: i32,
    pub num_multi_draws: i32,
    pub calculate_lp: bool,
    pub psis_resample: bool,
    pub refresh: i32,
    pub num_threads: i32,
}

impl Default for PathfinderParams {
    fn default() -> Self {
        Self {
            data: StanData::default(),
            num_paths: 4,
            inits: None,
            seed: None,
            id: 1,
            init_radius: 2.0,
            num_draws: 1000,
            max_history_size: 5,
            init_alpha: 0.001,
            tol_obj: 1e-12,
            tol_rel_obj: 1e4,
            tol_grad: 1e-8,
            tol_rel_grad: 1e7,
            tol_param: 1e-8,
            num_iterations: 1000,
            num_elbo_draws: 25,
            num_multi_draws: 1000,
            calculate_lp: true,
            psis_resample: true,
            refresh: 0,
            num_threads: -1,
        }
    }
}

impl PathfinderParams {
    pub fn validate(&self) -> Result<()> {
        if self.num_draws < 1 {
            return Err(StanError::validation("num_draws must be at least 1"));
        }
        if self.num_paths < 1 {
            return Err(StanError::validation("num_paths must be at least 1"));
        }
        if self.num_multi_draws < 1 {
            return Err(StanError::validation("num_multi_draws must be at least 1"));
        }
        if let Some(inits) = &self.inits {
            inits.check_count(self.num_paths, "path")?;
        }
        self.num_draw_rows()?;
        Ok(())
    }

    /// Rows in the output: resampled draws, or every path's draws
    pub fn num_draw_rows(&self) -> Result<usize> {
        if self.calculate_lp && self.psis_resample {
            Ok(self.num_multi_draws.max(0) as usize)
        } else {
            self.num_paths
                .checked_mul(self.num_draws.max(0) as usize)
                .ok_or_else(|| StanError::too_large("num_paths * num_draws"))
        }
    }
}

/// Optimization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizeParams {
    pub data: StanData,
    pub init: Option<StanData>,
    pub seed: Option<u32>,
    pub id: u32,
    pub init_radius: f64,
    pub algorithm: OptimizationAlgorithm,
    pub jacobian: bool,
    pub num_iterations: i32,
    pub max_history_size: i32,
    pub init_alpha: f64,
    pub tol_obj: f64,
    pub tol_rel_obj: f64,
    pub tol_grad: f64,
    pub tol_rel_grad: f64,
    pub tol_param: f64,
    pub refresh: i32,
    pub num_threads: i32,
}

impl Default for OptimizeParams {
    fn default() -> Self {
        Self {
            data: StanData::default(),
            init: None,
            seed: None,
            id: 1,
            init_radius: 2.0,
            algorithm: OptimizationAlgorithm::Lbfgs,
            jacobian: false,
            num_iterations: 2000,
            max_history_size: 5,
            init_alpha: 0.001,
            tol_obj: 1e-12,
            tol_rel_obj: 1e4,
            tol_grad: 1e-8,
            tol_rel_grad: 1e7,
            tol_param: 1e-8,
            refresh: 0,
            num_threads: -1,
        }
    }
}
