//! Enumerations shared with the foreign module
//!
//! Each enum mirrors an integer encoding fixed by the compiled library:
//! - `HmcMetric`: 0 = unit, 1 = dense, 2 = diagonal
//! - `OptimizationAlgorithm`: 0 = newton, 1 = bfgs, 2 = lbfgs
//! - `StanErrorKind`: 0 = generic, 1 = config, 2 = interrupt

use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::raw::c_int;

/// Structure of the inverse mass matrix used by the HMC sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum HmcMetric {
    /// Identity matrix
    Unit = 0,
    /// Full matrix, `free_params x free_params` per chain
    Dense = 1,
    /// Diagonal only, `free_params` per chain
    #[default]
    Diagonal = 2,
}

impl HmcMetric {
    /// Integer code passed to the foreign `sample` entry point
    pub const fn code(self) -> c_int {
        self as c_int
    }

    /// Number of `f64` slots one chain's adapted metric occupies, if it fits in `usize`
    pub const fn slots_per_chain(self, free_params: usize) -> Option<usize> {
        match self {
            HmcMetric::Dense => free_params.checked_mul(free_params),
            HmcMetric::Unit | HmcMetric::Diagonal => Some(free_params),
        }
    }
}

impl std::str::FromStr for HmcMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unit" => Ok(HmcMetric::Unit),
            "dense" => Ok(HmcMetric::Dense),
            "diagonal" | "diag" => Ok(HmcMetric::Diagonal),
            other => Err(format!(
                "unknown metric '{}', expected 'unit', 'dense' or 'diagonal'",
                other
            )),
        }
    }
}

impl fmt::Display for HmcMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HmcMetric::Unit => "unit",
            HmcMetric::Dense => "dense",
            HmcMetric::Diagonal => "diagonal",
        };
        f.write_str(name)
    }
}

/// Optimization algorithm used by the foreign `optimize` entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum OptimizationAlgorithm {
    Newton = 0,
    Bfgs = 1,
    #[default]
    Lbfgs = 2,
}

impl OptimizationAlgorithm {
    /// Integer code passed to the foreign `optimize` entry point
    pub const fn code(self) -> c_int {
        self as c_int
    }
}

impl std::str::FromStr for OptimizationAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newton" => Ok(OptimizationAlgorithm::Newton),
            "bfgs" => Ok(OptimizationAlgorithm::Bfgs),
            "lbfgs" | "l-bfgs" => Ok(OptimizationAlgorithm::Lbfgs),
            other => Err(format!(
                "unknown algorithm '{}', expected 'newton', 'bfgs' or 'lbfgs'",
                other
            )),
        }
    }
}

/// Category reported by `get_error_type` for a foreign error object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StanErrorKind {
    /// Runtime failure inside the algorithm
    Generic,
    /// Invalid argument detected by the engine
    Config,
    /// The run was interrupted
    Interrupt,
}

impl StanErrorKind {
    /// Decode the foreign error type; unknown codes are treated as generic
    pub fn from_code(code: c_int) -> Self {
        match code {
            1 => StanErrorKind::Config,
            2 => StanErrorKind::Interrupt,
            _ => StanErrorKind::Generic,
        }
    }
}

impl fmt::Display for StanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StanErrorKind::Generic => "generic",
            StanErrorKind::Config => "config",
            StanErrorKind::Interrupt => "interrupt",
        };
        f.write_str(name)
    }
}
