//! Decoded algorithm output
//!
//! The library writes draws record-major: all parameters of draw 0, then
//! all parameters of draw 1, and so on. Results are exposed
//! parameter-major, so `draws[i]` is every draw of parameter `i`.

use serde::Serialize;

/// Fixed diagnostic columns written by the NUTS-HMC sampler
pub const HMC_SAMPLER_VARIABLES: [&str; 7] = [
    "lp__",
    "accept_stat__",
    "stepsize__",
    "treedepth__",
    "n_leapfrog__",
    "divergent__",
    "energy__",
];

/// Fixed diagnostic columns written by Pathfinder
pub const PATHFINDER_VARIABLES: [&str; 3] = ["lp_approx__", "lp__", "path__"];

/// Fixed diagnostic columns written by the optimizers
pub const OPTIMIZE_VARIABLES: [&str; 1] = ["lp__"];

/// Adapted inverse metric, one block per chain
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvMetric {
    /// `[chain][param]`
    Diagonal(Vec<Vec<f64>>),
    /// `[chain][row][col]`
    Dense(Vec<Vec<Vec<f64>>>),
}

/// Draws returned by an algorithm
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StanDraws {
    pub param_names: Vec<String>,
    /// `draws[param][draw]`
    pub draws: Vec<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<InvMetric>,
}

impl StanDraws {
    /// Every draw of the parameter named `name`
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        let idx = self.param_names.iter().position(|n| n == name)?;
        self.draws.get(idx).map(Vec::as_slice)
    }

    pub fn num_params(&self) -> usize {
        self.param_names.len()
    }

    pub fn num_draws(&self) -> usize {
        self.draws.first().map_or(0, Vec::len)
    }

    /// One draw across all parameters, in `param_names` order
    pub fn row(&self, draw: usize) -> Option<Vec<f64>> {
        self.draws.iter().map(|col| col.get(draw).copied()).collect()
    }
}

/// Reshape a record-major buffer into `[param][draw]`
///
/// `draws[i][j]` is `buf[i + n_params * j]`.
pub fn decode_draws(buf: &[f64], n_params: usize) -> Vec<Vec<f64>> {
    if n_params == 0 {
        return Vec::new();
    }
    let n_draws = buf.len() / n_params;
    (0..n_params)
        .map(|i| (0..n_draws).map(|j| buf[i + n_params * j]).collect())
        .collect()
}

/// Split a diagonal metric buffer into `[chain][param]`
pub fn decode_diag_metric(buf: &[f64], chains: usize, free_params: usize) -> Vec<Vec<f64>> {
    (0..chains)
        .map(|c| buf[c * free_params..(c + 1) * free_params].to_vec())
        .collect()
}

/// Split a dense metric buffer into `[chain][row][col]`, row-major per chain
pub fn decode_dense_metric(buf: &[f64], chains: usize, free_params: usize) -> Vec<Vec<Vec<f64>>> {
    let block = free_params * free_params;
    (0..chains)
        .map(|c| {
            (0..free_params)
                .map(|j| {
                    let start = c * block + j * free_params;
                    buf[start..start + free_params].to_vec()
                })
                .collect()
        })
        .collect()
}

/// Fixed prefix followed by the model's own names
pub(crate) fn prefixed_names(prefix: &[&str], names: Vec<String>) -> Vec<String> {
    prefix
        .iter()
        .map(|s| s.to_string())
        .chain(names)
        .collect()
}
