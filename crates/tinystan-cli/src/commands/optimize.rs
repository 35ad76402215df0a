//! Optimize command - posterior mode or MLE

use super::{read_stan_json, RunArgs};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tinystan::{OptimizationAlgorithm, OptimizeParams};
use tinystan_config::Config;

#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Initial values file
    #[arg(long)]
    pub init: Option<PathBuf>,

    /// Optimizer: newton, bfgs or lbfgs
    #[arg(long)]
    pub algorithm: Option<OptimizationAlgorithm>,

    /// Apply the Jacobian adjustment (maximum a posteriori in the unconstrained space)
    #[arg(long)]
    pub jacobian: bool,

    /// Maximum iterations
    #[arg(long)]
    pub iterations: Option<i32>,
}

impl OptimizeArgs {
    pub fn params(&self, config: &Config) -> Result<OptimizeParams> {
        let mut params: OptimizeParams = self.run.build_params(config)?;

        if let Some(path) = &self.init {
            params.init = Some(read_stan_json(path)?);
        }
        if let Some(algorithm) = self.algorithm {
            params.algorithm = algorithm;
        }
        if self.jacobian {
            params.jacobian = true;
        }
        if let Some(n) = self.iterations {
            params.num_iterations = n;
        }
        Ok(params)
    }
}

pub fn run(args: OptimizeArgs, config: &Config) -> Result<()> {
    let params = args.params(config)?;

    let model = args.run.model.open(config, args.run.print_callback())?;
    tracing::info!(
        algorithm = ?params.algorithm,
        jacobian = params.jacobian,
        "optimizing"
    );
    let fit = model.optimize(&params).context("Optimization failed")?;

    args.run.emit(&fit, config)
}
