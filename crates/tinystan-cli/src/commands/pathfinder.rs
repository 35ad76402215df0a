//! Pathfinder command

use super::{read_inits, RunArgs};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tinystan::PathfinderParams;
use tinystan_config::Config;

#[derive(Args, Debug, Clone)]
pub struct PathfinderArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Initial values file; repeat once per path for per-path inits
    #[arg(long)]
    pub inits: Vec<PathBuf>,

    /// Number of single-path runs
    #[arg(long)]
    pub paths: Option<usize>,

    /// Approximate draws per path
    #[arg(long)]
    pub draws: Option<i32>,

    /// Draws kept after importance resampling
    #[arg(long)]
    pub multi_draws: Option<i32>,

    /// Maximum L-BFGS iterations per path
    #[arg(long)]
    pub iterations: Option<i32>,

    /// Skip Pareto-smoothed importance resampling
    #[arg(long)]
    pub no_psis: bool,

    /// Skip log density evaluation of the draws (implies --no-psis)
    #[arg(long)]
    pub no_lp: bool,
}

impl PathfinderArgs {
    pub fn params(&self, config: &Config) -> Result<PathfinderParams> {
        let mut params: PathfinderParams = self.run.build_params(config)?;

        if let Some(n) = self.paths {
            params.num_paths = n;
        }
        if let Some(n) = self.draws {
            params.num_draws = n;
        }
        if let Some(n) = self.multi_draws {
            params.num_multi_draws = n;
        }
        if let Some(n) = self.iterations {
            params.num_iterations = n;
        }
        if self.no_psis {
            params.psis_resample = false;
        }
        if self.no_lp {
            params.calculate_lp = false;
        }
        if let Some(inits) = read_inits(&self.inits)? {
            params.inits = Some(inits);
        }
        Ok(params)
    }
}

pub fn run(args: PathfinderArgs, config: &Config) -> Result<()> {
    let params = args.params(config)?;
    params.validate()?;
    let rows = params.num_draw_rows()?;

    let model = args.run.model.open(config, args.run.print_callback())?;
    tracing::info!(
        paths = params.num_paths,
        draws = params.num_draws,
        rows,
        "running pathfinder"
    );
    let fit = model.pathfinder(&params).context("Pathfinder failed")?;

    args.run.emit(&fit, config)
}
