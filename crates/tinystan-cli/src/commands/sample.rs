//! Sample command - NUTS-HMC

use super::{read_inits, RunArgs};
use anyhow::{bail, Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};
use tinystan::{HmcMetric, SamplerParams};
use tinystan_config::Config;

#[derive(Args, Debug, Clone)]
pub struct SampleArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Initial values file; repeat once per chain for per-chain inits
    #[arg(long)]
    pub inits: Vec<PathBuf>,

    /// Number of chains
    #[arg(long)]
    pub chains: Option<usize>,

    /// Warmup iterations per chain
    #[arg(long)]
    pub warmup: Option<i32>,

    /// Post-warmup draws per chain
    #[arg(long)]
    pub samples: Option<i32>,

    /// Inverse metric structure: unit, dense or diagonal
    #[arg(long)]
    pub metric: Option<HmcMetric>,

    /// JSON file with the initial inverse metric (nested arrays or {"inv_metric": ...})
    #[arg(long)]
    pub init_metric: Option<PathBuf>,

    /// Include the adapted inverse metric in the results
    #[arg(long)]
    pub save_metric: bool,

    /// Include warmup draws in the results
    #[arg(long)]
    pub save_warmup: bool,

    /// Disable step size and metric adaptation
    #[arg(long)]
    pub no_adapt: bool,

    /// Target acceptance rate during adaptation
    #[arg(long)]
    pub delta: Option<f64>,

    /// Initial step size
    #[arg(long)]
    pub stepsize: Option<f64>,

    /// Maximum tree depth
    #[arg(long)]
    pub max_depth: Option<i32>,
}

impl SampleArgs {
    /// Layered parameters with this command's flags on top
    pub fn params(&self, config: &Config) -> Result<SamplerParams> {
        let mut params: SamplerParams = self.run.build_params(config)?;

        if let Some(n) = self.chains {
            params.num_chains = n;
        }
        if let Some(n) = self.warmup {
            params.num_warmup = n;
        }
        if let Some(n) = self.samples {
            params.num_samples = n;
        }
        if let Some(metric) = self.metric {
            params.metric = metric;
        }
        if let Some(path) = &self.init_metric {
            params.init_inv_metric = Some(read_metric(path)?);
        }
        if self.save_metric {
            params.save_inv_metric = true;
        }
        if self.save_warmup {
            params.save_warmup = true;
        }
        if self.no_adapt {
            params.adapt = false;
        }
        if let Some(delta) = self.delta {
            params.delta = delta;
        }
        if let Some(stepsize) = self.stepsize {
            params.stepsize = stepsize;
        }
        if let Some(depth) = self.max_depth {
            params.max_depth = depth;
        }
        if let Some(inits) = read_inits(&self.inits)? {
            params.inits = Some(inits);
        }
        Ok(params)
    }
}

/// Read an inverse metric file into one flat row-major list
fn read_metric(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metric file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let value = match value.get("inv_metric") {
        Some(inner) => inner,
        None => &value,
    };

    let mut flat = Vec::new();
    flatten_numbers(value, &mut flat)
        .with_context(|| format!("Invalid metric in {}", path.display()))?;
    Ok(flat)
}

fn flatten_numbers(value: &serde_json::Value, out: &mut Vec<f64>) -> Result<()> {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                flatten_numbers(item, out)?;
            }
            Ok(())
        }
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(x) => {
                out.push(x);
                Ok(())
            }
            None => bail!("{} is not representable as a float", n),
        },
        other => bail!("expected numbers or arrays of numbers, found {}", other),
    }
}

pub fn run(args: SampleArgs, config: &Config) -> Result<()> {
    let params = args.params(config)?;
    params.validate()?;

    let model = args.run.model.open(config, args.run.print_callback())?;
    tracing::info!(
        chains = params.num_chains,
        warmup = params.num_warmup,
        samples = params.num_samples,
        metric = %params.metric,
        "sampling"
    );
    let fit = model.sample(&params).context("Sampling failed")?;

    args.run.emit(&fit, config)
}
