//! Version command - report what a model library was built with

use super::ModelArgs;
use anyhow::Result;
use clap::Args;
use tinystan::{StanError, API_VERSION, VERSION};
use tinystan_config::Config;

#[derive(Args, Debug, Clone)]
pub struct VersionArgs {
    #[command(flatten)]
    pub model: ModelArgs,
}

/// Loads without the API check so mismatched libraries can still be inspected
pub fn run(args: VersionArgs, config: &Config) -> Result<()> {
    let model = args.model.load(config)?;
    let stan = model.stan_version()?;
    let (major, minor, patch) = model.api_version()?;

    println!("library:      {}", model.module().path().display());
    println!("Stan:         {}", stan);
    println!("TinyStan API: {}.{}.{}", major, minor, patch);
    println!(
        "runner:       tinystan {} (API {}.{}.{})",
        VERSION, API_VERSION.0, API_VERSION.1, API_VERSION.2
    );

    match model.check_api_version() {
        Ok(()) => {}
        Err(err @ StanError::IncompatibleApi { .. }) => println!("warning: {}", err),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
