use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tinystan_config::{Config, ConfigLoader};

mod commands;
mod logging;
mod output;

use commands::{OptimizeArgs, PathfinderArgs, SampleArgs, VersionArgs};

/// Run Stan algorithms on a compiled TinyStan model library.
///
/// A model library is a Stan program compiled with TinyStan into a shared
/// object. This CLI loads it, runs NUTS-HMC, Pathfinder or an optimizer,
/// and writes the draws as JSON or CSV.
///
/// EXAMPLES:
///     tinystan sample bernoulli -d bernoulli.data.json
///     tinystan pathfinder ./bernoulli_model.so --paths 8 --format csv
///     tinystan optimize bernoulli --algorithm bfgs --jacobian
///     tinystan version bernoulli
///
/// ENVIRONMENT VARIABLES:
///     TINYSTAN_LIBRARY_PATH  Extra directories to search for model libraries
///     TINYSTAN_NUM_THREADS   Default engine thread count
///     TINYSTAN_REFRESH       Default progress interval
///     TINYSTAN_LOG           Log level (off, error, warn, info, debug, trace)
#[derive(Parser, Debug)]
#[command(name = "tinystan")]
#[command(version)]
#[command(propagate_version = true)]
#[command(after_help = "For more information, see: https://github.com/WardBrian/tinystan")]
pub(crate) struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this configuration file instead of searching for tinystan.toml
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Draw posterior samples with NUTS-HMC
    ///
    /// Runs the adaptive No-U-Turn sampler over every chain in one call
    /// into the model library.
    ///
    /// EXAMPLES:
    ///     tinystan sample bernoulli -d data.json
    ///     tinystan sample bernoulli --chains 8 --samples 2000 --seed 42
    ///     tinystan sample bernoulli --metric dense --save-metric -o fit.json
    ///     tinystan sample bernoulli --inits a.json --inits b.json --chains 2
    #[command(visible_alias = "s")]
    Sample(SampleArgs),

    /// Approximate the posterior with Pathfinder
    ///
    /// Runs multi-path Pathfinder, optionally resampling the combined draws
    /// with Pareto-smoothed importance sampling.
    ///
    /// EXAMPLES:
    ///     tinystan pathfinder bernoulli -d data.json
    ///     tinystan pathfinder bernoulli --paths 8 --draws 500 --no-psis
    #[command(visible_alias = "p")]
    Pathfinder(PathfinderArgs),

    /// Find the posterior mode or maximum likelihood estimate
    ///
    /// EXAMPLES:
    ///     tinystan optimize bernoulli -d data.json
    ///     tinystan optimize bernoulli --algorithm newton
    ///     tinystan optimize bernoulli --jacobian --init init.json
    #[command(visible_alias = "o")]
    Optimize(OptimizeArgs),

    /// Show the Stan and TinyStan API versions of a model library
    ///
    /// EXAMPLES:
    ///     tinystan version bernoulli
    ///     tinystan version ./build/bernoulli_model.so
    Version(VersionArgs),

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     tinystan completions bash > ~/.local/share/bash-completion/completions/tinystan
    ///     tinystan completions zsh > ~/.zfunc/_tinystan
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    let mut loader = ConfigLoader::new();
    match explicit {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            loader
                .load_from_directory(&cwd)
                .context("Failed to load configuration")
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_ref())?;
    logging::init(cli.verbose, config.log_level())?;
    tracing::debug!(
        project_root = ?config.project_root(),
        search_paths = config.search_paths().len(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Sample(args) => commands::sample::run(args, &config),
        Commands::Pathfinder(args) => commands::pathfinder::run(args, &config),
        Commands::Optimize(args) => commands::optimize::run(args, &config),
        Commands::Version(args) => commands::version::run(args, &config),
        Commands::Completions { .. } => Ok(()),
    }
}
