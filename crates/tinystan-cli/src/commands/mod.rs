//! Subcommand implementations
//!
//! Every algorithm command builds its parameters in layers, lowest first:
//! engine defaults, configuration defaults, the `--params` file, then flags.

pub mod optimize;
pub mod pathfinder;
pub mod sample;
pub mod version;

pub use optimize::OptimizeArgs;
pub use pathfinder::PathfinderArgs;
pub use sample::SampleArgs;
pub use version::VersionArgs;

use crate::output;
use anyhow::{bail, Context, Result};
use clap::Args;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tinystan::{
    Inits, LibraryLoader, NativeModule, OptimizeParams, PathfinderParams, PrintCallback,
    SamplerParams, StanData, StanDraws, StanModel,
};
use tinystan_config::{Config, OutputFormat};

/// Which model library to load
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model library: a path, or a name searched for as lib<NAME>.so or <NAME>_model.so
    pub library: String,

    /// Extra directory to search for the model library (repeatable)
    #[arg(long = "lib-dir", short = 'L')]
    pub lib_dirs: Vec<PathBuf>,

    /// Load the library even if its TinyStan API major version differs
    #[arg(long)]
    pub no_api_check: bool,
}

impl ModelArgs {
    fn loader(&self, config: &Config) -> LibraryLoader {
        LibraryLoader::new()
            .with_search_paths(config.search_paths().iter().cloned())
            .with_search_paths(self.lib_dirs.iter().cloned())
    }

    /// Load the library without any version check
    pub fn load(&self, config: &Config) -> Result<StanModel<NativeModule>> {
        let loader = self.loader(config);
        // SAFETY: the user asked for this library by name; loading runs its initializers.
        let module = unsafe { NativeModule::load_with(&loader, &self.library) }
            .with_context(|| format!("Failed to load model library '{}'", self.library))?;
        tracing::info!(path = %module.path().display(), "loaded model library");
        Ok(StanModel::new(module))
    }

    /// Load the library, check its API version and route its print output
    pub fn open(
        &self,
        config: &Config,
        print: PrintCallback,
    ) -> Result<StanModel<NativeModule>> {
        let model = self.load(config)?;
        if config.check_api_version() && !self.no_api_check {
            model
                .check_api_version()
                .with_context(|| format!("Cannot use '{}'", self.library))?;
        }
        Ok(model.with_print_callback(print))
    }
}

/// Options shared by the algorithm commands
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// JSON data file
    #[arg(long, short = 'd')]
    pub data: Option<PathBuf>,

    /// Parameter table to start from (.toml or .json)
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Random seed (random when unset)
    #[arg(long)]
    pub seed: Option<u32>,

    /// Engine threads; -1 lets the engine choose
    #[arg(long, allow_negative_numbers = true)]
    pub threads: Option<i32>,

    /// Progress report interval in iterations; 0 disables
    #[arg(long)]
    pub refresh: Option<i32>,

    /// Output format: json or csv
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Indent JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Write results to this file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Silence the model's own progress output
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

/// Fields every algorithm's parameters share
pub struct Common<'a> {
    data: &'a mut StanData,
    seed: &'a mut Option<u32>,
    num_threads: &'a mut i32,
    refresh: &'a mut i32,
}

impl Common<'_> {
    fn apply(self, seed: Option<u32>, num_threads: Option<i32>, refresh: Option<i32>) {
        if seed.is_some() {
            *self.seed = seed;
        }
        if let Some(n) = num_threads {
            *self.num_threads = n;
        }
        if let Some(n) = refresh {
            *self.refresh = n;
        }
    }
}

/// Parameter records the runner can layer
pub trait LayeredParams: Default + Serialize + DeserializeOwned {
    fn common(&mut self) -> Common<'_>;
}

macro_rules! layered_params {
    ($($ty:ty),* $(,)?) => {$(
        impl LayeredParams for $ty {
            fn common(&mut self) -> Common<'_> {
                Common {
                    data: &mut self.data,
                    seed: &mut self.seed,
                    num_threads: &mut self.num_threads,
                    refresh: &mut self.refresh,
                }
            }
        }
    )*};
}

layered_params!(SamplerParams, PathfinderParams, OptimizeParams);

impl RunArgs {
    /// Build parameters from defaults, configuration, `--params`, then flags
    pub fn build_params<P: LayeredParams>(&self, config: &Config) -> Result<P> {
        let mut params = P::default();
        params
            .common()
            .apply(config.seed(), config.num_threads(), config.refresh());

        if let Some(path) = &self.params {
            params = overlay_file(&params, path)?;
        }

        params.common().apply(self.seed, self.threads, self.refresh);
        if let Some(path) = &self.data {
            *params.common().data = read_stan_json(path)?;
        }
        Ok(params)
    }

    /// Sink for the model's print output
    ///
    /// Results on stdout push model chatter to stderr.
    pub fn print_callback(&self) -> PrintCallback {
        if self.quiet {
            PrintCallback::new(|_, _| {})
        } else if self.output.is_none() {
            PrintCallback::new(|msg, _| eprint!("{}", msg))
        } else {
            PrintCallback::stdio()
        }
    }

    /// Render and write the results
    pub fn emit(&self, draws: &StanDraws, config: &Config) -> Result<()> {
        let format = self.format.unwrap_or_else(|| config.output_format());
        let pretty = self.pretty || config.pretty();
        let text = output::render(draws, format, pretty)?;
        output::write(&text, self.output.as_deref())?;

        if let Some(path) = &self.output {
            tracing::info!(path = %path.display(), %format, "results written");
        }
        Ok(())
    }
}

/// Merge a partial parameter table over `base`
fn overlay_file<P: Serialize + DeserializeOwned>(base: &P, path: &Path) -> Result<P> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameter file {}", path.display()))?;

    let overlay: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        _ => bail!(
            "Parameter file {} must end in .toml or .json",
            path.display()
        ),
    };
    let serde_json::Value::Object(overlay) = overlay else {
        bail!("Parameter file {} must contain a table", path.display());
    };

    let mut merged = serde_json::to_value(base)?;
    if let serde_json::Value::Object(fields) = &mut merged {
        fields.extend(overlay);
    }
    serde_json::from_value(merged)
        .with_context(|| format!("Invalid parameters in {}", path.display()))
}

/// Read a Stan JSON file verbatim
pub fn read_stan_json(path: &Path) -> Result<StanData> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(StanData::Json(text))
}

/// One file initializes every chain; several files give one per chain
pub fn read_inits(paths: &[PathBuf]) -> Result<Option<Inits>> {
    match paths {
        [] => Ok(None),
        [single] => Ok(Some(Inits::Single(read_stan_json(single)?))),
        many => {
            let per_chain = many
                .iter()
                .map(|p| read_stan_json(p))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Inits::PerChain(per_chain)))
        }
    }
}
