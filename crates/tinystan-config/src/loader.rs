//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::ProjectConfig;
use crate::settings::{validate_log_level, OutputFormat, Settings};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Extra model library directories, in `PATH` syntax
pub const ENV_LIBRARY_PATH: &str = "TINYSTAN_LIBRARY_PATH";
/// Default engine thread count
pub const ENV_NUM_THREADS: &str = "TINYSTAN_NUM_THREADS";
/// Default progress refresh interval
pub const ENV_REFRESH: &str = "TINYSTAN_REFRESH";
/// Log level
pub const ENV_LOG: &str = "TINYSTAN_LOG";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.tinystan/config.toml) - lowest priority
/// 2. Project config (./tinystan.toml) - overrides global
/// 3. Environment variables (TINYSTAN_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective settings after merging every layer
    pub settings: Settings,

    /// Project root directory (where tinystan.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use a fixed global config file instead of the one under the home directory
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find tinystan.toml, then merges it over
    /// the global config if one exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::discover(start_dir)?;
        self.assemble(project)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        self.assemble(project)
    }

    fn assemble(&mut self, project: ProjectConfig) -> ConfigResult<Config> {
        let mut settings = self.load_global_config()?.settings;
        settings.merge(&project.settings);
        apply_env_overrides(&mut settings)?;

        Ok(Config {
            settings,
            project_root: project.root,
        })
    }

    /// Load global configuration from ~/.tinystan/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        if self.global_config_path.is_none() {
            match GlobalConfig::global_config_path() {
                Ok(path) => self.global_config_path = Some(path),
                // No home directory means no global layer
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            }
        }

        match &self.global_config_path {
            Some(path) => GlobalConfig::load_optional(path),
            None => Ok(GlobalConfig::default()),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment variable overrides
///
/// `TINYSTAN_LIBRARY_PATH` is prepended to the configured search paths; the
/// other variables replace the configured value.
fn apply_env_overrides(settings: &mut Settings) -> ConfigResult<()> {
    if let Some(paths) = env::var_os(ENV_LIBRARY_PATH) {
        let library = settings.library.get_or_insert_with(Default::default);
        let mut extra: Vec<PathBuf> = env::split_paths(&paths)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        extra.append(&mut library.search_paths);
        library.search_paths = extra;
    }

    if let Some(threads) = env_parse::<i32>(ENV_NUM_THREADS)? {
        settings
            .defaults
            .get_or_insert_with(Default::default)
            .num_threads = Some(threads);
    }

    if let Some(refresh) = env_parse::<i32>(ENV_REFRESH)? {
        settings.defaults.get_or_insert_with(Default::default).refresh = Some(refresh);
    }

    if let Ok(level) = env::var(ENV_LOG) {
        validate_log_level(ENV_LOG, &level)?;
        settings.logging.get_or_insert_with(Default::default).level = Some(level);
    }

    settings.validate()
}

fn env_parse<T>(name: &str) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field: name.to_string(),
                reason: format!("'{}': {}", raw, e),
            }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Directories searched for model libraries, highest priority first
    pub fn search_paths(&self) -> &[PathBuf] {
        self.settings
            .library
            .as_ref()
            .map(|l| l.search_paths.as_slice())
            .unwrap_or(&[])
    }

    /// Whether to refuse libraries with a different API major version (default: true)
    pub fn check_api_version(&self) -> bool {
        self.settings
            .library
            .as_ref()
            .and_then(|l| l.check_api_version)
            .unwrap_or(true)
    }

    pub fn num_threads(&self) -> Option<i32> {
        self.settings.defaults.as_ref().and_then(|d| d.num_threads)
    }

    pub fn refresh(&self) -> Option<i32> {
        self.settings.defaults.as_ref().and_then(|d| d.refresh)
    }

    pub fn seed(&self) -> Option<u32> {
        self.settings.defaults.as_ref().and_then(|d| d.seed)
    }

    /// Get the effective output format (default: json)
    pub fn output_format(&self) -> OutputFormat {
        self.settings
            .output
            .as_ref()
            .and_then(|o| o.format)
            .unwrap_or_default()
    }

    pub fn pretty(&self) -> bool {
        self.settings
            .output
            .as_ref()
            .and_then(|o| o.pretty)
            .unwrap_or(false)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.settings
            .logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has tinystan.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
