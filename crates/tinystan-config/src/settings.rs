//! Settings schema shared by the global and project files
//!
//! ```toml
//! [library]
//! search_paths = ["./build", "/opt/models"]
//! check_api_version = true
//!
//! [defaults]
//! num_threads = 4
//! refresh = 100
//! seed = 1234
//!
//! [output]
//! format = "csv"
//! pretty = false
//!
//! [logging]
//! level = "info"
//! ```

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Model library lookup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<LibraryConfig>,

    /// Defaults applied to every algorithm run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Result output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,

    /// Diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Model library lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    /// Directories searched for compiled models, highest priority first
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,

    /// Refuse libraries built for another API major version (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_api_version: Option<bool>,
}

/// Defaults applied to every algorithm run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Engine threads; -1 lets the engine choose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<i32>,

    /// Progress report interval in iterations; 0 disables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<i32>,

    /// Fixed seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

/// Result output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,

    /// Indent JSON output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty: Option<bool>,
}

/// Diagnostics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of "off", "error", "warn", "info", "debug", "trace"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Serialization of algorithm results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Csv => f.write_str("csv"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("must be 'json' or 'csv', got '{}'", other)),
        }
    }
}

pub(crate) const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

impl Settings {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(defaults) = &self.defaults {
            if let Some(threads) = defaults.num_threads {
                if threads < -1 || threads == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "defaults.num_threads".to_string(),
                        reason: format!("must be -1 or a positive count, got {}", threads),
                    });
                }
            }
            if let Some(refresh) = defaults.refresh {
                if refresh < 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "defaults.refresh".to_string(),
                        reason: format!("must be non-negative, got {}", refresh),
                    });
                }
            }
        }

        if let Some(level) = self.logging.as_ref().and_then(|l| l.level.as_deref()) {
            validate_log_level("logging.level", level)?;
        }

        Ok(())
    }

    /// Resolve relative search paths against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(library) = self.library.as_mut() {
            for path in library.search_paths.iter_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }

    /// Merge another settings file into this one
    /// Other settings take precedence for every value they set
    pub fn merge(&mut self, other: &Settings) {
        if let Some(theirs) = &other.library {
            let ours = self.library.get_or_insert_with(Default::default);
            let mut paths = theirs.search_paths.clone();
            paths.append(&mut ours.search_paths);
            ours.search_paths = paths;
            ours.check_api_version = theirs.check_api_version.or(ours.check_api_version);
        }
        if let Some(theirs) = &other.defaults {
            let ours = self.defaults.get_or_insert_with(Default::default);
            ours.num_threads = theirs.num_threads.or(ours.num_threads);
            ours.refresh = theirs.refresh.or(ours.refresh);
            ours.seed = theirs.seed.or(ours.seed);
        }
        if let Some(theirs) = &other.output {
            let ours = self.output.get_or_insert_with(Default::default);
            ours.format = theirs.format.or(ours.format);
            ours.pretty = theirs.pretty.or(ours.pretty);
        }
        if let Some(theirs) = &other.logging {
            let ours = self.logging.get_or_insert_with(Default::default);
            if theirs.level.is_some() {
                ours.level = theirs.level.clone();
            }
        }
    }
}

/// Validate a log level name
pub(crate) fn validate_log_level(field: &str, level: &str) -> ConfigResult<()> {
    if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be one of {}, got '{}'", LOG_LEVELS.join(", "), level),
        });
    }
    Ok(())
}
