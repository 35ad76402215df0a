//! TinyStan runner configuration
//!
//! Provides configuration for the `tinystan` command-line runner:
//! - Project configuration (`tinystan.toml`, found by walking up)
//! - Global user configuration (`~/.tinystan/config.toml`)
//! - Environment overrides (`TINYSTAN_*`)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.tinystan/config.toml)
//! 2. Project config (./tinystan.toml)
//! 3. Environment variables (TINYSTAN_*)
//! 4. CLI flags (applied by the runner)
//!
//! # Example
//!
//! ```no_run
//! use tinystan_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("output format: {}", config.output_format());
//! ```

pub mod global;
pub mod loader;
pub mod project;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::{ProjectConfig, PROJECT_FILE_NAME};
pub use settings::{
    DefaultsConfig, LibraryConfig, LoggingConfig, OutputConfig, OutputFormat, Settings,
};
