//! Global Configuration (~/.tinystan/config.toml)
//!
//! Handles user-level configuration stored in `~/.tinystan/config.toml`.

use crate::settings::Settings;
use crate::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Global user configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlobalConfig {
    pub settings: Settings,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let mut settings = Settings::load_from_file(path)?;
        if let Some(dir) = path.parent() {
            settings.resolve_paths(dir);
        }
        Ok(Self { settings })
    }

    /// Load from `path` if it exists, else defaults
    pub fn load_optional(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// Get the global configuration directory (~/.tinystan)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".tinystan"))
    }

    /// Get the global config file path (~/.tinystan/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        Ok(Self::global_config_dir()?.join("config.toml"))
    }
}
