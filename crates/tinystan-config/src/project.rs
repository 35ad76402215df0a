//! Project Configuration (tinystan.toml)
//!
//! A `tinystan.toml` applies to its directory and everything below it. The
//! nearest one walking up from the working directory wins.

use crate::settings::Settings;
use crate::ConfigResult;
use std::path::{Path, PathBuf};

/// File name searched for in each directory
pub const PROJECT_FILE_NAME: &str = "tinystan.toml";

/// Project configuration and where it was found
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectConfig {
    pub settings: Settings,
    /// Directory holding the `tinystan.toml`
    pub root: Option<PathBuf>,
}

impl ProjectConfig {
    /// Load a specific project file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let mut settings = Settings::load_from_file(path)?;
        let root = path.parent().map(Path::to_path_buf);
        if let Some(root) = &root {
            settings.resolve_paths(root);
        }
        Ok(Self { settings, root })
    }

    /// Find the nearest project file at or above `start_dir`
    pub fn find(start_dir: &Path) -> Option<PathBuf> {
        start_dir
            .ancestors()
            .map(|dir| dir.join(PROJECT_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load the nearest project file, or defaults when there is none
    pub fn discover(start_dir: &Path) -> ConfigResult<Self> {
        match Self::find(start_dir) {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }
}
