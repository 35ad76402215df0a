//! Dynamic loading of compiled model libraries
//!
//! A compiled model is a shared library exporting the `tinystan_*` entry
//! points. The loader resolves a short name or a path to a file using the
//! platform's naming conventions and loads it with `libloading`.

use libloading::Library;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Library loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found in any search path
    #[error("model library not found: {0}")]
    LibraryNotFound(String),

    /// Required entry point missing from the library
    #[error("symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    /// The dynamic loader rejected the file
    #[error("failed to load library '{library}': {reason}")]
    LoadFailed { library: String, reason: String },
}

/// Resolves and opens model libraries
///
/// # Safety
///
/// Loading a library runs its initializers inside this process. Only load
/// libraries you trust.
#[derive(Debug, Clone)]
pub struct LibraryLoader {
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    /// Loader over the current directory and the platform defaults
    pub fn new() -> Self {
        Self {
            search_paths: Self::default_search_paths(),
        }
    }

    /// Platform-specific default search paths, current directory first
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/usr/lib"));
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
        }

        paths
    }

    /// Prepend a search path; later additions take priority
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.insert(0, path.into());
    }

    /// Prepend several search paths, keeping their relative order
    pub fn with_search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut extra: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        extra.append(&mut self.search_paths);
        self.search_paths = extra;
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// File names a short library name may take on this platform
    fn candidate_names(name: &str) -> Vec<String> {
        let extensions: &[&str] = if cfg!(target_os = "windows") {
            &["dll"]
        } else if cfg!(target_os = "macos") {
            &["dylib", "so"]
        } else {
            &["so"]
        };
        let prefixes: &[&str] = if cfg!(target_os = "windows") {
            &["", "lib"]
        } else {
            &["lib", ""]
        };

        let mut names = Vec::new();
        for prefix in prefixes {
            for ext in extensions {
                names.push(format!("{}{}.{}", prefix, name, ext));
            }
        }
        // Compiled models are often named `<model>_model.so`
        for ext in extensions {
            names.push(format!("{}_model.{}", name, ext));
        }
        names
    }

    /// Resolve a library name or path to an existing file
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        let candidates = Self::candidate_names(name);
        self.search_paths
            .iter()
            .flat_map(|dir| candidates.iter().map(move |file| dir.join(file)))
            .find(|full| full.is_file())
    }

    /// Resolve and open a library
    ///
    /// # Safety
    ///
    /// The library's initialization code runs during this call.
    pub unsafe fn load(&self, name: &str) -> Result<(PathBuf, Library), LoadError> {
        let path = self
            .resolve(name)
            .ok_or_else(|| LoadError::LibraryNotFound(name.to_string()))?;

        tracing::debug!(path = %path.display(), "loading model library");
        let library = Library::new(&path).map_err(|e| LoadError::LoadFailed {
            library: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok((path, library))
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}
