//! Dynamic loading of external scaling algorithms
//!
//! At startup the controller can load additional algorithms from shared
//! objects in a configured directory. A plugin exports a single symbol named
//! `Algorithm`:
//!
//! ```ignore
//! #[no_mangle]
//! pub fn Algorithm() -> Box<dyn ScalingAlgorithm> {
//!     Box::new(CappedSmoothRatio::new())
//! }
//! ```
//!
//! Plugins must be built with the same toolchain version as the host binary;
//! the constructor crosses the boundary with the Rust ABI. Loading is only
//! available on platforms with dynamic loading (linux, macos) - elsewhere
//! every operation returns [`PluginError::NotSupported`] and the controller
//! continues with the built-ins.
//!
//! Per-file failures are collected and surfaced as one aggregate error;
//! plugins that did load are still registered, and a duplicate name fails
//! that registration without aborting the batch.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Symbol name a plugin must export
pub const PLUGIN_SYMBOL: &str = "Algorithm";

/// Errors from plugin discovery and loading
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The configured plugin directory does not exist
    #[error("plugin directory not found: path={0:?}")]
    DirectoryNotFound(PathBuf),

    /// The configured plugin path exists but is not a directory
    #[error("plugin path is not a directory: path={0:?}")]
    NotADirectory(PathBuf),

    /// The named shared object does not exist
    #[error("plugin not found: path={0:?}")]
    PluginNotFound(PathBuf),

    /// The shared object could not be opened
    #[error("failed to load plugin: path={path:?}, error={message:?}")]
    LoadFailed {
        /// Path of the failing shared object
        path: PathBuf,
        /// Loader error message
        message: String,
    },

    /// The shared object does not export the `Algorithm` symbol
    #[error("plugin missing Algorithm symbol: path={0:?}")]
    SymbolNotFound(PathBuf),

    /// One or more plugins in a batch failed to load or register
    #[error("failed to load {} plugin(s): {}", failures.len(), failures.join("; "))]
    Batch {
        /// Individual failure descriptions
        failures: Vec<String>,
    },

    /// Dynamic loading is not available on this platform
    #[error("plugins are not supported on this platform")]
    NotSupported,
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod imp {
    use super::*;
    use crate::scaling::{Registry, ScalingAlgorithm};
    use tracing::info;

    #[cfg(target_os = "linux")]
    const PLUGIN_EXTENSION: &str = "so";
    #[cfg(target_os = "macos")]
    const PLUGIN_EXTENSION: &str = "dylib";

    type Constructor = unsafe fn() -> Box<dyn ScalingAlgorithm>;

    /// Load a single plugin from the given shared object
    pub fn load_plugin(path: &Path) -> Result<Box<dyn ScalingAlgorithm>, PluginError> {
        if !path.exists() {
            return Err(PluginError::PluginNotFound(path.to_path_buf()));
        }

        // SAFETY: the plugin contract requires a same-toolchain build
        // exporting `Algorithm` with the Constructor signature.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            PluginError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;

        let algorithm = unsafe {
            let constructor: libloading::Symbol<'_, Constructor> = library
                .get(PLUGIN_SYMBOL.as_bytes())
                .map_err(|_| PluginError::SymbolNotFound(path.to_path_buf()))?;
            constructor()
        };

        // The library must outlive the algorithm it produced; plugins stay
        // loaded for the life of the process.
        std::mem::forget(library);

        Ok(algorithm)
    }

    /// Discover shared objects in `dir` and register each exported algorithm
    ///
    /// Returns the names that were registered. Per-file load and register
    /// failures are collected into [`PluginError::Batch`]; everything that
    /// did load is registered regardless.
    pub fn load_and_register(dir: &Path, registry: &Registry) -> Result<Vec<String>, PluginError> {
        let metadata = std::fs::metadata(dir)
            .map_err(|_| PluginError::DirectoryNotFound(dir.to_path_buf()))?;
        if !metadata.is_dir() {
            return Err(PluginError::NotADirectory(dir.to_path_buf()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| PluginError::LoadFailed {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(PLUGIN_EXTENSION))
            .collect();
        paths.sort();

        let mut registered = Vec::new();
        let mut failures = Vec::new();

        for path in paths {
            let algorithm = match load_plugin(&path) {
                Ok(a) => a,
                Err(e) => {
                    failures.push(e.to_string());
                    continue;
                }
            };

            let name = algorithm.name().to_string();
            match registry.register(algorithm.into()) {
                Ok(()) => {
                    info!(name = %name, path = %path.display(), "registered plugin algorithm");
                    registered.push(name);
                }
                Err(e) => failures.push(e.to_string()),
            }
        }

        if failures.is_empty() {
            Ok(registered)
        } else {
            Err(PluginError::Batch { failures })
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod imp {
    use super::*;
    use crate::scaling::{Registry, ScalingAlgorithm};

    /// Dynamic loading is unavailable on this platform
    pub fn load_plugin(_path: &Path) -> Result<Box<dyn ScalingAlgorithm>, PluginError> {
        Err(PluginError::NotSupported)
    }

    /// Dynamic loading is unavailable on this platform
    pub fn load_and_register(
        _dir: &Path,
        _registry: &Registry,
    ) -> Result<Vec<String>, PluginError> {
        Err(PluginError::NotSupported)
    }
}

pub use imp::{load_and_register, load_plugin};
