//! Cache root resolution.

use kiln_common::EnvSource;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment override for the cache root.
pub const BUILD_DIR_ENV: &str = "KILN_BUILD_DIR";

/// Environment variable naming the active virtual environment.
const VIRTUAL_ENV: &str = "VIRTUAL_ENV";

/// Directory name used under every default location.
const CACHE_DIR_NAME: &str = "kiln_build_cache";

/// Where a resolved cache root came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRootSource {
    /// Set explicitly by configuration.
    Explicit,
    /// Set through `KILN_BUILD_DIR`.
    Environment,
    /// Default inside the active virtual environment.
    VirtualEnv,
    /// Default in the user's cache directory.
    System,
    /// Last resort in the temporary directory.
    Temp,
}

impl fmt::Display for CacheRootSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Explicit => "explicit",
            Self::Environment => BUILD_DIR_ENV,
            Self::VirtualEnv => "virtual environment",
            Self::System => "user cache directory",
            Self::Temp => "temporary directory",
        };
        f.write_str(s)
    }
}

/// A resolved cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoot {
    /// The directory holding all cache entries.
    pub path: PathBuf,
    /// Which rule selected it.
    pub source: CacheRootSource,
}

/// Resolves the cache root.
///
/// Precedence, highest first: `explicit`, `KILN_BUILD_DIR`, the active
/// virtual environment, the user cache directory, the temporary directory.
pub fn resolve_cache_root(explicit: Option<&Path>, env: &dyn EnvSource) -> CacheRoot {
    let root = |path: PathBuf, source| CacheRoot { path, source };
    if let Some(path) = explicit {
        return root(path.to_path_buf(), CacheRootSource::Explicit);
    }
    if let Some(path) = env.var(BUILD_DIR_ENV) {
        return root(PathBuf::from(path), CacheRootSource::Environment);
    }
    if let Some(venv) = env.var(VIRTUAL_ENV).map(PathBuf::from) {
        if is_writable_dir(&venv) {
            return root(venv.join(CACHE_DIR_NAME), CacheRootSource::VirtualEnv);
        }
        tracing::debug!(
            "virtual environment {} is not writable, using the user cache",
            venv.display()
        );
    }
    if let Some(cache) = dirs::cache_dir() {
        return root(cache.join(CACHE_DIR_NAME), CacheRootSource::System);
    }
    root(std::env::temp_dir().join(CACHE_DIR_NAME), CacheRootSource::Temp)
}

fn is_writable_dir(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false)
}
