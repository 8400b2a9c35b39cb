//! Error types surfaced to callers of the import hook.

use kiln_build::BuildError;
use kiln_cache::CacheError;
use kiln_config::ConfigError;
use kiln_project::ProjectError;
use std::path::PathBuf;
use std::time::Duration;

/// Errors from a load request.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The target path is not a recognized project or file.
    #[error("target not found at {path}: {reason}")]
    TargetNotFound {
        /// The path that was looked up.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// Another build of the same target held the lock for too long.
    #[error(
        "acquiring build lock {path} timed out after {waited:?}; if the target is still \
         compiling, raise lock_timeout_secs or set wait_forever"
    )]
    LockTimeout {
        /// The lock file.
        path: PathBuf,
        /// How long the request waited.
        waited: Duration,
    },

    /// The build tool reported failure. `output` is its diagnostics, unmodified.
    #[error("failed to build {target}:\n{output}")]
    BuildFailed {
        /// The module that was being built.
        target: String,
        /// The build tool's diagnostics.
        output: String,
    },

    /// A project build has no directory to find its installed library in.
    #[error(
        "no install location to find the library of {name} in; pass the environment's \
         site-packages directories as search paths or set install_dirs"
    )]
    NoInstallLocation {
        /// The module that would have been built.
        name: String,
    },

    /// The artifact was built but could not be loaded.
    #[error("failed to load module {name} from {path}: {reason}")]
    ModuleLoadFailed {
        /// The import name.
        name: String,
        /// The file the loader was given.
        path: PathBuf,
        /// The loader's message.
        reason: String,
    },

    /// A cache operation failed.
    #[error(transparent)]
    Cache(CacheError),

    /// A project could not be resolved.
    #[error(transparent)]
    Project(#[from] ProjectError),

    /// The hook configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An I/O error outside the cache, such as while materializing an alias.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl HookError {
    /// True for conditions a caller may retry or route differently.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TargetNotFound { .. } | Self::LockTimeout { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn build(target: &str, err: BuildError) -> Self {
        let output = match err {
            BuildError::Failed { output, .. } => output,
            other => other.to_string(),
        };
        Self::BuildFailed {
            target: target.to_string(),
            output,
        }
    }
}

impl From<CacheError> for HookError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::TargetNotFound { path, reason } => Self::TargetNotFound { path, reason },
            CacheError::LockTimeout { path, waited } => Self::LockTimeout { path, waited },
            other => Self::Cache(other),
        }
    }
}
