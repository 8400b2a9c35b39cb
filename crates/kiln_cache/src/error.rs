//! Error types for fingerprinting, cache and lock operations.

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised by the cache subsystem.
///
/// A missing record is not an error; [`crate::CacheStore::get`] returns
/// `Ok(None)` for it. Everything here propagates to the driver.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The target path does not exist or is not a recognized layout.
    #[error("target not found at {path}: {reason}")]
    TargetNotFound {
        /// The path that was looked up.
        path: PathBuf,
        /// Why the path was rejected.
        reason: String,
    },

    /// Another holder kept the build lock for longer than the wait limit.
    #[error("timed out after {waited:?} waiting for build lock {path}")]
    LockTimeout {
        /// The lock file.
        path: PathBuf,
        /// How long the caller waited.
        waited: Duration,
    },

    /// A cache record exists but could not be decoded.
    #[error("failed to parse cache record {path}: {reason}")]
    RecordParse {
        /// The record file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A record could not be encoded.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
