//! Fingerprinting, persistent build records and per-target build locks.
//!
//! A [`Target`] is fingerprinted by the [`FingerprintEngine`] from the
//! modification times of its rebuild-relevant files plus the active build
//! settings. The [`CacheStore`] keeps one [`CacheRecord`] per target under a
//! shared cache root, and [`BuildLock`] serializes builds of the same target
//! across threads and processes.

#![warn(missing_docs)]

pub mod error;
pub mod fingerprint;
pub mod lock;
pub mod record;
pub mod root;
pub mod store;
pub mod target;

pub use error::CacheError;
pub use fingerprint::{FileStamp, Fingerprint, FingerprintEngine, BUILD_TOOL_OUTPUTS};
pub use lock::{BuildLock, LockGuard};
pub use record::{CacheRecord, FORMAT_VERSION};
pub use root::{resolve_cache_root, CacheRoot, CacheRootSource, BUILD_DIR_ENV};
pub use store::CacheStore;
pub use target::{Target, TargetIdentity, TargetKind};
