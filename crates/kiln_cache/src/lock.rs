//! Per-target advisory build locks.
//!
//! Locks are OS file locks on `<target dir>/build.lock`. They exclude other
//! processes as well as other threads of this process, since every
//! acquisition opens its own file handle. The lock is released when the
//! [`LockGuard`] is dropped or the process exits.

use crate::error::CacheError;
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Acquires build locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildLock;

/// An exclusively held build lock.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// The lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("failed to release build lock {}: {e}", self.path.display());
        }
    }
}

impl BuildLock {
    /// Blocks until the lock at `path` is held.
    ///
    /// With `timeout = None` this waits indefinitely. Otherwise it fails with
    /// [`CacheError::LockTimeout`] once `timeout` has elapsed.
    pub fn acquire(path: &Path, timeout: Option<Duration>) -> Result<LockGuard, CacheError> {
        let file = open_lock_file(path)?;
        if try_lock(&file, path)? {
            return Ok(LockGuard {
                file,
                path: path.to_path_buf(),
            });
        }

        tracing::info!("waiting on lock {}", path.display());
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let waited = started.elapsed();
            if let Some(limit) = timeout {
                if waited >= limit {
                    return Err(CacheError::LockTimeout {
                        path: path.to_path_buf(),
                        waited,
                    });
                }
                backoff = backoff.min(limit - waited);
            }
            std::thread::sleep(backoff);
            if try_lock(&file, path)? {
                tracing::debug!(
                    "acquired lock {} after {:.3}s",
                    path.display(),
                    started.elapsed().as_secs_f64()
                );
                return Ok(LockGuard {
                    file,
                    path: path.to_path_buf(),
                });
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Takes the lock at `path` if it is free, without waiting.
    pub fn try_acquire(path: &Path) -> Result<Option<LockGuard>, CacheError> {
        let file = open_lock_file(path)?;
        if try_lock(&file, path)? {
            Ok(Some(LockGuard {
                file,
                path: path.to_path_buf(),
            }))
        } else {
            Ok(None)
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| CacheError::io(path, e))
}

fn try_lock(file: &File, path: &Path) -> Result<bool, CacheError> {
    match FileExt::try_lock_exclusive(file) {
        Ok(()) => Ok(true),
        Err(e) if is_contended(&e) => Ok(false),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

/// `ERROR_LOCK_VIOLATION`, reported on Windows while another handle holds the lock.
const WINDOWS_LOCK_VIOLATION: i32 = 33;

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || (cfg!(windows) && e.raw_os_error() == Some(WINDOWS_LOCK_VIOLATION))
}
