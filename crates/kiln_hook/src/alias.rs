//! Fresh filesystem paths for reloading a library.
//!
//! A native loader keys loaded libraries by path, so loading a rebuilt
//! artifact from its usual location returns the stale module. Every reload
//! therefore goes through a path that has never been loaded before, allocated
//! under a per-session temporary directory that is removed on drop.

use crate::error::HookError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Scratch directory for reload aliases, created on first use.
#[derive(Debug, Default)]
pub struct SessionDir {
    dir: Mutex<Option<TempDir>>,
    counter: AtomicU64,
}

impl SessionDir {
    /// Creates a session directory that does not exist on disk yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The directory, if it has been created.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|d| d.path().to_path_buf())
    }

    /// Allocates an empty directory that no earlier call returned.
    pub fn fresh_dir(&self) -> Result<PathBuf, HookError> {
        let root = {
            let mut dir = self.lock();
            match dir.as_ref() {
                Some(d) => d.path().to_path_buf(),
                None => {
                    let created = tempfile::Builder::new()
                        .prefix("kiln_reload_")
                        .tempdir()
                        .map_err(|e| HookError::io(std::env::temp_dir(), e))?;
                    tracing::debug!("created reload directory {}", created.path().display());
                    let path = created.path().to_path_buf();
                    *dir = Some(created);
                    path
                }
            }
        };
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let fresh = root.join(format!("{n:06}"));
        std::fs::create_dir(&fresh).map_err(|e| HookError::io(&fresh, e))?;
        Ok(fresh)
    }

    /// Returns a new path through which `artifact` can be loaded as `name`.
    ///
    /// The returned path is `<fresh>/<name>/<file>`, where `<fresh>/<name>`
    /// links to the artifact's directory, so files next to the artifact
    /// resolve as they would at its real location.
    pub fn materialize_alias(&self, name: &str, artifact: &Path) -> Result<PathBuf, HookError> {
        let (dir, file) = split_artifact(artifact)?;
        let link = self.fresh_dir()?.join(name);
        link_dir(dir, &link, file)?;
        let alias = link.join(file);
        tracing::debug!("aliased {} as {}", artifact.display(), alias.display());
        Ok(alias)
    }

    /// Copies `artifact` into a fresh directory and returns the copy.
    pub fn fresh_copy(&self, artifact: &Path) -> Result<PathBuf, HookError> {
        let (_, file) = split_artifact(artifact)?;
        let dest = self.fresh_dir()?.join(file);
        std::fs::copy(artifact, &dest).map_err(|e| HookError::io(&dest, e))?;
        Ok(dest)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TempDir>> {
        self.dir.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn split_artifact(artifact: &Path) -> Result<(&Path, &std::ffi::OsStr), HookError> {
    match (artifact.parent(), artifact.file_name()) {
        (Some(dir), Some(file)) => Ok((dir, file)),
        _ => Err(HookError::io(
            artifact,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
        )),
    }
}

#[cfg(unix)]
fn link_dir(target: &Path, link: &Path, _file: &std::ffi::OsStr) -> Result<(), HookError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| HookError::io(link, e))
}

/// Directory symlinks need elevated rights on Windows, so copy the artifact.
#[cfg(not(unix))]
fn link_dir(target: &Path, link: &Path, file: &std::ffi::OsStr) -> Result<(), HookError> {
    std::fs::create_dir(link).map_err(|e| HookError::io(link, e))?;
    let dest = link.join(file);
    std::fs::copy(target.join(file), &dest).map_err(|e| HookError::io(&dest, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn created_lazily_and_removed_on_drop() {
        let session = SessionDir::new();
        assert!(session.path().is_none());
        let a = session.fresh_dir().unwrap();
        let b = session.fresh_dir().unwrap();
        assert_ne!(a, b);
        let root = session.path().unwrap();
        assert!(a.starts_with(&root));
        drop(session);
        assert!(!root.exists());
    }

    #[test]
    fn aliases_are_distinct_and_resolve_to_artifact() {
        let dist = tempfile::tempdir().unwrap();
        let artifact = dist.path().join("m.so");
        fs::write(&artifact, "lib").unwrap();

        let session = SessionDir::new();
        let first = session.materialize_alias("m", &artifact).unwrap();
        let second = session.materialize_alias("m", &artifact).unwrap();
        assert_ne!(first, second);
        assert_ne!(first, artifact);
        assert_eq!(first.file_name(), artifact.file_name());
        assert_eq!(fs::read_to_string(&first).unwrap(), "lib");
        assert_eq!(fs::read_to_string(&second).unwrap(), "lib");
    }

    #[cfg(unix)]
    #[test]
    fn alias_follows_rebuilt_artifact() {
        let dist = tempfile::tempdir().unwrap();
        let artifact = dist.path().join("m.so");
        fs::write(&artifact, "v1").unwrap();
        let session = SessionDir::new();
        let alias = session.materialize_alias("m", &artifact).unwrap();
        fs::write(&artifact, "v2").unwrap();
        assert_eq!(fs::read_to_string(&alias).unwrap(), "v2");
    }

    #[test]
    fn fresh_copy_is_independent() {
        let dist = tempfile::tempdir().unwrap();
        let artifact = dist.path().join("m.so");
        fs::write(&artifact, "v1").unwrap();
        let session = SessionDir::new();
        let copy = session.fresh_copy(&artifact).unwrap();
        fs::write(&artifact, "v2").unwrap();
        assert_eq!(fs::read_to_string(&copy).unwrap(), "v1");
    }

    #[test]
    fn rejects_bare_root() {
        let session = SessionDir::new();
        assert!(session.fresh_copy(Path::new("/")).is_err());
    }
}
