//! On-disk cache of build records.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/targets/<module>_<hash>/record.json   last successful build
//! <root>/targets/<module>_<hash>/build.lock    advisory build lock
//! <root>/targets/<module>_<hash>/project/      synthesized project (files only)
//! <root>/targets/<module>_<hash>/dist/         build output
//! ```
//!
//! Records are written to a temporary file in the target directory and then
//! renamed into place, so a concurrent reader sees either the old or the new
//! record and never a partial one.

use crate::error::CacheError;
use crate::record::{CacheRecord, FORMAT_VERSION};
use crate::target::TargetIdentity;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const TARGETS_DIR: &str = "targets";
const RECORD_FILE: &str = "record.json";
const LOCK_FILE: &str = "build.lock";
const PROJECT_DIR: &str = "project";
const DIST_DIR: &str = "dist";

/// A cache of build records rooted at one directory.
///
/// The store holds no in-memory state; every call goes to disk, so several
/// stores (in one or many processes) over the same root stay consistent.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Opens the cache rooted at `root`. Directories are created lazily.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory holding everything cached for `identity`.
    pub fn target_dir(&self, identity: &TargetIdentity) -> PathBuf {
        self.root.join(TARGETS_DIR).join(identity.key())
    }

    /// The build lock file for `identity`.
    pub fn lock_path(&self, identity: &TargetIdentity) -> PathBuf {
        self.target_dir(identity).join(LOCK_FILE)
    }

    /// Where the synthesized project for a standalone file lives.
    pub fn project_dir(&self, identity: &TargetIdentity) -> PathBuf {
        self.target_dir(identity).join(PROJECT_DIR)
    }

    /// Where build output for `identity` is placed.
    pub fn dist_dir(&self, identity: &TargetIdentity) -> PathBuf {
        self.target_dir(identity).join(DIST_DIR)
    }

    fn record_path(&self, identity: &TargetIdentity) -> PathBuf {
        self.target_dir(identity).join(RECORD_FILE)
    }

    /// Reads the record for `identity`.
    ///
    /// Returns `Ok(None)` when there is no record, when it was written by a
    /// different format version, or when it cannot be decoded. I/O errors
    /// other than a missing file are returned.
    pub fn get(&self, identity: &TargetIdentity) -> Result<Option<CacheRecord>, CacheError> {
        let path = self.record_path(identity);
        match read_record(&path)? {
            Some(record) if record.identity != *identity => {
                tracing::warn!(
                    "cache record {} belongs to {}, ignoring",
                    path.display(),
                    record.identity
                );
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Writes `record`, replacing any previous record for the same target.
    pub fn put(&self, record: &CacheRecord) -> Result<(), CacheError> {
        let dir = self.target_dir(&record.identity);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        let json = serde_json::to_string_pretty(record).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| CacheError::io(&dir, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        let path = dir.join(RECORD_FILE);
        tmp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;
        tracing::debug!("stored cache record for {}", record.identity);
        Ok(())
    }

    /// Deletes the record for `identity`, leaving its artifacts in place.
    ///
    /// Returns true if a record was removed.
    pub fn invalidate(&self, identity: &TargetIdentity) -> Result<bool, CacheError> {
        let path = self.record_path(identity);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("invalidated cache record for {identity}");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Removes the entire cache root.
    ///
    /// Must not be called while a build is in flight; a concurrent build may
    /// fail or write its record into the freshly emptied root.
    pub fn clear_all(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {
                tracing::info!("cleared build cache {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.root, e)),
        }
    }

    /// Lists every readable record in the cache, ordered by module name.
    pub fn entries(&self) -> Result<Vec<CacheRecord>, CacheError> {
        let targets = self.root.join(TARGETS_DIR);
        let dir = match std::fs::read_dir(&targets) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(targets, e)),
        };
        let mut records = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| CacheError::io(&targets, e))?;
            if let Some(record) = read_record(&entry.path().join(RECORD_FILE))? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }

    /// Total size in bytes of all files under the cache root.
    pub fn size_bytes(&self) -> Result<u64, CacheError> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut total = 0;
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                CacheError::io(path, e.into())
            })?;
            if entry.file_type().is_file() {
                let metadata = entry.metadata().map_err(|e| {
                    CacheError::io(entry.path(), e.into())
                })?;
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

fn read_record(path: &Path) -> Result<Option<CacheRecord>, CacheError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    match decode_record(path, &content) {
        Ok(record) => Ok(record),
        Err(e) => {
            tracing::warn!("{e}; treating as a cache miss");
            Ok(None)
        }
    }
}

fn decode_record(path: &Path, content: &str) -> Result<Option<CacheRecord>, CacheError> {
    let parse_err = |e: serde_json::Error| CacheError::RecordParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let value: serde_json::Value = serde_json::from_str(content).map_err(parse_err)?;
    let version = value.get("format_version").and_then(|v| v.as_u64());
    if version != Some(u64::from(FORMAT_VERSION)) {
        tracing::debug!(
            "cache record {} has format version {:?}, expected {FORMAT_VERSION}",
            path.display(),
            version
        );
        return Ok(None);
    }
    serde_json::from_value(value).map(Some).map_err(parse_err)
}
