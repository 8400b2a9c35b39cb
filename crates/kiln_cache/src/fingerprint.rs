//! Source tree fingerprinting.
//!
//! A fingerprint combines the sorted listing of a target's rebuild-relevant
//! files (path, modification time, length) with the canonical serialization
//! of the build settings. Modification times are used instead of file
//! contents, so touching a file without editing it still forces a rebuild
//! attempt.

use crate::error::CacheError;
use crate::target::{Target, TargetKind};
use kiln_common::{ContentHash, ContentHasher};
use kiln_config::{BuildSettings, SourceFilterConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::{DirEntry, WalkDir};

/// Comparable signature of a target's rebuild-relevant inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(ContentHash);

impl Fingerprint {
    /// The underlying hash.
    pub fn hash(&self) -> ContentHash {
        self.0
    }
}

impl From<ContentHash> for Fingerprint {
    fn from(hash: ContentHash) -> Self {
        Self(hash)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Files a build tool may create or rewrite inside the tree it builds.
pub const BUILD_TOOL_OUTPUTS: &[&str] = &["Cargo.lock"];

fn is_build_tool_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| BUILD_TOOL_OUTPUTS.contains(&n))
}

/// One file's contribution to a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileStamp {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified_ns: u128,
    /// File length in bytes.
    pub len: u64,
}

/// Computes fingerprints under a fixed set of source filter rules.
#[derive(Debug, Clone, Default)]
pub struct FingerprintEngine {
    filter: SourceFilterConfig,
}

impl FingerprintEngine {
    /// Creates an engine using the given filter rules.
    pub fn new(filter: SourceFilterConfig) -> Self {
        Self { filter }
    }

    /// Computes the fingerprint of `target` under `settings`.
    ///
    /// Fails with [`CacheError::TargetNotFound`] if a source root is missing
    /// or a project has no manifest.
    pub fn fingerprint(
        &self,
        target: &Target,
        settings: &BuildSettings,
    ) -> Result<Fingerprint, CacheError> {
        let stamps = self.scan(target)?;
        Ok(self.combine(target, &stamps, settings))
    }

    /// Combines an already scanned file listing with `settings`.
    pub fn combine(
        &self,
        target: &Target,
        stamps: &[FileStamp],
        settings: &BuildSettings,
    ) -> Fingerprint {
        let mut hasher = ContentHasher::new();
        hasher.write_str(&target.kind.to_string());
        for stamp in stamps {
            hasher.write_str(&stamp.path.to_string_lossy());
            hasher.write_u128(stamp.modified_ns);
            hasher.write_u128(u128::from(stamp.len));
        }
        hasher.write_str(&settings.canonical());
        let fingerprint = Fingerprint(hasher.finish());
        tracing::trace!(
            target_id = %target.identity,
            files = stamps.len(),
            %fingerprint,
            "computed fingerprint"
        );
        fingerprint
    }

    /// The fingerprint to record for a build that started from `before`.
    ///
    /// Build tools create or rewrite some files inside the project, such as
    /// `Cargo.lock`. If those are the only changes since `before`, this is
    /// the fingerprint of the tree as it is now. Any other change means a
    /// source was edited during the build, and the fingerprint of `before`
    /// is returned so the next load rebuilds.
    pub fn after_build(
        &self,
        target: &Target,
        settings: &BuildSettings,
        before: &[FileStamp],
    ) -> Result<Fingerprint, CacheError> {
        let after = self.scan(target)?;
        let old: BTreeSet<&FileStamp> = before.iter().collect();
        let new: BTreeSet<&FileStamp> = after.iter().collect();
        let only_tool_outputs = old
            .symmetric_difference(&new)
            .all(|stamp| is_build_tool_output(&stamp.path));
        if only_tool_outputs {
            Ok(self.combine(target, &after, settings))
        } else {
            tracing::debug!(
                "sources of {} changed during the build",
                target.identity.module_name
            );
            Ok(self.combine(target, before, settings))
        }
    }

    /// Lists the files of `target` that participate in its fingerprint,
    /// sorted by path with duplicates removed.
    pub fn scan(&self, target: &Target) -> Result<Vec<FileStamp>, CacheError> {
        self.check_layout(target)?;
        let mut stamps = Vec::new();
        for root in &target.source_roots {
            self.scan_root(root, &mut stamps)?;
        }
        stamps.sort();
        stamps.dedup_by(|a, b| a.path == b.path);
        Ok(stamps)
    }

    fn check_layout(&self, target: &Target) -> Result<(), CacheError> {
        let not_found = |path: &Path, reason: &str| CacheError::TargetNotFound {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        let path = target.path();
        match target.kind {
            TargetKind::Project => {
                if !path.is_dir() {
                    return Err(not_found(path, "project directory does not exist"));
                }
                match &target.manifest_path {
                    Some(manifest) if manifest.is_file() => {}
                    _ => return Err(not_found(path, "not a recognized project layout")),
                }
            }
            TargetKind::File => {
                if !path.is_file() {
                    return Err(not_found(path, "source file does not exist"));
                }
            }
        }
        for root in &target.source_roots {
            if !root.exists() {
                return Err(not_found(root, "source path does not exist"));
            }
        }
        Ok(())
    }

    fn scan_root(&self, root: &Path, stamps: &mut Vec<FileStamp>) -> Result<(), CacheError> {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_pruned_dir(entry));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                CacheError::io(path, e.into())
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            if entry.depth() > 0 && self.is_excluded_file(entry.path()) {
                continue;
            }
            // Follows symlinks so a linked source reports its target's mtime.
            let metadata = match std::fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("{} vanished during scan", entry.path().display());
                    continue;
                }
                Err(e) => return Err(CacheError::io(entry.path(), e)),
            };
            if metadata.is_dir() {
                continue;
            }
            let modified = metadata
                .modified()
                .map_err(|e| CacheError::io(entry.path(), e))?;
            let modified_ns = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            stamps.push(FileStamp {
                path: entry.path().to_path_buf(),
                modified_ns,
                len: metadata.len(),
            });
        }
        Ok(())
    }

    fn is_pruned_dir(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if self.filter.excluded_dir_names.contains(name.as_ref()) {
            return true;
        }
        self.filter
            .ignore_markers
            .iter()
            .any(|marker| entry.path().join(marker).exists())
    }

    fn is_excluded_file(&self, path: &Path) -> bool {
        let is_marker = path
            .file_name()
            .map(|n| self.filter.ignore_markers.contains(n.to_string_lossy().as_ref()))
            .unwrap_or(false);
        let excluded_ext = path
            .extension()
            .map(|ext| self.filter.is_excluded_extension(&ext.to_string_lossy()))
            .unwrap_or(false);
        is_marker || excluded_ext
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, Target) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
        fs::write(root.join("pyproject.toml"), "[build-system]\n").unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub fn f() {}\n").unwrap();
        let target = Target::project("demo", root, &root.join("Cargo.toml"), &[]);
        (dir, target)
    }

    fn touch(path: &Path, secs: i64) {
        set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    fn fp(engine: &FingerprintEngine, target: &Target) -> Fingerprint {
        engine.fingerprint(target, &BuildSettings::default()).unwrap()
    }

    #[test]
    fn deterministic() {
        let (_dir, target) = project();
        let engine = FingerprintEngine::default();
        assert_eq!(fp(&engine, &target), fp(&engine, &target));
    }

    #[test]
    fn mtime_change_changes_fingerprint() {
        let (dir, target) = project();
        let engine = FingerprintEngine::default();
        let lib = dir.path().join("src/lib.rs");
        touch(&lib, 1_000_000);
        let before = fp(&engine, &target);
        touch(&lib, 1_000_100);
        assert_ne!(before, fp(&engine, &target));
    }

    #[test]
    fn new_file_changes_fingerprint() {
        let (dir, target) = project();
        let engine = FingerprintEngine::default();
        let before = fp(&engine, &target);
        fs::write(dir.path().join("src/extra.rs"), "").unwrap();
        assert_ne!(before, fp(&engine, &target));
    }

    #[test]
    fn settings_change_changes_fingerprint() {
        let (_dir, target) = project();
        let engine = FingerprintEngine::default();
        let stripped = BuildSettings {
            strip: true,
            ..Default::default()
        };
        let a = engine.fingerprint(&target, &BuildSettings::default()).unwrap();
        let b = engine.fingerprint(&target, &stripped).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn ignore_marker_prunes_subtree() {
        let (dir, target) = project();
        let vendor = dir.path().join("vendor");
        fs::create_dir_all(vendor.join("nested")).unwrap();
        fs::write(vendor.join(".kiln_ignore"), "").unwrap();
        let vendored = vendor.join("nested/big.rs");
        fs::write(&vendored, "// vendored\n").unwrap();
        touch(&vendored, 1_000_000);

        let engine = FingerprintEngine::default();
        let before = fp(&engine, &target);
        fs::write(&vendored, "// vendored, edited\n").unwrap();
        touch(&vendored, 1_000_500);
        assert_eq!(before, fp(&engine, &target));
    }

    #[test]
    fn excluded_names_and_extensions_are_skipped() {
        let (dir, target) = project();
        fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        fs::write(dir.path().join("target/debug/libdemo.rlib"), "").unwrap();
        fs::write(dir.path().join("README.md"), "docs").unwrap();
        fs::write(dir.path().join("demo.so"), "").unwrap();

        let stamps = FingerprintEngine::default().scan(&target).unwrap();
        let names: Vec<_> = stamps
            .iter()
            .map(|s| s.path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("Cargo.toml"),
                PathBuf::from("pyproject.toml"),
                PathBuf::from("src/lib.rs"),
            ]
        );
    }

    #[test]
    fn included_extension_is_scanned() {
        let (dir, target) = project();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        let mut filter = SourceFilterConfig::default();
        filter.included_extensions.insert(".txt".to_string());
        let stamps = FingerprintEngine::new(filter).scan(&target).unwrap();
        assert!(stamps.iter().any(|s| s.path.ends_with("notes.txt")));
    }

    #[test]
    fn path_dependencies_participate() {
        let (dir, _) = project();
        let dep = tempfile::tempdir().unwrap();
        fs::write(dep.path().join("lib.rs"), "").unwrap();
        touch(&dep.path().join("lib.rs"), 1_000_000);
        let target = Target::project(
            "demo",
            dir.path(),
            &dir.path().join("Cargo.toml"),
            &[dep.path().to_path_buf()],
        );
        let engine = FingerprintEngine::default();
        let before = fp(&engine, &target);
        touch(&dep.path().join("lib.rs"), 1_000_001);
        assert_ne!(before, fp(&engine, &target));
    }

    #[test]
    fn lockfile_written_by_the_build_is_absorbed() {
        let (dir, target) = project();
        let engine = FingerprintEngine::default();
        let settings = BuildSettings::default();
        let before = engine.scan(&target).unwrap();
        let pre = engine.combine(&target, &before, &settings);

        fs::write(dir.path().join("Cargo.lock"), "version = 4\n").unwrap();
        let recorded = engine.after_build(&target, &settings, &before).unwrap();
        assert_ne!(recorded, pre);
        assert_eq!(recorded, fp(&engine, &target));
    }

    #[test]
    fn source_edit_during_build_keeps_the_old_fingerprint() {
        let (dir, target) = project();
        let engine = FingerprintEngine::default();
        let settings = BuildSettings::default();
        let lib = dir.path().join("src/lib.rs");
        touch(&lib, 1_000_000);
        let before = engine.scan(&target).unwrap();
        let pre = engine.combine(&target, &before, &settings);

        fs::write(dir.path().join("Cargo.lock"), "version = 4\n").unwrap();
        touch(&lib, 1_000_100);
        let recorded = engine.after_build(&target, &settings, &before).unwrap();
        assert_eq!(recorded, pre);
        assert_ne!(recorded, fp(&engine, &target));
    }

    #[test]
    fn standalone_file_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.rs");
        fs::write(&file, "fn main() {}\n").unwrap();
        fs::write(dir.path().join("other.rs"), "").unwrap();
        let target = Target::file("script", &file);
        let stamps = FingerprintEngine::default().scan(&target).unwrap();
        assert_eq!(stamps.len(), 1);
        assert_eq!(stamps[0].path, file);
    }

    #[test]
    fn missing_path_is_target_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::file("gone", &dir.path().join("gone.rs"));
        let err = FingerprintEngine::default()
            .fingerprint(&target, &BuildSettings::default())
            .unwrap_err();
        assert!(matches!(err, CacheError::TargetNotFound { .. }));
    }

    #[test]
    fn project_without_manifest_is_target_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::project("p", dir.path(), &dir.path().join("Cargo.toml"), &[]);
        let err = FingerprintEngine::default().scan(&target).unwrap_err();
        match err {
            CacheError::TargetNotFound { reason, .. } => {
                assert!(reason.contains("not a recognized project layout"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
