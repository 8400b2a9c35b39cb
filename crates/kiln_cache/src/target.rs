//! Build targets and their stable identities.

use kiln_common::{ContentHash, ContentHasher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Whether a target is a full project or a single source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A directory with a manifest and a recognized layout.
    Project,
    /// A standalone source file built through a synthesized project.
    File,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::File => write!(f, "file"),
        }
    }
}

/// The canonical identity of a target: its module name, resolved path and,
/// for an installed project, the environment it is installed into.
///
/// Two load requests name the same target iff their identities are equal.
/// The identity also determines the target's directory in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetIdentity {
    /// The importable module name.
    pub module_name: String,
    /// Absolute path of the project directory or source file.
    pub path: PathBuf,
    /// Hash of the install locations a project build writes into.
    ///
    /// One project installed into two environments is two targets with
    /// separate records and locks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<ContentHash>,
}

impl TargetIdentity {
    /// Creates an identity from a module name and an already resolved path.
    pub fn new(module_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            module_name: module_name.into(),
            path: path.into(),
            environment: None,
        }
    }

    /// Returns the cache directory name for this target.
    ///
    /// The name is `<module>_<hash>` where the hash covers the resolved path
    /// and the environment, so two files with the same stem in different
    /// directories do not collide.
    pub fn key(&self) -> String {
        let hash = match &self.environment {
            None => ContentHash::from_bytes(self.path.to_string_lossy().as_bytes()),
            Some(environment) => {
                let mut hasher = ContentHasher::new();
                hasher.write_str(&self.path.to_string_lossy());
                hasher.write_str(&environment.to_string());
                hasher.finish()
            }
        };
        format!("{}_{}", self.module_name, hash.short())
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.module_name, self.path.display())?;
        if let Some(environment) = &self.environment {
            write!(f, " [env {}]", environment.short())?;
        }
        Ok(())
    }
}

/// An importable unit backed by native source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Stable identity used as the cache key.
    pub identity: TargetIdentity,
    /// Project or standalone file.
    pub kind: TargetKind,
    /// The Cargo manifest of a project target.
    pub manifest_path: Option<PathBuf>,
    /// Every path whose contents participate in the fingerprint.
    ///
    /// For a project this is the project directory followed by its local
    /// path dependencies; for a file it is the file itself.
    pub source_roots: Vec<PathBuf>,
}

impl Target {
    /// Describes a project target rooted at `project_dir`.
    pub fn project(
        module_name: impl Into<String>,
        project_dir: &Path,
        manifest_path: &Path,
        path_dependencies: &[PathBuf],
    ) -> Self {
        let mut source_roots = vec![project_dir.to_path_buf()];
        source_roots.extend(path_dependencies.iter().cloned());
        Self {
            identity: TargetIdentity::new(module_name, project_dir),
            kind: TargetKind::Project,
            manifest_path: Some(manifest_path.to_path_buf()),
            source_roots,
        }
    }

    /// Scopes a project target to the environment whose install locations
    /// are `install_dirs`. An empty list leaves the target unscoped.
    pub fn installed_into(mut self, install_dirs: &[PathBuf]) -> Self {
        self.identity.environment = if install_dirs.is_empty() {
            None
        } else {
            let mut hasher = ContentHasher::new();
            for dir in install_dirs {
                hasher.write_str(&dir.to_string_lossy());
            }
            Some(hasher.finish())
        };
        self
    }

    /// Describes a standalone source file target.
    pub fn file(module_name: impl Into<String>, file_path: &Path) -> Self {
        Self {
            identity: TargetIdentity::new(module_name, file_path),
            kind: TargetKind::File,
            manifest_path: None,
            source_roots: vec![file_path.to_path_buf()],
        }
    }

    /// The module name this target is imported as.
    pub fn module_name(&self) -> &str {
        &self.identity.module_name
    }

    /// The project directory or source file.
    pub fn path(&self) -> &Path {
        &self.identity.path
    }
}
