//! The build collaborator interface.

use crate::error::BuildError;
use kiln_config::{BuildCommand, BuildSettings};
use std::path::PathBuf;

/// How a target is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    /// An existing project, built and installed in place.
    Project,
    /// A project synthesized around a single source file.
    Synthesized,
}

/// Everything a [`Builder`] needs to produce one library.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Project or synthesized project.
    pub kind: BuildKind,
    /// The module the library exports.
    pub module_name: String,
    /// The Cargo manifest to build.
    pub manifest_path: PathBuf,
    /// Directory a synthesized build copies its library into.
    pub output_dir: PathBuf,
    /// Directories searched for the installed library of a project build.
    pub artifact_search_dirs: Vec<PathBuf>,
    /// Build tool flags.
    pub settings: BuildSettings,
}

impl BuildRequest {
    /// The flags this request passes to the build tool.
    ///
    /// These are recorded with the cache entry so they can be inspected later.
    pub fn args(&self) -> Vec<String> {
        match self.kind {
            BuildKind::Project => self.settings.to_args(BuildCommand::Develop),
            BuildKind::Synthesized => self.settings.cargo_args(),
        }
    }
}

/// The result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProduct {
    /// The loadable library that was produced.
    pub artifact: PathBuf,
    /// The tool's combined output, including warnings.
    pub output: String,
}

/// Compiles a target into a loadable library.
///
/// Implementations must be safe to call from several threads; the driver
/// guarantees that at most one build per target runs at a time.
pub trait Builder: Send + Sync {
    /// Builds `request`, returning the produced library.
    ///
    /// On failure the tool's diagnostics must be returned unmodified in
    /// [`BuildError::Failed`].
    fn build(&self, request: &BuildRequest) -> Result<BuildProduct, BuildError>;
}
