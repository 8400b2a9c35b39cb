//! Error types for project resolution.

use std::path::PathBuf;

/// Reasons a directory could not be resolved as a project.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// The directory has no `pyproject.toml`.
    #[error("no pyproject.toml found in {dir}")]
    NoPyproject {
        /// The directory that was inspected.
        dir: PathBuf,
    },

    /// `pyproject.toml` lacks required fields.
    #[error("{path} is invalid: {reason}")]
    InvalidPyproject {
        /// The pyproject file.
        path: PathBuf,
        /// Which requirement was not met.
        reason: String,
    },

    /// No Cargo manifest could be located for the project.
    #[error("no Cargo.toml found for project {dir}")]
    NoCargoManifest {
        /// The project directory.
        dir: PathBuf,
    },

    /// Neither file names the extension module.
    #[error("could not resolve the module name of project {dir}")]
    UnresolvedModuleName {
        /// The project directory.
        dir: PathBuf,
    },

    /// A TOML file could not be parsed.
    #[error("failed to parse {path}: {reason}")]
    Toml {
        /// The file that failed to parse.
        path: PathBuf,
        /// The parser's message.
        reason: String,
    },

    /// An I/O error occurred while reading project files.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
