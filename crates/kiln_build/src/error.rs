//! Error types for the build step.

use std::path::PathBuf;

/// Errors raised while running the external build tool.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The build tool is not on `PATH`.
    #[error("{program} not found: {reason}")]
    ToolNotFound {
        /// The program that was searched for.
        program: String,
        /// Why the search failed.
        reason: String,
    },

    /// The build tool's version is outside the supported range.
    #[error("unsupported {program} version {found}, requires {required}")]
    UnsupportedVersion {
        /// The program that was checked.
        program: String,
        /// The version it reported.
        found: String,
        /// The supported range.
        required: String,
    },

    /// The build tool could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// The program that was started.
        program: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The build tool exited unsuccessfully. `output` is its diagnostics, unmodified.
    #[error("command `{command}` failed ({})\n{output}", describe_status(.status))]
    Failed {
        /// The command line that was run.
        command: String,
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Combined stdout and stderr.
        output: String,
    },

    /// The build succeeded but its library could not be found.
    #[error("build of {module} succeeded but no library was found in {searched}")]
    ArtifactMissing {
        /// The module that was built.
        module: String,
        /// The places that were searched.
        searched: String,
    },

    /// An I/O error occurred while preparing or collecting build output.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}
