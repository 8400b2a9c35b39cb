//! The persisted outcome of a successful build.

use crate::fingerprint::Fingerprint;
use crate::target::{Target, TargetIdentity, TargetKind};
use kiln_config::BuildSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current record format version.
///
/// Increment this when the record layout changes. Records carrying any other
/// version are read as cache misses.
pub const FORMAT_VERSION: u32 = 1;

/// The last successful build of one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Layout version of this record.
    pub format_version: u32,
    /// The target this record belongs to.
    pub identity: TargetIdentity,
    /// Project or standalone file.
    pub kind: TargetKind,
    /// Fingerprint of the inputs the artifact was built from.
    pub fingerprint: Fingerprint,
    /// Location of the produced library.
    pub artifact: PathBuf,
    /// Build completion time in milliseconds since the Unix epoch.
    pub built_at_ms: u64,
    /// Settings the artifact was built with.
    pub settings: BuildSettings,
    /// Arguments passed to the build tool.
    pub build_args: Vec<String>,
    /// Combined build tool output, kept for warning reports.
    pub build_output: String,
}

impl CacheRecord {
    /// Creates a record for a build of `target` that finished just now.
    pub fn new(
        target: &Target,
        fingerprint: Fingerprint,
        artifact: PathBuf,
        settings: BuildSettings,
        build_args: Vec<String>,
        build_output: String,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            identity: target.identity.clone(),
            kind: target.kind,
            fingerprint,
            artifact,
            built_at_ms: now_ms(),
            settings,
            build_args,
            build_output,
        }
    }

    /// Returns true if this record was built from inputs matching `fingerprint`
    /// and its artifact is still on disk.
    pub fn is_fresh(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprint == *fingerprint && self.artifact.is_file()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
