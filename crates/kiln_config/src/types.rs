//! Configuration types deserialized from `kiln.toml`.

use crate::error::ConfigError;
use crate::settings::BuildSettings;
use kiln_common::EnvSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Environment toggle for the process-wide enable switch.
pub const ENABLED_ENV: &str = "KILN_IMPORT_HOOK_ENABLED";

/// The top-level hook configuration.
///
/// Deserialized from `kiln.toml` and then passed through [`HookConfig::resolve`]
/// exactly once; the result is threaded into the driver and never re-read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HookConfig {
    /// Process-wide enable switch. When false the hook is bypassed entirely.
    pub enabled: bool,
    /// Explicit cache root, taking precedence over the environment and every default.
    pub build_dir: Option<PathBuf>,
    /// How long to wait for another process building the same target.
    pub lock_timeout_secs: u64,
    /// Wait for the build lock indefinitely, ignoring `lock_timeout_secs`.
    pub wait_forever: bool,
    /// What the driver does when the lock wait times out.
    pub on_lock_timeout: LockTimeoutPolicy,
    /// Rebuild and rebind modules that are already loaded.
    pub enable_reloading: bool,
    /// Skip the cache and always invoke the builder.
    pub force_rebuild: bool,
    /// Log build warnings at warn level rather than debug.
    pub show_warnings: bool,
    /// Import packages whose install is not editable.
    pub enable_automatic_installation: bool,
    /// Extra directories searched for installed artifacts of pure native projects.
    pub install_dirs: Vec<PathBuf>,
    /// Flags forwarded to the build tool.
    pub settings: BuildSettings,
    /// Rules deciding which files participate in fingerprints.
    pub sources: SourceFilterConfig,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            build_dir: None,
            lock_timeout_secs: 120,
            wait_forever: false,
            on_lock_timeout: LockTimeoutPolicy::Fail,
            enable_reloading: true,
            force_rebuild: false,
            show_warnings: true,
            enable_automatic_installation: false,
            install_dirs: Vec::new(),
            settings: BuildSettings::default(),
            sources: SourceFilterConfig::default(),
        }
    }
}

impl HookConfig {
    /// Overlays the enable switch from the environment onto this configuration.
    ///
    /// `KILN_IMPORT_HOOK_ENABLED` overrides `enabled`. The cache root is not
    /// resolved here; see `kiln_cache::resolve_cache_root`.
    pub fn resolve(mut self, env: &dyn EnvSource) -> Result<Self, ConfigError> {
        if let Some(raw) = env.var(ENABLED_ENV) {
            self.enabled = parse_toggle(&raw)?;
            if !self.enabled {
                tracing::info!("kiln import hook disabled by environment variable");
            }
        }
        Ok(self)
    }

    /// The lock wait limit, or `None` to wait indefinitely.
    pub fn lock_timeout(&self) -> Option<Duration> {
        if self.wait_forever {
            None
        } else {
            Some(Duration::from_secs(self.lock_timeout_secs))
        }
    }
}

/// Parses an enable/disable toggle value.
pub fn parse_toggle(raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Ok(true),
        "0" | "false" | "no" | "off" | "disabled" => Ok(false),
        other => Err(ConfigError::ValidationError(format!(
            "{ENABLED_ENV} must be enabled or disabled, got '{other}'"
        ))),
    }
}

/// Policy applied when waiting for a build lock times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTimeoutPolicy {
    /// Propagate the timeout to the caller.
    #[default]
    Fail,
    /// Re-read the cache once; succeed if another process finished the build.
    Recheck,
}

/// Which files of a target contribute to its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceFilterConfig {
    /// Directory names that are never descended into.
    pub excluded_dir_names: BTreeSet<String>,
    /// File names whose presence excludes the containing directory subtree.
    pub ignore_markers: BTreeSet<String>,
    /// File extensions (with leading `.`, case-insensitive) that are skipped.
    pub excluded_extensions: BTreeSet<String>,
    /// Extensions removed from `excluded_extensions`.
    pub included_extensions: BTreeSet<String>,
}

const DEFAULT_EXCLUDED_DIR_NAMES: &[&str] = &[
    ".cache",
    ".env",
    ".git",
    ".idea",
    ".ipynb_checkpoints",
    ".mypy_cache",
    ".nox",
    ".pyre",
    ".pytest_cache",
    ".ropeproject",
    ".spyderproject",
    ".spyproject",
    ".tox",
    ".venv",
    ".vscode",
    ".yarn",
    "__pycache__",
    "dist",
    "env",
    "node_modules",
    "target",
    "venv",
];

const DEFAULT_IGNORE_MARKERS: &[&str] = &["CACHEDIR.TAG", ".kiln_ignore"];

const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    ".so", ".pyd", ".dll", ".dylib", ".py", ".pyc", ".md", ".txt", ".rst",
];

impl Default for SourceFilterConfig {
    fn default() -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            excluded_dir_names: set(DEFAULT_EXCLUDED_DIR_NAMES),
            ignore_markers: set(DEFAULT_IGNORE_MARKERS),
            excluded_extensions: set(DEFAULT_EXCLUDED_EXTENSIONS),
            included_extensions: BTreeSet::new(),
        }
    }
}

impl SourceFilterConfig {
    /// Returns true if a file with this extension is skipped when fingerprinting.
    ///
    /// `extension` is given without the leading dot, as returned by
    /// [`std::path::Path::extension`].
    pub fn is_excluded_extension(&self, extension: &str) -> bool {
        let dotted = format!(".{}", extension.to_ascii_lowercase());
        let listed = |set: &BTreeSet<String>| set.iter().any(|e| e.eq_ignore_ascii_case(&dotted));
        listed(&self.excluded_extensions) && !listed(&self.included_extensions)
    }
}
