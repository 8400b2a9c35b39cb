//! Build settings passed to the external build tool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which build tool subcommand the arguments are rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildCommand {
    /// Produce a distributable artifact (`build`).
    Build,
    /// Build and install into the current environment in editable mode (`develop`).
    Develop,
}

/// Flags common to the build tool's `build` and `develop` subcommands.
///
/// The JSON encoding of this struct is the canonical serialization used when
/// fingerprinting, so changing any field invalidates cached builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    /// Build with optimizations.
    pub release: bool,
    /// Strip the produced library.
    pub strip: bool,
    /// Suppress build tool output.
    pub quiet: bool,
    /// Number of parallel compiler jobs.
    pub jobs: Option<u32>,
    /// Named cargo profile.
    pub profile: Option<String>,
    /// Cargo features to enable.
    pub features: Vec<String>,
    /// Enable every cargo feature.
    pub all_features: bool,
    /// Disable the default cargo feature set.
    pub no_default_features: bool,
    /// Target triple.
    pub target: Option<String>,
    /// Ignore `rust-version` in the manifest.
    pub ignore_rust_version: bool,
    /// Force colored output on (`true`) or off (`false`).
    pub color: Option<bool>,
    /// Require `Cargo.lock` and cache to be up to date.
    pub frozen: bool,
    /// Require `Cargo.lock` to be up to date.
    pub locked: bool,
    /// Run without network access.
    pub offline: bool,
    /// Cargo `--config KEY=VALUE` overrides.
    pub config: BTreeMap<String, String>,
    /// Unstable `-Z` flags.
    pub unstable_flags: Vec<String>,
    /// Verbosity level (`-v`, `-vv`, ...).
    pub verbose: u8,
    /// Extra flags passed to rustc after `--`.
    pub rustc_flags: Vec<String>,

    /// `build` only: auditwheel mode (`repair`, `check`, `skip`).
    pub auditwheel: Option<String>,
    /// `build` only: use zig as the linker.
    pub zig: bool,

    /// `develop` only: optional extras to install.
    pub extras: Vec<String>,
    /// `develop` only: install with uv.
    pub uv: bool,
    /// `develop` only: build without installing.
    pub skip_install: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            release: false,
            strip: false,
            quiet: false,
            jobs: None,
            profile: None,
            features: Vec::new(),
            all_features: false,
            no_default_features: false,
            target: None,
            ignore_rust_version: false,
            color: Some(true),
            frozen: false,
            locked: false,
            offline: false,
            config: BTreeMap::new(),
            unstable_flags: Vec::new(),
            verbose: 0,
            rustc_flags: Vec::new(),
            auditwheel: None,
            zig: false,
            extras: Vec::new(),
            uv: false,
            skip_install: false,
        }
    }
}

impl BuildSettings {
    /// Renders the settings as command-line arguments for `cmd`.
    pub fn to_args(&self, cmd: BuildCommand) -> Vec<String> {
        let mut args = self.shared_args(true);

        match cmd {
            BuildCommand::Build => {
                if let Some(mode) = &self.auditwheel {
                    args.push("--auditwheel".to_string());
                    args.push(mode.clone());
                }
                if self.zig {
                    args.push("--zig".to_string());
                }
            }
            BuildCommand::Develop => {
                if !self.extras.is_empty() {
                    args.push("--extras".to_string());
                    args.push(self.extras.join(","));
                }
                if self.uv {
                    args.push("--uv".to_string());
                }
                if self.skip_install {
                    args.push("--skip-install".to_string());
                }
            }
        }

        if !self.rustc_flags.is_empty() {
            args.push("--".to_string());
            args.extend(self.rustc_flags.iter().cloned());
        }
        args
    }

    /// Renders only the flags that `cargo build` itself understands.
    ///
    /// `--strip` has no cargo equivalent and is dropped; rustc flags are
    /// not included since cargo takes them through `RUSTFLAGS`.
    pub fn cargo_args(&self) -> Vec<String> {
        self.shared_args(false)
    }

    fn shared_args(&self, with_strip: bool) -> Vec<String> {
        let mut args = Vec::new();
        if self.release {
            args.push("--release".to_string());
        }
        if with_strip && self.strip {
            args.push("--strip".to_string());
        }
        if self.quiet {
            args.push("--quiet".to_string());
        }
        if let Some(jobs) = self.jobs {
            args.push("--jobs".to_string());
            args.push(jobs.to_string());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        if !self.features.is_empty() {
            args.push("--features".to_string());
            args.push(self.features.join(","));
        }
        if self.all_features {
            args.push("--all-features".to_string());
        }
        if self.no_default_features {
            args.push("--no-default-features".to_string());
        }
        if let Some(target) = &self.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        if self.ignore_rust_version {
            args.push("--ignore-rust-version".to_string());
        }
        if let Some(color) = self.color {
            args.push("--color".to_string());
            args.push(if color { "always" } else { "never" }.to_string());
        }
        if self.frozen {
            args.push("--frozen".to_string());
        }
        if self.locked {
            args.push("--locked".to_string());
        }
        if self.offline {
            args.push("--offline".to_string());
        }
        for (key, value) in &self.config {
            args.push("--config".to_string());
            args.push(format!("{key}={value}"));
        }
        for flag in &self.unstable_flags {
            args.push("-Z".to_string());
            args.push(flag.clone());
        }
        if self.verbose > 0 {
            args.push(format!("-{}", "v".repeat(self.verbose as usize)));
        }
        args
    }

    /// Returns the canonical serialization of these settings.
    pub fn canonical(&self) -> String {
        // Struct fields serialize in declaration order and maps are BTreeMaps,
        // so the encoding is stable across runs.
        serde_json::to_string(self).unwrap_or_default()
    }
}
