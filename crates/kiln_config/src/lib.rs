//! Configuration for the kiln import hook.
//!
//! Reads an optional `kiln.toml`, overlays the process environment exactly
//! once, and produces a strongly-typed [`HookConfig`] that is threaded through
//! the driver. [`BuildSettings`] mirrors the flags understood by the external
//! build tool and is part of every fingerprint.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod settings;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use settings::{BuildCommand, BuildSettings};
pub use types::*;
