//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::HookConfig;
use std::path::Path;

/// Name of the optional configuration file.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads the hook configuration from `<dir>/kiln.toml`.
///
/// A missing file is not an error: the defaults are returned.
pub fn load_config(dir: &Path) -> Result<HookConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    let content = match std::fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no {CONFIG_FILE} in {}, using defaults", dir.display());
            return Ok(HookConfig::default());
        }
        Err(e) => return Err(e.into()),
    };
    load_config_from_str(&content)
}

/// Parses and validates a hook configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<HookConfig, ConfigError> {
    let config: HookConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &HookConfig) -> Result<(), ConfigError> {
    if !config.wait_forever && config.lock_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "lock_timeout_secs must be positive (use wait_forever to wait indefinitely)"
                .to_string(),
        ));
    }
    for ext in config
        .sources
        .excluded_extensions
        .iter()
        .chain(&config.sources.included_extensions)
    {
        if !ext.starts_with('.') {
            return Err(ConfigError::ValidationError(format!(
                "extension '{ext}' must include the leading '.'"
            )));
        }
    }
    if let Some(mode) = &config.settings.auditwheel {
        if !matches!(mode.as_str(), "repair" | "check" | "skip") {
            return Err(ConfigError::ValidationError(format!(
                "settings.auditwheel must be repair, check or skip, got '{mode}'"
            )));
        }
    }
    Ok(())
}
