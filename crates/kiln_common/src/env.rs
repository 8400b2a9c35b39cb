//! Injectable environment lookup.

use std::collections::BTreeMap;

/// A source of environment variables.
///
/// Configuration is resolved once from an `EnvSource`; tests pass a
/// [`MapEnv`] instead of touching the real process environment.
pub trait EnvSource {
    /// Returns the value of `key`, or `None` if unset or empty.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// A fixed in-memory environment.
#[derive(Debug, Default, Clone)]
pub struct MapEnv(BTreeMap<String, String>);

impl MapEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this environment with `key` set to `value`.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).filter(|v| !v.is_empty()).cloned()
    }
}
