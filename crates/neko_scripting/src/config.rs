//! # Scripting Configuration
//!
//! Loaded once at startup, usually from the engine's TOML config.
//!
//! ```toml
//! gc_interval_ticks = 60
//! reclaim_policy = "collector"
//! event_capacity = 256
//! max_consecutive_failures = 0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ScriptingError, ScriptingResult};

/// When a weak proxy gets reclaimed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReclaimPolicy {
    /// Weak proxies survive until the next collection pass.
    #[default]
    Collector,
    /// A proxy whose count drops from one to zero is reclaimed on the spot.
    Immediate,
}

/// Configuration for a scripting context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Run a collection pass every N ticks. 0 leaves collection to the caller.
    pub gc_interval_ticks: u32,
    /// Reclaim policy for weak proxies.
    pub reclaim_policy: ReclaimPolicy,
    /// Events reserved per render sync list.
    pub event_capacity: usize,
    /// Suspend a script after this many failing updates in a row. 0 never suspends.
    pub max_consecutive_failures: u32,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            gc_interval_ticks: 60, // once per second at the default tick rate
            reclaim_policy: ReclaimPolicy::Collector,
            event_capacity: 256,
            max_consecutive_failures: 0,
        }
    }
}

impl ScriptingConfig {
    /// Deterministic config: no collector, objects die when script lets go.
    #[must_use]
    pub const fn deterministic() -> Self {
        Self {
            gc_interval_ticks: 0,
            reclaim_policy: ReclaimPolicy::Immediate,
            event_capacity: 256,
            max_consecutive_failures: 0,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptingError::InvalidConfig`] on syntax errors, unknown
    /// values or failed validation.
    pub fn from_toml_str(source: &str) -> ScriptingResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ScriptingError::InvalidConfig(e.to_string()))?;
        config.validate()
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptingError::InvalidConfig`] if the file cannot be read or
    /// does not parse.
    pub fn load(path: impl AsRef<Path>) -> ScriptingResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ScriptingError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptingError::InvalidConfig`] if `event_capacity` is zero.
    pub fn validate(self) -> ScriptingResult<Self> {
        if self.event_capacity == 0 {
            return Err(ScriptingError::InvalidConfig(
                "event_capacity must be greater than zero".into(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ScriptingConfig::from_toml_str("reclaim_policy = \"immediate\"\n").unwrap();
        assert_eq!(config.reclaim_policy, ReclaimPolicy::Immediate);
        assert_eq!(config.gc_interval_ticks, 60);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = ScriptingConfig::from_toml_str("event_capacity = 0\n").unwrap_err();
        assert!(matches!(err, ScriptingError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let err = ScriptingConfig::from_toml_str("reclaim_policy = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, ScriptingError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ScriptingConfig::load("/nonexistent/neko/scripting.toml").unwrap_err();
        assert!(matches!(err, ScriptingError::InvalidConfig(msg) if msg.contains("scripting.toml")));
    }
}
