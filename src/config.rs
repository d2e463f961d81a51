//! Runtime configuration
//!
//! Loaded from an optional TOML file with `KEYPAD_*` environment overrides.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KeypadError, Result};

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;
pub const DEFAULT_MAX_TICKS_PER_RUN: u64 = 200_000;

/// Settings for the tick driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypadConfig {
    /// Wall-clock length of one tick in realtime mode.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Guard against runaway chains when draining the queue offline.
    #[serde(default = "default_max_ticks_per_run")]
    pub max_ticks_per_run: u64,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_max_ticks_per_run() -> u64 {
    DEFAULT_MAX_TICKS_PER_RUN
}

impl Default for KeypadConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            max_ticks_per_run: DEFAULT_MAX_TICKS_PER_RUN,
        }
    }
}

impl KeypadConfig {
    /// Load defaults, then `path` (if given), then `KEYPAD_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(KeypadConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: KeypadConfig = figment
            .merge(Env::prefixed("KEYPAD_"))
            .extract()
            .map_err(|e| KeypadError::Config(e.to_string()))?;

        if config.tick_interval_ms == 0 {
            return Err(KeypadError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = KeypadConfig::default();
        assert_eq!(config.tick_interval_ms, 10);
        assert_eq!(config.max_ticks_per_run, 200_000);
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_interval_ms = 4").unwrap();

        let config = KeypadConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.tick_interval_ms, 4);
        assert_eq!(config.max_ticks_per_run, DEFAULT_MAX_TICKS_PER_RUN);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_interval_ms = 0").unwrap();

        let err = KeypadConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, KeypadError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_interval_ms = \"fast\"").unwrap();

        assert!(KeypadConfig::load(Some(file.path())).is_err());
    }
}
