use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment overrides recognized by [`EngineConfig::load`], in field
/// order. Precedence is env > file > default.
pub const ENV_KEYS: [&str; 4] = [
    "SIGNOFF_STEP_DEADLINE_SECS",
    "SIGNOFF_ESCALATION_WINDOW_SECS",
    "SIGNOFF_SWEEP_INTERVAL_SECS",
    "SIGNOFF_DELEGATION_HOP_LIMIT",
];

/// Tunables for deadlines, escalation, and delegation resolution.
///
/// All durations are plain seconds so the struct round-trips through TOML
/// without custom parsing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline given to a newly activated step when neither the request
    /// nor the caller supplies one.
    pub default_step_deadline_secs: i64,
    /// Fresh deadline granted to a step when escalation reassigns it.
    pub escalation_window_secs: i64,
    /// Interval between escalation sweeps.
    pub sweep_interval_secs: u64,
    /// Upper bound on standing-delegation hops during resolution.
    pub delegation_hop_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_deadline_secs: 72 * 3600,
            escalation_window_secs: 24 * 3600,
            sweep_interval_secs: 60,
            delegation_hop_limit: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read engine config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse engine config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration with env > file > default precedence. A `None`
    /// path starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config: Self = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env(ENV_KEYS[0])? {
            self.default_step_deadline_secs = value;
        }
        if let Some(value) = read_env(ENV_KEYS[1])? {
            self.escalation_window_secs = value;
        }
        if let Some(value) = read_env(ENV_KEYS[2])? {
            self.sweep_interval_secs = value;
        }
        if let Some(value) = read_env(ENV_KEYS[3])? {
            self.delegation_hop_limit = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_step_deadline_secs <= 0 {
            return Err(ConfigError::Validation(
                "default_step_deadline_secs must be positive".to_string(),
            ));
        }
        if self.escalation_window_secs <= 0 {
            return Err(ConfigError::Validation(
                "escalation_window_secs must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.delegation_hop_limit == 0 {
            return Err(ConfigError::Validation(
                "delegation_hop_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| {
            ConfigError::Validation(format!("{key} holds an unparsable value `{raw}`"))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig};

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delegation_hop_limit, 5);
        assert_eq!(config.sweep_interval_secs, 60);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = EngineConfig::from_toml_str("sweep_interval_secs = 15\n")
            .expect("partial config should parse");
        assert_eq!(config.sweep_interval_secs, 15);
        assert_eq!(config.delegation_hop_limit, EngineConfig::default().delegation_hop_limit);
    }

    #[test]
    fn zero_hop_limit_is_rejected() {
        let error = EngineConfig::from_toml_str("delegation_hop_limit = 0\n")
            .expect_err("zero hop limit must fail");
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn env_override_beats_defaults() {
        std::env::set_var("SIGNOFF_DELEGATION_HOP_LIMIT", "7");
        let config = EngineConfig::load(None).expect("env override parses");
        std::env::remove_var("SIGNOFF_DELEGATION_HOP_LIMIT");

        assert_eq!(config.delegation_hop_limit, 7);
        assert_eq!(config.sweep_interval_secs, EngineConfig::default().sweep_interval_secs);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let error = EngineConfig::from_toml_str("sweep_interval_secs = \"soon\"\n")
            .expect_err("type mismatch must fail");
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
