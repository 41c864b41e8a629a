//! Store configuration.
//!
//! Loaded from TOML (for instance a `[store]` table extracted by the host
//! application) and optionally overridden from the environment:
//!
//! - `ARBOR_STRICT` - enable strict-mode write checking
//! - `ARBOR_DEVTOOLS` - attach the devtools bridge when one is supplied

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub const ENV_STRICT: &str = "ARBOR_STRICT";
pub const ENV_DEVTOOLS: &str = "ARBOR_DEVTOOLS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Report every state write made outside a commit.
    pub strict: bool,
    /// Install the devtools plugin when a bridge is configured.
    pub devtools: bool,
    /// Number of diagnostics retained by the store. `0` keeps logging only.
    pub diagnostics_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strict: false,
            devtools: true,
            diagnostics_capacity: 256,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Defaults, then environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_STRICT) {
            self.strict = parse_flag(ENV_STRICT, value)?;
        }
        if let Some(value) = lookup(ENV_DEVTOOLS) {
            self.devtools = parse_flag(ENV_DEVTOOLS, value)?;
        }
        Ok(self)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn devtools(mut self, devtools: bool) -> Self {
        self.devtools = devtools;
        self
    }
}

fn parse_flag(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_fills_missing_fields_with_defaults() {
        let config = StoreConfig::from_toml_str("strict = true").unwrap();
        assert!(config.strict);
        assert!(config.devtools);
        assert_eq!(config.diagnostics_capacity, 256);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = StoreConfig::from_toml_str("strict = \"maybe\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::default()
            .with_overrides(|var| match var {
                ENV_STRICT => Some("yes".to_string()),
                ENV_DEVTOOLS => Some("0".to_string()),
                _ => None,
            })
            .unwrap();
        assert!(config.strict);
        assert!(!config.devtools);
    }

    #[test]
    fn test_bad_override_value() {
        let err = StoreConfig::default()
            .with_overrides(|var| (var == ENV_STRICT).then(|| "sometimes".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_STRICT, .. }));
    }
}
