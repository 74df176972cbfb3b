//! Startup configuration.
//!
//! The simulator and the real device use different classifier names and
//! report class tags differently. The environment is chosen once at startup
//! and resolved into a [`ClassifierTable`] that the state manager hands to
//! area groups and callbacks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable consulted by [`PlatformConfig::from_env`].
pub const ENVIRONMENT_VAR: &str = "TABLESTATE_ENV";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where the application runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Running against the simulator.
    #[default]
    Development,
    /// Running on the device.
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Classifier names and class tags for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierTable {
    /// Classifier that recognizes fingers.
    pub finger: String,
    /// Class tag reported for a finger.
    pub finger_tag: serde_json::Value,
    /// Class tag reported when no finger is present.
    pub no_finger_tag: serde_json::Value,
}

impl ClassifierTable {
    /// The built-in table for an environment.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self {
                finger: "finger".to_string(),
                finger_tag: serde_json::Value::from("finger"),
                no_finger_tag: serde_json::Value::from("no_finger"),
            },
            Environment::Production => Self {
                finger: "cls_loc_fin_all_small".to_string(),
                finger_tag: serde_json::Value::from(1),
                no_finger_tag: serde_json::Value::from(0),
            },
        }
    }

    /// Check whether a class tag means "finger".
    pub fn is_finger(&self, class_tag: &serde_json::Value) -> bool {
        *class_tag == self.finger_tag
    }
}

/// Platform configuration supplied at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Replaces the built-in table for `environment` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<ClassifierTable>,
}

impl PlatformConfig {
    /// Create a config for an environment with the built-in classifier table.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            classifiers: None,
        }
    }

    /// Parse from JSON.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Build from the `TABLESTATE_ENV` environment variable.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_env_value(std::env::var(ENVIRONMENT_VAR).ok().as_deref())
    }

    /// Build from an optional environment value. Unset means development.
    pub fn from_env_value(value: Option<&str>) -> ConfigResult<Self> {
        let environment = match value {
            Some(v) if !v.trim().is_empty() => v.parse()?,
            _ => Environment::default(),
        };
        Ok(Self::new(environment))
    }

    /// Resolve the classifier table.
    pub fn classifiers(&self) -> ClassifierTable {
        self.classifiers
            .clone()
            .unwrap_or_else(|| ClassifierTable::for_environment(self.environment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_environment_tables_differ() {
        let dev = PlatformConfig::new(Environment::Development).classifiers();
        let prod = PlatformConfig::new(Environment::Production).classifiers();
        assert_eq!(dev.finger, "finger");
        assert_eq!(prod.finger, "cls_loc_fin_all_small");
        assert!(dev.is_finger(&serde_json::json!("finger")));
        assert!(prod.is_finger(&serde_json::json!(1)));
        assert!(!prod.is_finger(&serde_json::json!(0)));
    }

    #[test]
    fn test_from_env_value() {
        assert_eq!(
            PlatformConfig::from_env_value(None).unwrap().environment,
            Environment::Development
        );
        assert_eq!(
            PlatformConfig::from_env_value(Some("production")).unwrap().environment,
            Environment::Production
        );
        assert!(matches!(
            PlatformConfig::from_env_value(Some("staging")),
            Err(ConfigError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn test_from_json_with_override() {
        let json = r#"{
            "environment": "production",
            "classifiers": { "finger": "custom", "finger_tag": true, "no_finger_tag": false }
        }"#;
        let config = PlatformConfig::from_json_str(json).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.classifiers().finger, "custom");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("platform.json");
        fs::write(&path, r#"{"environment":"development"}"#).unwrap();

        let config = PlatformConfig::load(&path).unwrap();
        assert_eq!(config, PlatformConfig::new(Environment::Development));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = PlatformConfig::load(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
