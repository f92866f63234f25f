//! Configuration management for windowgate.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WindowGateError};

/// Prefix for environment overrides, e.g. `WINDOWGATE__STORE__URL`.
pub const ENV_PREFIX: &str = "WINDOWGATE";

/// Main configuration for the windowgate binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowGateConfig {
    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path to a rate limit rules file
    #[serde(default)]
    pub rules_path: Option<String>,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_store_url")]
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WindowGateConfig {
    /// Load configuration from an optional YAML file, then apply environment
    /// overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::new(path, ::config::FileFormat::Yaml).required(true),
            );
        }
        builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| WindowGateError::Config(e.to_string()))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| WindowGateError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WindowGateConfig::default();
        assert_eq!(config.store.url, "redis://127.0.0.1:6379");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.rules_path.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = WindowGateConfig::from_yaml(
            r#"
store:
  url: redis://cache:6380/2
logging:
  json: true
"#,
        )
        .unwrap();

        assert_eq!(config.store.url, "redis://cache:6380/2");
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = WindowGateConfig::load(Some("/nonexistent/windowgate.yaml"));
        assert!(matches!(result, Err(WindowGateError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "windowgate-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "rules_path: /etc/windowgate/rules.yaml\n").unwrap();

        let config = WindowGateConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            config.rules_path.as_deref(),
            Some("/etc/windowgate/rules.yaml")
        );
        assert_eq!(config.store.url, "redis://127.0.0.1:6379");
    }
}
