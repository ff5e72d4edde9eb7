//! Configuration schema for Canopy
//!
//! Configuration is stored at `~/.config/canopy/config.toml`

use crate::store::{CreateMode, CreateOptions, DeleteOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache behavior
    pub cache: CacheConfig,

    /// Defaults for model specs
    pub model: ModelConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log line format
    pub log_format: LogFormat,
}

/// Format of the binary's log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: LogFormat::Text,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root path the cache mirrors
    pub root: String,

    /// Hide events produced by the initial snapshot from event printers
    pub post_initialized_only: bool,

    /// How long to wait for the initial snapshot (0 = forever)
    pub initialize_timeout_ms: u64,
}

impl CacheConfig {
    /// Initial snapshot deadline, if any
    pub fn initialize_timeout(&self) -> Option<Duration> {
        (self.initialize_timeout_ms > 0).then(|| Duration::from_millis(self.initialize_timeout_ms))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: "/canopy".to_string(),
            post_initialized_only: true,
            initialize_timeout_ms: 5000,
        }
    }
}

/// Model write/delete defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Create missing parents when writing
    pub create_parents: bool,

    /// Delete descendants along with a node
    pub delete_children: bool,

    /// Node lifetime: persistent, ephemeral or container
    pub create_mode: CreateMode,
}

impl ModelConfig {
    pub fn create_options(&self) -> CreateOptions {
        CreateOptions {
            mode: self.create_mode,
            create_parents: self.create_parents,
            set_data_if_exists: true,
        }
    }

    pub fn delete_options(&self) -> DeleteOptions {
        DeleteOptions {
            delete_children: self.delete_children,
            quietly: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            create_parents: true,
            delete_children: false,
            create_mode: CreateMode::Persistent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("create_mode = \"persistent\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.root, "/canopy");
        assert!(config.model.create_parents);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [model]
            create_mode = "container"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.model.create_mode, CreateMode::Container);
        assert_eq!(config.general.log_format, LogFormat::Text); // default preserved
    }

    #[test]
    fn log_format_rejects_unknown_values() {
        let config: Config = toml::from_str("[general]\nlog_format = \"json\"").unwrap();
        assert_eq!(config.general.log_format, LogFormat::Json);
        assert!(toml::from_str::<Config>("[general]\nlog_format = \"yaml\"").is_err());
    }

    #[test]
    fn zero_timeout_means_wait_forever() {
        let mut cache = CacheConfig::default();
        assert_eq!(cache.initialize_timeout(), Some(Duration::from_secs(5)));
        cache.initialize_timeout_ms = 0;
        assert_eq!(cache.initialize_timeout(), None);
    }
}
