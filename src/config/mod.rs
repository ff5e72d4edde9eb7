//! Configuration loading for Canopy
//!
//! The file is optional: a missing file means defaults. A file that exists
//! must parse and describe a usable cache root, otherwise loading fails with
//! `ConfigInvalid` naming the file.

pub mod schema;

pub use schema::{CacheConfig, Config, GeneralConfig, LogFormat, ModelConfig};

use crate::error::{CanopyError, CanopyResult};
use crate::model::ZPath;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Locates, reads and writes the Canopy config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for `~/.config/canopy/config.toml`
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Manager for an explicit file, e.g. from `--config` or `CANOPY_CONFIG`
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Manager for `path` if given, the default location otherwise
    pub fn from_override(path: Option<PathBuf>) -> Self {
        path.map_or_else(Self::new, Self::with_path)
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("canopy")
            .join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load the managed file, or defaults when it does not exist
    pub async fn load(&self) -> CanopyResult<Config> {
        if !self.config_path.exists() {
            debug!(
                "No config at {}, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }
        self.load_from_file(&self.config_path).await
    }

    /// Parse and validate `path`
    pub async fn load_from_file(&self, path: &Path) -> CanopyResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CanopyError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| invalid(path, e))?;
        validate(&config).map_err(|reason| invalid(path, reason))?;
        debug!("Loaded config from {} (root {})", path.display(), config.cache.root);
        Ok(config)
    }

    /// Validate and write `config`, creating the parent directory
    pub async fn save(&self, config: &Config) -> CanopyResult<()> {
        validate(config).map_err(|reason| invalid(&self.config_path, reason))?;

        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| CanopyError::ConfigDirCreate {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            CanopyError::io(format!("writing config to {}", self.config_path.display()), e)
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(path: &Path, reason: impl ToString) -> CanopyError {
    CanopyError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Checks serde cannot express
fn validate(config: &Config) -> Result<(), String> {
    let root = ZPath::parse(&config.cache.root)
        .map_err(|e| format!("cache.root: {}", e))?;
    if !root.is_resolved() {
        return Err(format!(
            "cache.root: {} contains a {{parameter}} placeholder",
            root
        ));
    }
    Ok(())
}
