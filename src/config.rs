use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MoverError, Result};
use crate::transfer::TransferSettings;

/// Directory name used under the platform config directory
pub const APP_DIR_NAME: &str = "gmail-mover";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    /// OAuth2 client secret downloaded from the Google Cloud console
    #[serde(default = "default_credentials")]
    pub credentials: PathBuf,
    /// Holds `tokens/` and `moves.jsonl`; defaults to `~/.config/gmail-mover`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            credentials: default_credentials(),
            config_dir: None,
        }
    }
}

impl PathsConfig {
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(default_config_dir)
    }

    /// Token cache for one account
    pub fn token_path(&self, email: &str) -> PathBuf {
        self.config_dir().join("tokens").join(format!("{}.json", email))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_move_delay_ms")]
    pub move_delay_ms: u64,
    #[serde(default = "default_approval_delay_secs")]
    pub approval_delay_secs: u64,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_add_tracking_labels")]
    pub add_tracking_labels: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            page_size: default_page_size(),
            move_delay_ms: default_move_delay_ms(),
            approval_delay_secs: default_approval_delay_secs(),
            fail_fast: false,
            add_tracking_labels: default_add_tracking_labels(),
        }
    }
}

impl TransferConfig {
    pub fn settings(&self) -> TransferSettings {
        TransferSettings {
            page_size: self.page_size,
            move_delay: Duration::from_millis(self.move_delay_ms),
            approval_delay: Duration::from_secs(self.approval_delay_secs),
        }
    }
}

fn default_credentials() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR_NAME)))
}

/// Default location of the config file itself
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

fn default_max_messages() -> usize {
    10_000
}

fn default_page_size() -> u32 {
    500
}

fn default_move_delay_ms() -> u64 {
    100
}

fn default_approval_delay_secs() -> u64 {
    3
}

fn default_add_tracking_labels() -> bool {
    true
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MoverError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| MoverError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MoverError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MoverError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| MoverError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.paths.credentials.as_os_str().is_empty() {
            return Err(MoverError::ConfigError(
                "paths.credentials cannot be empty".to_string(),
            ));
        }

        if self.transfer.max_messages == 0 {
            return Err(MoverError::ConfigError(
                "transfer.max_messages must be at least 1".to_string(),
            ));
        }

        // Gmail caps messages.list at 500 results per page
        if self.transfer.page_size == 0 || self.transfer.page_size > 500 {
            return Err(MoverError::ConfigError(
                "transfer.page_size must be between 1 and 500".to_string(),
            ));
        }

        if self.transfer.approval_delay_secs > 3600 {
            return Err(MoverError::ConfigError(
                "transfer.approval_delay_secs cannot exceed 3600".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
