//! botpush Configuration Module
//! Handles loading and validating botpush.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "botpush.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Runtime settings for a push attempt. Never holds credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    /// Restore the captured script when the write fails
    #[serde(default = "default_true")]
    pub auto_rollback: bool,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_token_url() -> String {
    "https://www.zohoapis.com/oauth/v2/token".to_string()
}

fn default_api_base() -> String {
    "https://salesiq.zoho.com/api/v2".to_string()
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("botpush/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            api_base: default_api_base(),
            backup_dir: default_backup_dir(),
            auto_rollback: true,
            request_timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl PushConfig {
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        }
        let content = std::fs::read_to_string(config_path)?;
        let config: PushConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Look for `botpush.config.json` in `dir`, then in the user config
    /// directory. Falls back to defaults when neither exists.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let local = dir.join(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::load(&local);
        }

        if let Some(user_dir) = dirs::config_dir() {
            let global = user_dir.join("botpush").join(CONFIG_FILE_NAME);
            if global.exists() {
                return Self::load(&global);
            }
        }

        Ok(Self::default())
    }

    pub fn save(&self, config_path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [("token_url", &self.token_url), ("api_base", &self.api_base)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!("{} must be an http(s) URL: {}", name, url)));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".to_string()));
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("backup_dir must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Artifact endpoint for a bot
    pub fn script_url(&self, bot_id: &str) -> String {
        format!("{}/bots/{}/script", self.api_base.trim_end_matches('/'), bot_id)
    }
}
