//! Configuration module
//!
//! Loaded from a TOML file (`~/.config/neurofleet/ride-tracker.toml` by
//! default). Every section and key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::RetryConfig;

/// Env var overriding the config path
pub const CONFIG_ENV: &str = "RIDE_TRACKER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fleet REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 15,
        }
    }
}

/// Live channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Raw WebSocket endpoint of the STOMP broker
    pub ws_url: String,
    /// Topic prefix; the booking id is appended
    pub topic_prefix: String,
    pub connect_timeout_secs: u64,
    /// Bounded push queue between the channel and the core
    pub inbox_capacity: usize,
    /// REST resync period while a ride is active; 0 turns polling off
    pub poll_interval_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws/websocket".to_string(),
            topic_prefix: "/topic/bookings/".to_string(),
            connect_timeout_secs: 10,
            inbox_capacity: 64,
            poll_interval_secs: 30,
        }
    }
}

/// Durable storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding session and restart state
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("neurofleet").join("ride-tracker.json"),
        }
    }
}

/// Snapshot fetch retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, `error` or a full filter directive
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub channel: ChannelConfig,
    pub storage: StorageConfig,
    pub retry: RetrySettings,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.channel.connect_timeout_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.channel.poll_interval_secs > 0)
            .then(|| Duration::from_secs(self.channel.poll_interval_secs))
    }
}

/// Default config path: `RIDE_TRACKER_CONFIG`, else
/// `<config_dir>/neurofleet/ride-tracker.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("neurofleet")
        .join("ride-tracker.toml")
}
