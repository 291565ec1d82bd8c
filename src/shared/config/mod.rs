//! Engine configuration module
//!
//! Provides the configuration consumed by the synchronization engine. It is
//! built once by the application controller and passed down by reference.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default snapshot endpoint, relative to the server URL
const DEFAULT_SNAPSHOT_PATH: &str = "/sync/snapshot";
/// Default network timeout for a snapshot fetch
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Consecutive failing passes or events before sync is reported degraded
const DEFAULT_DEGRADED_THRESHOLD: u32 = 3;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Server base URL, without trailing slash
    pub server_url: String,
    /// Path of the snapshot endpoint
    pub snapshot_path: String,
    /// Local SQLite database file
    pub database_path: PathBuf,
    pub request_timeout: Duration,
    pub degraded_threshold: u32,
    /// `tracing` env-filter directive
    pub log_filter: String,
}

impl EngineConfig {
    /// Create a new EngineConfigBuilder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Parse a TOML document into a validated configuration
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut builder = Self::builder();
        if let Some(url) = file.server_url {
            builder = builder.server_url(url);
        }
        if let Some(path) = file.snapshot_path {
            builder = builder.snapshot_path(path);
        }
        if let Some(path) = file.database_path {
            builder = builder.database_path(path);
        }
        if let Some(secs) = file.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(threshold) = file.degraded_threshold {
            builder = builder.degraded_threshold(threshold);
        }
        if let Some(filter) = file.log_filter {
            builder = builder.log_filter(filter);
        }
        builder.build()
    }

    /// Full URL of the snapshot endpoint
    pub fn snapshot_url(&self) -> String {
        format!("{}{}", self.server_url, self.snapshot_path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if !self.snapshot_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "snapshot_path",
                message: "must start with '/'".to_string(),
            });
        }
        if self.degraded_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "degraded_threshold",
                message: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                message: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Platform data directory location of the local database
    pub fn default_database_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("chatmirror");
        path.push("local.db");
        path
    }
}

/// On-disk form of the configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    server_url: Option<String>,
    snapshot_path: Option<String>,
    database_path: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    degraded_threshold: Option<u32>,
    log_filter: Option<String>,
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    server_url: Option<String>,
    snapshot_path: Option<String>,
    database_path: Option<PathBuf>,
    request_timeout: Option<Duration>,
    degraded_threshold: Option<u32>,
    log_filter: Option<String>,
}

impl EngineConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: String) -> Self {
        self.server_url = Some(url);
        self
    }

    pub fn snapshot_path(mut self, path: String) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn degraded_threshold(mut self, threshold: u32) -> Self {
        self.degraded_threshold = Some(threshold);
        self
    }

    pub fn log_filter(mut self, filter: String) -> Self {
        self.log_filter = Some(filter);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let server_url = self
            .server_url
            .ok_or(ConfigError::MissingValue("server_url"))?
            .trim_end_matches('/')
            .to_string();

        let config = EngineConfig {
            server_url,
            snapshot_path: self
                .snapshot_path
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string()),
            database_path: self
                .database_path
                .unwrap_or_else(EngineConfig::default_database_path),
            request_timeout: self
                .request_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            degraded_threshold: self.degraded_threshold.unwrap_or(DEFAULT_DEGRADED_THRESHOLD),
            log_filter: self.log_filter.unwrap_or_else(|| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("could not parse configuration: {0}")]
    Parse(String),
}
