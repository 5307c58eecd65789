//! Configuration module for fileshare.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{FileShareError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

/// How the total capacity of the share is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Fixed ceiling (`capacity_bytes`) minus the bytes stored under the root.
    Fixed,
    /// Free space reported by the device holding the root.
    Device,
}

/// What the delete operation is allowed to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Regular files only; directories are rejected.
    FilesOnly,
    /// Files and whole directory trees.
    Recursive,
}

/// Shared directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory exposed by the server.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Capacity policy.
    #[serde(default = "default_capacity")]
    pub capacity: CapacityPolicy,
    /// Ceiling in bytes for the `fixed` policy.
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
    /// Maximum request body size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Delete policy.
    #[serde(default = "default_delete_policy")]
    pub delete_policy: DeletePolicy,
    /// Keep an in-memory used-byte counter instead of walking the tree per request.
    #[serde(default)]
    pub track_usage: bool,
    /// Full-scan reconciliation interval for the usage counter.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

fn default_root() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("FileShare"),
        None => PathBuf::from("FileShare"),
    }
}

fn default_capacity() -> CapacityPolicy {
    CapacityPolicy::Fixed
}

fn default_capacity_bytes() -> u64 {
    100 * 1024 * 1024 * 1024 // 100 GiB
}

fn default_max_upload_size() -> u64 {
    100 * 1024 // 100 GiB
}

fn default_delete_policy() -> DeletePolicy {
    DeletePolicy::FilesOnly
}

fn default_reconcile_interval() -> u64 {
    300 // 5 minutes
}

impl StorageConfig {
    /// Maximum request body size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            capacity: default_capacity(),
            capacity_bytes: default_capacity_bytes(),
            max_upload_size_mb: default_max_upload_size(),
            delete_policy: default_delete_policy(),
            track_usage: false,
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/fileshare.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared directory configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FileShareError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FileShareError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILESHARE_ROOT`: Override the shared directory
    /// - `FILESHARE_PORT`: Override the listen port
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("FILESHARE_ROOT") {
            if !root.is_empty() {
                self.storage.root = PathBuf::from(root);
            }
        }

        if let Ok(port) = std::env::var("FILESHARE_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid FILESHARE_PORT"),
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.capacity == CapacityPolicy::Fixed && self.storage.capacity_bytes == 0 {
            return Err(FileShareError::Config(
                "capacity is 'fixed' but capacity_bytes is 0".to_string(),
            ));
        }
        if self.storage.track_usage && self.storage.reconcile_interval_secs == 0 {
            return Err(FileShareError::Config(
                "track_usage requires reconcile_interval_secs > 0".to_string(),
            ));
        }
        if self.storage.max_upload_size_mb == 0 {
            return Err(FileShareError::Config(
                "max_upload_size_mb must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
