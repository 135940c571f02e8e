//! Configuration management for the filebay daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filebay/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use protocol::messages::MAX_CHUNK_SIZE;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("files.root is not set; the daemon needs a directory to serve")]
    MissingRoot,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("listen_addr must be a host:port address, got {0}")]
    InvalidListenAddr(String),

    #[error("max_chunk_size must be between 1 and {MAX_CHUNK_SIZE}, got {0}")]
    InvalidMaxChunkSize(u32),

    #[error("max_upload_size must be greater than 0, got {0}")]
    InvalidMaxUploadSize(u64),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the filebay daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Network listener configuration.
    pub server: ServerConfig,

    /// Managed directory configuration.
    pub files: FilesConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily log files. Empty means log to stderr only.
    pub log_dir: PathBuf,
}

/// Network listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the daemon listens on.
    pub listen_addr: String,

    /// Largest chunk the daemon will serve in one download response, in bytes.
    pub max_chunk_size: u32,
}

/// Managed directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Root directory every operation is confined to. Must be set.
    pub root: PathBuf,

    /// Compare paths case-insensitively, for roots on filesystems that do.
    pub case_insensitive: bool,

    /// Largest accepted upload in bytes (default: 1GB).
    pub max_upload_size: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: PathBuf::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7171".to_string(),
            max_chunk_size: 64 * 1024,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            case_insensitive: false,
            max_upload_size: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filebay")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FILEBAY_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - FILEBAY_LISTEN_ADDR: Override the listen address
    /// - FILEBAY_ROOT: Override the managed root directory
    /// - FILEBAY_CASE_INSENSITIVE: Override case-insensitive path comparison (true/false)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("FILEBAY_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }

        if let Ok(addr) = std::env::var("FILEBAY_LISTEN_ADDR") {
            if !addr.is_empty() {
                tracing::info!("Overriding listen_addr from environment: {}", addr);
                self.server.listen_addr = addr;
            }
        }

        if let Ok(root) = std::env::var("FILEBAY_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding files.root from environment: {}", root);
                self.files.root = PathBuf::from(root);
            }
        }

        if let Ok(value) = std::env::var("FILEBAY_CASE_INSENSITIVE") {
            if !value.is_empty() {
                match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" => {
                        tracing::info!("Overriding case_insensitive from environment: true");
                        self.files.case_insensitive = true;
                    }
                    "0" | "false" | "no" => {
                        tracing::info!("Overriding case_insensitive from environment: false");
                        self.files.case_insensitive = false;
                    }
                    other => {
                        tracing::warn!(
                            "Ignoring FILEBAY_CASE_INSENSITIVE with unrecognized value: {}",
                            other
                        );
                    }
                }
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is missing or outside
    /// its valid range. The daemon refuses to start on a validation error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files.root.as_os_str().is_empty() {
            return Err(ConfigError::MissingRoot);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        if self.server.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(self.server.listen_addr.clone()));
        }

        if self.server.max_chunk_size == 0 || self.server.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidMaxChunkSize(self.server.max_chunk_size));
        }

        if self.files.max_upload_size == 0 {
            return Err(ConfigError::InvalidMaxUploadSize(self.files.max_upload_size));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/filebay/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<()> {
        self.save(default_config_path())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
