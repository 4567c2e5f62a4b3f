//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/chatline/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/chatline/` (~/.config/chatline/)
//! - State/Logs: `$XDG_STATE_HOME/chatline/` (~/.local/state/chatline/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Chat server endpoints
    #[serde(default)]
    pub server: ServerConfig,

    /// Transcript assembly tuning
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Chat server configuration used by [`HttpTransport`](crate::transport::HttpTransport)
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the chat server (e.g., `http://localhost:8000`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path returning `{"session": "..."}`
    #[serde(default = "default_session_path")]
    pub session_path: String,

    /// Path accepting a chat request and answering with NDJSON records
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Path accepting multipart file uploads
    #[serde(default = "default_file_path")]
    pub file_path: String,

    /// HTTP request timeout in seconds (applies to connect and non-streaming calls)
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_path: default_session_path(),
            stream_path: default_stream_path(),
            file_path: default_file_path(),
            timeout_secs: default_server_timeout(),
        }
    }
}

impl ServerConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(Error::Config("server.base_url must not be empty".to_string()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server.base_url must be an http(s) URL, got {:?}",
                base
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "server.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Joins the base URL and an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_session_path() -> String {
    "/session".to_string()
}

fn default_stream_path() -> String {
    "/stream".to_string()
}

fn default_file_path() -> String {
    "/file".to_string()
}

fn default_server_timeout() -> u64 {
    30
}

/// Transcript assembly configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptConfig {
    /// Minimum milliseconds between two auto-scroll requests
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: u64,

    /// Text of the synthetic item appended when an exchange fails
    #[serde(default = "default_error_text")]
    pub error_text: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            scroll_throttle_ms: default_scroll_throttle_ms(),
            error_text: default_error_text(),
        }
    }
}

impl TranscriptConfig {
    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }
}

fn default_scroll_throttle_ms() -> u64 {
    250
}

fn default_error_text() -> String {
    "*Error with response. Please try again later.*".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/chatline/config.toml` (~/.config/chatline/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("chatline").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/chatline/` (~/.local/state/chatline/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("chatline")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/chatline/chatline.log` (~/.local/state/chatline/chatline.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("chatline.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
