//! Configuration management for the rag-chat client.
//!
//! The client reads an optional JSON file at `~/.rag-chat/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Command line flags (applied by the binary)
//! 2. Environment variables (`RAG_CHAT_*` prefix)
//! 3. Explicit config file values
//! 4. Default values
//!
//! # Environment Variable Mapping
//!
//! - `RAG_CHAT_ENDPOINT` → server.endpoint
//! - `RAG_CHAT_TOKEN` → server.token
//! - `RAG_CHAT_LOG_LEVEL` → observability.log_level
//! - `RAG_CHAT_LOG_FORMAT` → observability.log_format

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".rag-chat"),
        |dirs| dirs.home_dir().join(".rag-chat"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Where the ask service lives and how to authenticate against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the service, e.g. `http://127.0.0.1:8000`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API token sent as `Authorization: Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Timeout for the non-streaming requests (login, config, ask)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_request_timeout() -> u64 {
    60
}

// ============================================================================
// Stream Configuration
// ============================================================================

/// Tuning for the streaming exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Capacity of the update channel between the stream task and its consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Timeout for establishing the event-stream connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_channel_capacity() -> usize {
    64
}

fn default_connect_timeout() -> u64 {
    10
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path. `~` and `$VAR` are expanded.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = path.to_string_lossy();
        let expanded = shellexpand::full(&raw)
            .map_err(|e| Error::Config(format!("cannot expand {raw}: {e}")))?;
        let path = PathBuf::from(expanded.as_ref());

        let content = fs::read_to_string(&path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (explicit path or default) and apply environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("RAG_CHAT_ENDPOINT") {
            self.server.endpoint = endpoint;
        }
        if let Some(token) = lookup("RAG_CHAT_TOKEN") {
            if !token.trim().is_empty() {
                self.server.token = Some(token);
            }
        }
        if let Some(level) = lookup("RAG_CHAT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("RAG_CHAT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Service base URL without a trailing slash.
    pub fn endpoint(&self) -> &str {
        self.server.endpoint.trim_end_matches('/')
    }

    /// Save configuration to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .context(format!("Failed to create config directory {}", dir.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))
    }
}
