//! Configuration system for stackboard
//!
//! Reads config from ~/.config/stackboard/config.toml, then applies
//! environment overrides (`PORT`, `STACKBOARD_WS_PORT`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub http_port: u16,
    pub ws_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            http_port: 5000,
            ws_port: 5001,
        }
    }
}

/// Which entity backend the host runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Database file; defaults to the platform data dir
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("stackboard")
                .join("board.db")
        })
    }
}

/// Sync channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Origins allowed to open a sync connection (scheme + host must match)
    pub allowed_origins: Vec<String>,
    pub heartbeat_secs: u64,
    /// Connections silent for this long are dropped
    pub idle_timeout_secs: u64,
    /// Broadcast buffer per connection before it lags and gets resynced
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            allowed_origins: [
                "http://localhost",
                "http://127.0.0.1",
                "https://localhost",
                "https://127.0.0.1",
            ]
            .map(String::from)
            .to_vec(),
            heartbeat_secs: 30,
            idle_timeout_secs: 300,
            channel_capacity: 256,
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

const DEFAULT_CONFIG: &str = r#"# stackboard Configuration

[server]
bind = "127.0.0.1"
http_port = 5000
ws_port = 5001

[storage]
# "sqlite" or "memory"
backend = "sqlite"
# path = "/var/lib/stackboard/board.db"

[sync]
allowed_origins = ["http://localhost", "http://127.0.0.1", "https://localhost", "https://127.0.0.1"]
heartbeat_secs = 30
idle_timeout_secs = 300
channel_capacity = 256
"#;

impl Config {
    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stackboard")
            .join("config.toml")
    }

    /// Load from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        let path = Self::default_config_path();
        match Self::load_from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    /// Load from a specific path; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `PORT` / `STACKBOARD_WS_PORT` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparsable values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.http_port = port;
        }
        if let Some(port) = lookup("STACKBOARD_WS_PORT").and_then(|v| v.parse().ok()) {
            self.server.ws_port = port;
        }
    }

    /// Create default config file if it doesn't exist
    pub fn create_default_if_missing() {
        let path = Self::default_config_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(&path, DEFAULT_CONFIG);
        }
    }
}
