//! Configuration schema for skiff.toml

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::progress::{AnomalyPolicy, ColorMode};

/// Root configuration structure for skiff.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SkiffConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where the skiff server listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// `host:port` or an http(s) URL
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Progress display settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    #[serde(default)]
    pub color: ColorMode,

    /// Redraw interval of pending stages, in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default)]
    pub anomalies: AnomalyPolicy,
}

/// Local build record settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Overrides the state directory build records are kept in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1:44135".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_tick_ms() -> u64 {
    50
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: ColorMode::default(),
            tick_ms: default_tick_ms(),
            anomalies: AnomalyPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl DisplayConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl SkiffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if self.server.connect_timeout_secs == 0 {
            anyhow::bail!("server.connect_timeout_secs must be at least 1");
        }
        if self.display.tick_ms == 0 {
            anyhow::bail!("display.tick_ms must be at least 1");
        }
        Ok(())
    }

    /// Apply a `SKIFF_HOST`-style override when present and non-empty.
    pub fn apply_host_override(&mut self, host: Option<String>) {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.server.host = host;
        }
    }
}
