//! Connection manager configuration.
//!
//! Every field has a default, so a partial TOML file (or none at all)
//! yields a working configuration:
//!
//! ```toml
//! max_room_join_attempts = 3
//!
//! [auth_backoff]
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//!
//! [transport]
//! url = "wss://intel.example.com/realtime"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backoff::BackoffConfig;
use crate::error::ConfigError;

/// Settings for the connection manager and its retry domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Consecutive join failures after which a room is dropped.
    pub max_room_join_attempts: u32,
    /// Pause between queued operations when draining the queue.
    #[serde(rename = "queue_flush_interval_ms", with = "duration_ms")]
    pub queue_flush_interval: Duration,
    /// Emit failures tolerated per queued operation before it is dropped.
    pub max_operation_retries: u32,
    /// Backoff between authentication retries (uncapped attempts).
    pub auth_backoff: BackoffConfig,
    /// Backoff between room join retries.
    pub room_backoff: BackoffConfig,
    pub transport: TransportConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_room_join_attempts: 3,
            queue_flush_interval: Duration::from_millis(100),
            max_operation_retries: 3,
            auth_backoff: BackoffConfig::default(),
            room_backoff: BackoffConfig::new(
                Duration::from_millis(1000),
                Duration::from_millis(10_000),
                2.0,
                true,
            ),
            transport: TransportConfig::default(),
        }
    }
}

/// Settings for the WebSocket transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Reconnection attempts before `reconnect_failed` is raised.
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff: BackoffConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3001/realtime".into(),
            connect_timeout: Duration::from_secs(20),
            max_reconnect_attempts: 5,
            reconnect_backoff: BackoffConfig::new(
                Duration::from_millis(1000),
                Duration::from_millis(5000),
                2.0,
                true,
            ),
        }
    }
}

impl ManagerConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Returns the config file path: `$HARBORLINK_CONFIG`, else
/// `<config dir>/harborlink/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HARBORLINK_CONFIG") {
        return Some(PathBuf::from(path));
    }
    config_dir().map(|d| d.join("harborlink").join("config.toml"))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
