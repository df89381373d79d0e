//! Watcher configuration.
//!
//! The manager settings sit at the top level of the TOML file, next to a
//! `[rooms]` table listing what to follow:
//!
//! ```toml
//! [transport]
//! url = "wss://intel.example.com/realtime"
//!
//! [rooms]
//! vessels = ["IMO9321483"]
//! areas = ["NLRTM-anchorage"]
//! ```

use std::path::Path;

use harborlink_realtime::ManagerConfig;
use serde::{Deserialize, Serialize};

/// Rooms joined at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub vessels: Vec<String>,
    pub areas: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub rooms: RoomsConfig,

    #[serde(flatten)]
    pub manager: ManagerConfig,
}

impl WatchConfig {
    /// Loads configuration from `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: WatchConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
