//! Client configuration and the proxi home directory

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use proxi_proto::gatt::{BEACON_NAME, DEFAULT_MTU};

use crate::StoreError;

/// Get PROXI_HOME directory (default `~/.proxi`), creating it if needed
pub fn proxi_home() -> Result<PathBuf, StoreError> {
    let home = match std::env::var("PROXI_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => dirs::home_dir().ok_or(StoreError::NoHome)?.join(".proxi"),
    };

    if !home.exists() {
        fs::create_dir_all(&home)?;
    }

    Ok(home)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Advertised name the beacon must carry, matched exactly
    pub beacon_name: String,
    /// Candidates must be heard above this RSSI to be accepted
    pub proximity_gate: i16,
    /// How often the observed RSSI is sent while connected
    pub send_interval_ms: u64,
    /// MTU requested after connecting
    pub mtu: u16,
    /// Connect attempts running longer than this count as failed
    pub connect_timeout_ms: u64,
    /// Capacity of the transport → client event channel
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            beacon_name: BEACON_NAME.to_string(),
            proximity_gate: -70,
            send_interval_ms: 1000,
            mtu: DEFAULT_MTU,
            connect_timeout_ms: 10_000,
            event_capacity: 64,
        }
    }
}

impl ClientConfig {
    pub const FILE_NAME: &'static str = "client.json";

    /// Read `<home>/client.json`; missing file or missing keys fall back to defaults
    pub fn load(home: &Path) -> Result<Self, StoreError> {
        let path = home.join(Self::FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.send_interval_ms == 0 {
            return Err(StoreError::InvalidConfig("send_interval_ms must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(StoreError::InvalidConfig("event_capacity must be at least 1"));
        }
        Ok(())
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
