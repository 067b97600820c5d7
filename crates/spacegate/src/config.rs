//! Configuration for the space services.
//!
//! Every field has a default, so a partial JSON document is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpaceError};

/// Presence announcements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// How often the local peer announces itself.
    pub announce_interval_ms: u64,

    /// A remote peer silent for this long is offline.
    pub offline_timeout_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            announce_interval_ms: 1_000,
            offline_timeout_ms: 30_000,
        }
    }
}

impl PresenceConfig {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    pub fn offline_timeout(&self) -> Duration {
        Duration::from_millis(self.offline_timeout_ms)
    }
}

/// Top-level services configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub presence: PresenceConfig,

    /// Deadline for [`SpaceServices::open`](crate::SpaceServices::open).
    pub init_timeout_ms: u64,

    /// Warn when a lock is waited on longer than this.
    pub lock_warn_after_ms: Option<u64>,

    /// Buffered data feed messages per space.
    pub data_channel_capacity: usize,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            presence: PresenceConfig::default(),
            init_timeout_ms: 30_000,
            lock_warn_after_ms: None,
            data_channel_capacity: 1024,
        }
    }
}

impl ServicesConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SpaceError::Config(e.to_string()))?;
        if config.data_channel_capacity == 0 {
            return Err(SpaceError::Config(
                "data_channel_capacity must be positive".into(),
            ));
        }
        Ok(config)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn lock_warn_after(&self) -> Option<Duration> {
        self.lock_warn_after_ms.map(Duration::from_millis)
    }
}
