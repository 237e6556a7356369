//! Detector configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling configuration for the version detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Seconds between polls of every source
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-source fetch timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl DetectorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
