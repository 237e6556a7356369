//! Integrator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue consumer and monitoring settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CicdConfig {
    /// Milliseconds between pipeline status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds to wait for a terminal pipeline status before failing
    #[serde(default = "default_monitoring_horizon")]
    pub monitoring_horizon_secs: u64,

    /// Finished deployments kept in history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Timeout for each outbound provider request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_monitoring_horizon() -> u64 {
    1800
}

fn default_history_limit() -> usize {
    100
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for CicdConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            monitoring_horizon_secs: default_monitoring_horizon(),
            history_limit: default_history_limit(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl CicdConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn monitoring_horizon(&self) -> Duration {
        Duration::from_secs(self.monitoring_horizon_secs)
    }
}
