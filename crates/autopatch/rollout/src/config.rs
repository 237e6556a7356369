//! Controller configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rollout controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutControllerConfig {
    /// Seconds without a status update before a rollout counts as stuck
    #[serde(default = "default_stuck_timeout")]
    pub stuck_timeout_secs: u64,

    /// Seconds between stuck-rollout scans
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Response time above which a sample is unhealthy
    #[serde(default = "default_response_time_ceiling")]
    pub response_time_ceiling_ms: f64,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_stuck_timeout() -> u64 {
    600
}

fn default_monitor_interval() -> u64 {
    60
}

fn default_response_time_ceiling() -> f64 {
    500.0
}

fn default_history_limit() -> usize {
    100
}

impl Default for RolloutControllerConfig {
    fn default() -> Self {
        Self {
            stuck_timeout_secs: default_stuck_timeout(),
            monitor_interval_secs: default_monitor_interval(),
            response_time_ceiling_ms: default_response_time_ceiling(),
            history_limit: default_history_limit(),
        }
    }
}

impl RolloutControllerConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }
}
