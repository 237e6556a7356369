//! Orchestrator configuration

use autopatch_types::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Update-check loop and workflow settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Seconds between automatic update checks
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Milliseconds between deployment/rollout status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Finished workflows kept in history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Simulation parameters applied to every candidate
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Extra keys merged into every deployment request
    #[serde(default)]
    pub deployment_config: serde_json::Map<String, serde_json::Value>,
}

fn default_check_interval() -> u64 {
    3600
}

fn default_poll_interval() -> u64 {
    5_000
}

fn default_history_limit() -> usize {
    100
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            poll_interval_ms: default_poll_interval(),
            history_limit: default_history_limit(),
            simulation: SimulationConfig::default(),
            deployment_config: serde_json::Map::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
