//! Simulator configuration

use serde::{Deserialize, Serialize};

/// Limits for the update simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Simulations allowed to run at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_simulations: usize,

    /// Finished results kept in history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_history_limit() -> usize {
    100
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_simulations: default_max_concurrent(),
            history_limit: default_history_limit(),
        }
    }
}
