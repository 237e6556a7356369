//! JSON-serializable view of the whole pipeline

use crate::config::OrchestratorConfig;
use autopatch_cicd::DeploymentStatistics;
use autopatch_detector::DetectorSnapshot;
use autopatch_policy::PolicyStatistics;
use autopatch_rollout::RolloutStatistics;
use autopatch_simulator::SimulatorStatistics;
use autopatch_types::{
    DeploymentResult, RolloutStatus, SimulationResult, UpdatePolicy, UpdateWorkflow, WorkflowStage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow outcome counters over active and finished workflows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub awaiting_approval: usize,
    pub success_rate: f64,
}

impl WorkflowStatistics {
    pub fn collect<'a>(
        active: usize,
        finished: impl IntoIterator<Item = &'a UpdateWorkflow>,
    ) -> Self {
        let mut stats = Self {
            active,
            ..Self::default()
        };
        for workflow in finished {
            match workflow.current_stage {
                WorkflowStage::Completed => stats.completed += 1,
                WorkflowStage::Failed => stats.failed += 1,
                WorkflowStage::AwaitingApproval => stats.awaiting_approval += 1,
                _ => {}
            }
        }
        let decided = stats.completed + stats.failed;
        if decided > 0 {
            stats.success_rate = stats.completed as f64 / decided as f64;
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorSnapshot {
    pub active: Vec<SimulationResult>,
    pub statistics: SimulatorStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    pub provider: String,
    pub running: bool,
    pub queue_len: usize,
    pub active: Vec<DeploymentResult>,
    pub statistics: DeploymentStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutSnapshot {
    pub running: bool,
    pub active: Vec<RolloutStatus>,
    pub statistics: RolloutStatistics,
}

/// Full state export for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    pub generated_at: DateTime<Utc>,
    pub running: bool,
    pub config: OrchestratorConfig,
    pub workflows: WorkflowStatistics,
    pub active_workflows: Vec<UpdateWorkflow>,
    pub pending_approvals: Vec<UpdateWorkflow>,
    pub recent_workflows: Vec<UpdateWorkflow>,
    pub detector: DetectorSnapshot,
    pub simulator: SimulatorSnapshot,
    pub policies: Vec<UpdatePolicy>,
    pub policy_statistics: PolicyStatistics,
    pub deployments: DeploymentSnapshot,
    pub rollouts: RolloutSnapshot,
}
