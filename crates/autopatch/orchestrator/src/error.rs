//! Orchestrator error types

use autopatch_cicd::CicdError;
use autopatch_detector::DetectorError;
use autopatch_policy::PolicyError;
use autopatch_rollout::RolloutError;
use autopatch_types::{WorkflowId, WorkflowStage};
use thiserror::Error;

/// Errors returned by orchestrator control calls.
///
/// Failures inside a workflow are recorded on the workflow instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("Workflow {workflow_id} is at stage {stage}, expected awaiting_approval")]
    InvalidState {
        workflow_id: WorkflowId,
        stage: WorkflowStage,
    },

    #[error("Workflow {0} was already approved")]
    AlreadyApproved(WorkflowId),

    #[error("Orchestrator is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Cicd(#[from] CicdError),

    #[error(transparent)]
    Rollout(#[from] RolloutError),
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;
