//! Update workflow - the aggregate record of one pipeline attempt

use crate::deployment::{DeploymentResult, DeploymentTrigger};
use crate::error::TransitionError;
use crate::fsm::StateMachine;
use crate::ids::WorkflowId;
use crate::policy::PolicyEvaluation;
use crate::rollout::RolloutStatus;
use crate::simulation::SimulationResult;
use crate::version::VersionComparison;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage pointer of a workflow.
///
/// version_comparison → simulation → policy_evaluation → cicd_trigger →
/// rollout → completed, or any non-terminal stage → failed /
/// awaiting_approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    VersionComparison,
    Simulation,
    PolicyEvaluation,
    CicdTrigger,
    Rollout,
    Completed,
    Failed,
    AwaitingApproval,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VersionComparison => "version_comparison",
            Self::Simulation => "simulation",
            Self::PolicyEvaluation => "policy_evaluation",
            Self::CicdTrigger => "cicd_trigger",
            Self::Rollout => "rollout",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::AwaitingApproval => "awaiting_approval",
        }
    }

    fn next_in_sequence(&self) -> Option<Self> {
        match self {
            Self::VersionComparison => Some(Self::Simulation),
            Self::Simulation => Some(Self::PolicyEvaluation),
            Self::PolicyEvaluation => Some(Self::CicdTrigger),
            Self::CicdTrigger => Some(Self::Rollout),
            Self::Rollout => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateMachine for WorkflowStage {
    const MACHINE: &'static str = "workflow";

    fn can_transition_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(next, Self::Failed | Self::AwaitingApproval) || self.next_in_sequence() == Some(*next)
    }

    /// `awaiting_approval` is terminal for the record itself; approval
    /// continues in a fresh workflow.
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::AwaitingApproval)
    }
}

/// One end-to-end attempt to take a component/version pair through the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateWorkflow {
    pub id: WorkflowId,
    pub component: String,
    pub version: String,
    pub current_stage: WorkflowStage,
    /// Operator approval overrides non-REJECT decisions
    pub manual_approval: bool,
    pub version_comparison: Option<VersionComparison>,
    pub simulation_result: Option<SimulationResult>,
    pub policy_evaluation: Option<PolicyEvaluation>,
    pub deployment_trigger: Option<DeploymentTrigger>,
    pub deployment_result: Option<DeploymentResult>,
    pub rollout_status: Option<RolloutStatus>,
    pub success: bool,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// The awaiting workflow this attempt resumes
    pub resumed_from: Option<WorkflowId>,
}

impl UpdateWorkflow {
    pub fn new(comparison: VersionComparison, manual_approval: bool) -> Self {
        Self {
            id: WorkflowId::generate(),
            component: comparison.component.clone(),
            version: comparison.available_version.clone(),
            current_stage: WorkflowStage::VersionComparison,
            manual_approval,
            version_comparison: Some(comparison),
            simulation_result: None,
            policy_evaluation: None,
            deployment_trigger: None,
            deployment_result: None,
            rollout_status: None,
            success: false,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            resumed_from: None,
        }
    }

    pub fn advance(&mut self, next: WorkflowStage) -> Result<(), TransitionError> {
        self.current_stage.transition_to(next)?;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.success = next == WorkflowStage::Completed;
        Ok(())
    }

    /// Halt at `failed`, recording the cause.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        let _ = self.advance(WorkflowStage::Failed);
    }

    /// Halt at `awaiting_approval`, recording the cause.
    pub fn await_approval(&mut self, reason: impl Into<String>) {
        self.errors.push(reason.into());
        let _ = self.advance(WorkflowStage::AwaitingApproval);
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage.is_terminal()
    }

    pub fn is_awaiting_approval(&self) -> bool {
        self.current_stage == WorkflowStage::AwaitingApproval
    }
}
