//! Deployment triggers and tracked deployment results

use crate::error::{NotApproved, TransitionError};
use crate::fsm::StateMachine;
use crate::ids::TriggerId;
use crate::policy::PolicyEvaluation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a dispatched deployment.
///
/// Pending → Queued → Running → {Success, Failed, Cancelled}; Pending and
/// Queued may also fail or be cancelled directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl StateMachine for DeploymentStatus {
    const MACHINE: &'static str = "deployment";

    fn can_transition_to(&self, next: &Self) -> bool {
        use DeploymentStatus::*;
        match self {
            Pending => matches!(next, Queued | Failed | Cancelled),
            Queued => matches!(next, Running | Failed | Cancelled),
            Running => matches!(next, Success | Failed | Cancelled),
            Success | Failed | Cancelled => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

/// Immutable request to deploy an approved version.
///
/// Can only be constructed (or deserialized) from an APPROVE evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TriggerRecord")]
pub struct DeploymentTrigger {
    id: TriggerId,
    component: String,
    version: String,
    evaluation: PolicyEvaluation,
    deployment_config: serde_json::Value,
    requested_at: DateTime<Utc>,
}

impl DeploymentTrigger {
    pub fn new(
        evaluation: PolicyEvaluation,
        deployment_config: serde_json::Value,
    ) -> Result<Self, NotApproved> {
        if !evaluation.is_approved() {
            return Err(NotApproved(evaluation.decision));
        }
        Ok(Self {
            id: TriggerId::generate(),
            component: evaluation.component.clone(),
            version: evaluation.version.clone(),
            evaluation,
            deployment_config,
            requested_at: Utc::now(),
        })
    }

    pub fn id(&self) -> TriggerId {
        self.id
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn evaluation(&self) -> &PolicyEvaluation {
        &self.evaluation
    }

    pub fn deployment_config(&self) -> &serde_json::Value {
        &self.deployment_config
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// Body sent to CI/CD providers.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "component": self.component,
            "version": self.version,
            "trigger_id": self.id.as_uuid().to_string(),
            "deployment_config": self.deployment_config,
        })
    }
}

#[derive(Deserialize)]
struct TriggerRecord {
    id: TriggerId,
    component: String,
    version: String,
    evaluation: PolicyEvaluation,
    deployment_config: serde_json::Value,
    requested_at: DateTime<Utc>,
}

impl TryFrom<TriggerRecord> for DeploymentTrigger {
    type Error = NotApproved;

    fn try_from(record: TriggerRecord) -> Result<Self, Self::Error> {
        if !record.evaluation.is_approved() {
            return Err(NotApproved(record.evaluation.decision));
        }
        Ok(Self {
            id: record.id,
            component: record.component,
            version: record.version,
            evaluation: record.evaluation,
            deployment_config: record.deployment_config,
            requested_at: record.requested_at,
        })
    }
}

/// Mutable tracked outcome of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub trigger_id: TriggerId,
    pub component: String,
    pub version: String,
    pub provider: String,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pipeline_url: Option<String>,
    pub logs_url: Option<String>,
    /// Provider-side identifier (run id, pipeline id, build number)
    pub external_id: Option<String>,
    pub artifacts: Vec<String>,
    pub errors: Vec<String>,
}

impl DeploymentResult {
    pub fn pending(trigger: &DeploymentTrigger, provider: impl Into<String>) -> Self {
        Self {
            trigger_id: trigger.id(),
            component: trigger.component().to_string(),
            version: trigger.version().to_string(),
            provider: provider.into(),
            status: DeploymentStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            pipeline_url: None,
            logs_url: None,
            external_id: None,
            artifacts: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Apply a status transition, stamping start and completion times.
    pub fn transition_to(&mut self, next: DeploymentStatus) -> Result<(), TransitionError> {
        self.status.transition_to(next)?;
        let now = Utc::now();
        if next == DeploymentStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Record an error and move to Failed when still possible.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        let _ = self.transition_to(DeploymentStatus::Failed);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds from start (or creation) to completion.
    pub fn duration_secs(&self) -> Option<f64> {
        let end = self.completed_at?;
        let start = self.started_at.unwrap_or(self.created_at);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}
