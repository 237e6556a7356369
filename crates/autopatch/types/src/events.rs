//! Events emitted while workflows progress

use crate::ids::WorkflowId;
use crate::workflow::WorkflowStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow progress notification broadcast by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateEvent {
    WorkflowStarted {
        workflow_id: WorkflowId,
        component: String,
        version: String,
        manual_approval: bool,
    },
    StageChanged {
        workflow_id: WorkflowId,
        from: WorkflowStage,
        to: WorkflowStage,
    },
    AwaitingApproval {
        workflow_id: WorkflowId,
        reason: String,
    },
    WorkflowCompleted {
        workflow_id: WorkflowId,
        component: String,
        version: String,
    },
    WorkflowFailed {
        workflow_id: WorkflowId,
        error: String,
    },
}

impl UpdateEvent {
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            Self::WorkflowStarted { workflow_id, .. }
            | Self::StageChanged { workflow_id, .. }
            | Self::AwaitingApproval { workflow_id, .. }
            | Self::WorkflowCompleted { workflow_id, .. }
            | Self::WorkflowFailed { workflow_id, .. } => *workflow_id,
        }
    }
}

/// Event with emission timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: UpdateEvent,
}

impl UpdateEventEnvelope {
    pub fn new(event: UpdateEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
