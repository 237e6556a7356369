//! Error types shared by the data model

use crate::policy::UpdateDecision;
use thiserror::Error;

/// Rejected state change on one of the pipeline state machines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The requested move is not an edge of the state machine.
    #[error("illegal {machine} transition: {from} -> {to}")]
    Illegal {
        machine: &'static str,
        from: String,
        to: String,
    },

    /// Traffic percentage outside 0..=100.
    #[error("rollout percentage {0} is outside 0..=100")]
    PercentageOutOfRange(u8),

    /// Traffic percentage decreased outside a rollback.
    #[error("rollout percentage cannot decrease from {from} to {to} unless rolling back")]
    PercentageDecrease { from: u8, to: u8 },
}

/// A deployment trigger was requested for a non-approved evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("deployment requires an APPROVE evaluation, got {0}")]
pub struct NotApproved(pub UpdateDecision);
