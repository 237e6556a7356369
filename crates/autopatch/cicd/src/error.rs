//! CI/CD error types

use autopatch_types::{DeploymentStatus, NotApproved, TriggerId};
use thiserror::Error;

/// Errors raised by the integrator and its providers
#[derive(Debug, Error)]
pub enum CicdError {
    #[error("Deployment rejected: {0}")]
    NotApproved(#[from] NotApproved),

    #[error("Deployment not found: {0}")]
    NotFound(TriggerId),

    #[error("Deployment {trigger_id} is {status} and cannot be cancelled")]
    InvalidState {
        trigger_id: TriggerId,
        status: DeploymentStatus,
    },

    #[error("Dispatch to {provider} failed: {reason}")]
    Dispatch { provider: String, reason: String },

    #[error("Polling {provider} failed: {reason}")]
    Poll { provider: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CI/CD integrator is already running")]
    AlreadyRunning,

    #[error("CI/CD integrator is not running")]
    NotRunning,
}

/// Result type for CI/CD operations
pub type Result<T> = std::result::Result<T, CicdError>;
