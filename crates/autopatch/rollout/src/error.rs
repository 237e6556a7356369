//! Rollout error types

use autopatch_types::{RolloutId, TransitionError};
use thiserror::Error;

/// Errors raised by the rollout controller and its capability providers
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("Invalid rollout configuration: {0}")]
    InvalidConfig(String),

    #[error("Rollout not found: {0}")]
    NotFound(RolloutId),

    #[error("Rollout controller is shutting down")]
    ShuttingDown,

    #[error("Traffic shift for {component} failed: {reason}")]
    Traffic { component: String, reason: String },

    #[error("Health sampling for {component} failed: {reason}")]
    Metrics { component: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Rollout monitor is already running")]
    AlreadyRunning,
}

/// Result type for rollout operations
pub type Result<T> = std::result::Result<T, RolloutError>;
