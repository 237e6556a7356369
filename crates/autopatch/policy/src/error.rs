//! Policy error types

use thiserror::Error;

/// Errors raised by policy management
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Policy not found: {0}")]
    NotFound(String),

    #[error("Policy already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid policy: {0}")]
    Invalid(String),
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
