//! Simulator error types

use autopatch_types::TestCategory;
use thiserror::Error;

/// Errors raised by environment providers and test runners
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Test runner failed for {category}: {reason}")]
    Runner {
        category: TestCategory,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimulatorError>;
