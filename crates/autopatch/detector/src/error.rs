//! Detector error types

use thiserror::Error;

/// Errors raised while fetching or parsing versions
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Version source {name} unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },

    #[error("Version source {name} timed out after {secs}s")]
    Timeout { name: String, secs: u64 },

    #[error("Malformed version document from {name}: {reason}")]
    MalformedDocument { name: String, reason: String },

    #[error("git ls-remote failed for {repository}: {reason}")]
    Git { repository: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Detector is already running")]
    AlreadyRunning,
}

/// Result type for detector operations
pub type Result<T> = std::result::Result<T, DetectorError>;
