//! Error types for resource probing.

use probe_spec::ResourceKind;
use thiserror::Error;

/// Result type alias for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur while probing live resources.
#[derive(Error, Debug)]
pub enum CloudError {
    /// The resource does not exist (or no longer does).
    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },

    /// Throttling, connectivity or timeouts; worth another attempt.
    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// Permissions, malformed identifiers and anything else the provider rejects.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Runner error: {0}")]
    Runner(#[from] probe_runner::RunnerError),

    #[error("Unexpected provider response: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound { .. })
    }
}
