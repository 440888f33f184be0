//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while orchestrating tests.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Spec error: {0}")]
    Spec(#[from] probe_spec::SpecError),

    #[error("Stack error: {0}")]
    Iac(#[from] probe_iac::IacError),

    #[error("Probe error: {0}")]
    Cloud(#[from] probe_cloud::CloudError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
