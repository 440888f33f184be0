//! Error types for the IaC module.

use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur while driving a stack lifecycle.
#[derive(Error, Debug)]
pub enum IacError {
    /// Stack definition invalid or unreachable; nothing was provisioned.
    #[error("Terraform init failed: {0}")]
    InitFailed(String),

    /// Provisioning failed, possibly partway; teardown is still required.
    #[error("Terraform apply failed: {0}")]
    ApplyFailed(String),

    /// Teardown failed after provisioning; resources may have leaked.
    #[error("Terraform destroy failed, resources may have leaked: {0}")]
    DestroyFailed(String),

    #[error("Output '{name}' not found (available: {})", .available.join(", "))]
    MissingOutput { name: String, available: Vec<String> },

    #[error("Output '{name}' is a {actual}, expected {expected}")]
    OutputType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Stack {handle} has not been applied (state: {state})")]
    NotApplied { handle: String, state: String },

    #[error("Stack {0} was already destroyed")]
    HandleDestroyed(String),

    #[error("Unreadable terraform output: {0}")]
    OutputFormat(String),

    #[error("Failed to copy stack directory: {0}")]
    Copy(String),

    #[error("Runner error: {0}")]
    Runner(#[from] probe_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IacError {
    /// Errors caused by the test author rather than the infrastructure.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            IacError::MissingOutput { .. }
                | IacError::OutputType { .. }
                | IacError::NotApplied { .. }
                | IacError::HandleDestroyed(_)
        )
    }
}
