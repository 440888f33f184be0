//! Runner errors.

use thiserror::Error;

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Failure to get a result out of a container at all.
///
/// A container that ran and exited non-zero is not an error here; callers
/// inspect [`ExecutionResult::exit_code`](crate::ExecutionResult::exit_code).
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Container runtime not available: {0}")]
    RuntimeNotAvailable(String),

    #[error("Container execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Could not pull {image}: {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("Container timeout after {0} seconds")]
    Timeout(u64),

    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
}

impl RunnerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Timeout(_))
    }
}
