//! The container runner seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ContainerConfig, RunConfig};
use crate::error::RunnerResult;

/// Outcome of one container run that exited on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub container_id: String,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    /// Wall time from create to exit
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }

    /// The last `lines` non-blank lines of combined output.
    ///
    /// Terraform and the AWS CLI print the actual error last, after pages of
    /// progress output.
    pub fn output_tail(&self, lines: usize) -> String {
        let combined = self.combined_output();
        let kept: Vec<&str> = combined
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        kept[kept.len().saturating_sub(lines)..].join("\n")
    }
}

/// Runs one-shot tool containers.
///
/// `run_container` returns once the container exits, or fails with
/// [`RunnerError::Timeout`](crate::RunnerError::Timeout) after
/// [`RunConfig::timeout_seconds`]. A non-zero exit is a normal result, not an
/// error.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    /// Make `image:tag` available locally, pulling it if missing.
    async fn ensure_image(&self, image: &str, tag: &str) -> RunnerResult<()>;

    async fn run_container(
        &self,
        config: &ContainerConfig,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult>;
}
