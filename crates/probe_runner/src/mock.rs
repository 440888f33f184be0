//! Mock container runner for testing.
//!
//! Responses are scripted per command: a rule matches when its pattern is a
//! substring of the joined command line, and hands out its responses in order,
//! repeating the last one once the script is exhausted. Unmatched commands
//! succeed with empty output.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::abandon::AbandonGuard;
use crate::config::{ContainerConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ContainerRunner, ExecutionResult};

/// Predefined mock response for a container execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Fail with [`RunnerError::Timeout`] instead of returning a result.
    pub timed_out: bool,
    /// Keep the run pending this long before answering.
    pub hold_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
            timed_out: false,
            hold_ms: 0,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
            timed_out: false,
            hold_ms: 0,
        }
    }

    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Self::failure(-1, "")
        }
    }

    /// Answer only after `ms`, like a long apply.
    pub fn held_for(mut self, ms: u64) -> Self {
        self.hold_ms = ms;
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub image: Option<String>,
    pub command: Vec<String>,
    pub workdir: Option<String>,
    pub mounts: Vec<String>,
}

impl CapturedCall {
    fn method(method: &str) -> Self {
        Self {
            method: method.to_string(),
            image: None,
            command: Vec::new(),
            workdir: None,
            mounts: Vec::new(),
        }
    }

    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Debug)]
struct ScriptRule {
    pattern: String,
    responses: Vec<MockResponse>,
    served: usize,
}

impl ScriptRule {
    fn next(&mut self) -> MockResponse {
        let index = self.served.min(self.responses.len().saturating_sub(1));
        self.served += 1;
        self.responses
            .get(index)
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

/// Mock container runner for testing.
///
/// Clones share state, so a test can hand one clone to the code under test and
/// inspect calls through another.
#[derive(Clone)]
pub struct MockRunner {
    rules: Arc<RwLock<Vec<ScriptRule>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    existing_images: Arc<RwLock<Vec<String>>>,
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(Vec::new())),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            existing_images: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Script the responses for commands containing `pattern`.
    ///
    /// Rules are checked in registration order; the first match wins.
    pub fn on_command(self, pattern: impl Into<String>, responses: Vec<MockResponse>) -> Self {
        self.rules.write().push(ScriptRule {
            pattern: pattern.into(),
            responses,
            served: 0,
        });
        self
    }

    /// Shorthand for a rule with a single repeating response.
    pub fn respond(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.on_command(pattern, vec![response])
    }

    pub fn add_existing_image(self, image: impl Into<String>) -> Self {
        self.existing_images.write().push(image.into());
        self
    }

    /// Make every call fail with [`RunnerError::ExecutionFailed`].
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Container runs whose command line contains `pattern`.
    pub fn runs_matching(&self, pattern: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == "run_container" && c.command_line().contains(pattern))
            .cloned()
            .collect()
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn next_response(&self, command_line: &str) -> MockResponse {
        let mut rules = self.rules.write();
        rules
            .iter_mut()
            .find(|rule| command_line.contains(&rule.pattern))
            .map(ScriptRule::next)
            .unwrap_or_else(|| MockResponse::success(""))
    }

    /// Records an `abandon_run` call if the run future is dropped while held.
    fn abandon_guard(&self, config: &ContainerConfig) -> AbandonGuard<impl FnOnce()> {
        let calls = Arc::clone(&self.captured_calls);
        let call = CapturedCall {
            image: Some(config.full_image()),
            command: config.command.clone(),
            ..CapturedCall::method("abandon_run")
        };
        AbandonGuard::new(move || calls.write().push(call))
    }

    fn check_failure(&self) -> RunnerResult<()> {
        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRunner for MockRunner {
    async fn ensure_image(&self, image: &str, tag: &str) -> RunnerResult<()> {
        let full_image = format!("{}:{}", image, tag);
        if self.existing_images.read().contains(&full_image) {
            return Ok(());
        }
        self.record_call(CapturedCall {
            image: Some(full_image.clone()),
            ..CapturedCall::method("pull_image")
        });
        self.check_failure()?;
        self.existing_images.write().push(full_image);
        Ok(())
    }

    async fn run_container(
        &self,
        config: &ContainerConfig,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        self.record_call(CapturedCall {
            image: Some(config.full_image()),
            command: config.command.clone(),
            workdir: config.workdir.clone(),
            mounts: config
                .mounts
                .iter()
                .map(|m| format!("{}:{}", m.source.display(), m.target))
                .collect(),
            ..CapturedCall::method("run_container")
        });

        self.check_failure()?;

        let response = self.next_response(&config.command_line());
        if response.hold_ms > 0 {
            let guard = self.abandon_guard(config);
            tokio::time::sleep(Duration::from_millis(response.hold_ms)).await;
            guard.complete();
        }
        if response.timed_out {
            return Err(RunnerError::Timeout(run_config.timeout_seconds));
        }

        Ok(ExecutionResult {
            container_id: format!("mock-{}", uuid::Uuid::new_v4()),
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terraform(args: &[&str]) -> ContainerConfig {
        ContainerConfig::new("hashicorp/terraform")
            .tag("1.6")
            .args(args.iter().copied())
    }

    #[tokio::test]
    async fn test_unmatched_command_succeeds_empty() {
        let runner = MockRunner::new();

        let result = runner
            .run_container(&terraform(&["version"]), &RunConfig::default())
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_rule_serves_script_then_repeats_last() {
        let runner = MockRunner::new().on_command(
            "apply",
            vec![
                MockResponse::failure(1, "RequestError: send request failed"),
                MockResponse::success("Apply complete!"),
            ],
        );
        let config = terraform(&["apply", "-auto-approve"]);

        let r1 = runner.run_container(&config, &RunConfig::default()).await.unwrap();
        let r2 = runner.run_container(&config, &RunConfig::default()).await.unwrap();
        let r3 = runner.run_container(&config, &RunConfig::default()).await.unwrap();

        assert_eq!(r1.exit_code, 1);
        assert_eq!(r2.stdout, "Apply complete!");
        assert_eq!(r3.stdout, "Apply complete!");
        assert_eq!(runner.runs_matching("apply").len(), 3);
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let runner = MockRunner::new()
            .respond("output -json", MockResponse::success("{}"))
            .respond("output", MockResponse::failure(1, "unreachable"));

        let result = runner
            .run_container(&terraform(&["output", "-json"]), &RunConfig::default())
            .await
            .unwrap();

        assert_eq!(result.stdout, "{}");
    }

    #[tokio::test]
    async fn test_timeout_response() {
        let runner = MockRunner::new().respond("destroy", MockResponse::timeout());

        let err = runner
            .run_container(&terraform(&["destroy"]), &RunConfig::default().timeout(42))
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::Timeout(42)));
    }

    #[tokio::test]
    async fn test_failure_simulation() {
        let runner = MockRunner::new().simulate_failure("daemon gone");

        let result = runner
            .run_container(&terraform(&["init"]), &RunConfig::default())
            .await;

        assert!(matches!(result, Err(RunnerError::ExecutionFailed(_))));
    }

    #[tokio::test]
    async fn test_ensure_image_pulls_once() {
        let runner = MockRunner::new().add_existing_image("hashicorp/terraform:1.6");

        runner.ensure_image("hashicorp/terraform", "1.6").await.unwrap();
        assert!(!runner.was_called("pull_image"));

        runner.ensure_image("amazon/aws-cli", "latest").await.unwrap();
        runner.ensure_image("amazon/aws-cli", "latest").await.unwrap();
        assert_eq!(runner.call_count(), 1);
        assert_eq!(runner.get_calls()[0].image.as_deref(), Some("amazon/aws-cli:latest"));
    }

    #[tokio::test]
    async fn test_dropped_run_is_recorded() {
        let runner = MockRunner::new().respond("apply", MockResponse::success("done").held_for(60_000));
        let config = terraform(&["apply", "-auto-approve"]);
        let run_config = RunConfig::default();

        let run = runner.run_container(&config, &run_config);
        let outcome = tokio::time::timeout(Duration::from_millis(20), run).await;

        assert!(outcome.is_err());
        let abandoned: Vec<_> = runner
            .get_calls()
            .into_iter()
            .filter(|c| c.method == "abandon_run")
            .collect();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].command_line(), "apply -auto-approve");
    }

    #[tokio::test]
    async fn test_held_run_completes_without_abandoning() {
        let runner = MockRunner::new().respond("plan", MockResponse::success("No changes.").held_for(30));

        let result = runner
            .run_container(&terraform(&["plan"]), &RunConfig::default())
            .await
            .unwrap();

        assert_eq!(result.duration_ms, 30);
        assert!(!runner.was_called("abandon_run"));
    }
}
