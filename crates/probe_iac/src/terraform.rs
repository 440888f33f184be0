//! Terraform lifecycle executed in containers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs_extra::dir::CopyOptions;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use probe_runner::{
    ContainerConfig, ContainerRunner, ExecutionResult, MountConfig, RetryPolicy, RunConfig,
    RunnerError, ToolImages,
};
use probe_spec::StackConfig;

use crate::error::{IacError, IacResult};
use crate::handle::{StackHandle, StackState};
use crate::lifecycle::StackLifecycle;
use crate::outputs::StackOutputs;

const CONTAINER_WORKDIR: &str = "/workspace";
const CONTAINER_AWS_DIR: &str = "/root/.aws";
/// Lines of tool output kept in error messages
const ERROR_TAIL_LINES: usize = 20;

/// Host variables forwarded to Terraform when set.
pub const DEFAULT_PASS_ENV: &[&str] = &[
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "AWS_PROFILE",
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
];

/// How Terraform containers are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerraformSettings {
    pub image: String,
    pub tag: String,
    /// Per-command container timeout
    pub timeout_seconds: u64,
    /// Host environment variables forwarded into the container
    pub pass_env: Vec<String>,
    /// Host credentials directory mounted read-only at `/root/.aws`
    pub aws_config_dir: Option<PathBuf>,
}

impl Default for TerraformSettings {
    fn default() -> Self {
        Self {
            image: ToolImages::TERRAFORM.to_string(),
            tag: ToolImages::TERRAFORM_TAG.to_string(),
            timeout_seconds: 1800,
            pass_env: DEFAULT_PASS_ENV.iter().map(|s| s.to_string()).collect(),
            aws_config_dir: None,
        }
    }
}

impl TerraformSettings {
    pub fn with_image(mut self, image: impl Into<String>, tag: impl Into<String>) -> Self {
        self.image = image.into();
        self.tag = tag.into();
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_aws_config(mut self, dir: impl Into<PathBuf>) -> Self {
        self.aws_config_dir = Some(dir.into());
        self
    }
}

/// Why a single Terraform command did not succeed.
#[derive(Debug)]
enum StepFailure {
    Exit(ExecutionResult),
    Runner(RunnerError),
}

impl StepFailure {
    fn matches_any(&self, patterns: &[Regex]) -> bool {
        match self {
            StepFailure::Exit(result) => {
                let output = result.combined_output();
                patterns.iter().any(|p| p.is_match(&output))
            }
            StepFailure::Runner(_) => false,
        }
    }

    fn is_timeout(&self) -> bool {
        matches!(self, StepFailure::Runner(e) if e.is_timeout())
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepFailure::Exit(result) => write!(
                f,
                "exit code {}: {}",
                result.exit_code,
                result.output_tail(ERROR_TAIL_LINES)
            ),
            StepFailure::Runner(e) => write!(f, "{}", e),
        }
    }
}

/// [`StackLifecycle`] backed by the Terraform CLI.
///
/// Each command runs in a fresh container with the working directory mounted
/// at `/workspace`. Variables are passed through a JSON var file so lists and
/// maps keep their types.
pub struct TerraformLifecycle {
    runner: Arc<dyn ContainerRunner>,
    settings: TerraformSettings,
    retry: RetryPolicy,
}

impl TerraformLifecycle {
    pub fn new(runner: Arc<dyn ContainerRunner>, settings: TerraformSettings) -> Self {
        Self {
            runner,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    /// Backoff curve for retried commands. The retry budget still comes
    /// from each stack's `max_retries`.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &TerraformSettings {
        &self.settings
    }

    fn policy_for(&self, handle: &StackHandle) -> RetryPolicy {
        RetryPolicy {
            max_retries: handle.config().options.max_retries,
            ..self.retry.clone()
        }
    }

    fn container(&self, handle: &StackHandle, args: &[String]) -> ContainerConfig {
        let options = &handle.config().options;

        let mut config = ContainerConfig::new(&self.settings.image)
            .tag(&self.settings.tag)
            .workdir(CONTAINER_WORKDIR)
            .mount(MountConfig::new(handle.workdir().to_path_buf(), CONTAINER_WORKDIR))
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .env_from_host(&self.settings.pass_env)
            .name_prefix(handle.id())
            .args(args.iter().cloned());

        if let Some(dir) = &self.settings.aws_config_dir {
            if dir.is_dir() {
                config = config.mount(MountConfig::new(dir.clone(), CONTAINER_AWS_DIR).read_only());
            }
        }
        for (key, value) in &options.env {
            config = config.env(key, value);
        }
        config
    }

    async fn exec(&self, handle: &StackHandle, args: &[String]) -> Result<ExecutionResult, RunnerError> {
        let timeout = handle
            .config()
            .options
            .timeout_seconds
            .unwrap_or(self.settings.timeout_seconds);
        // The image was pulled during init.
        let run_config = RunConfig::default().timeout(timeout).no_pull();

        debug!("{}: terraform {}", handle.id(), args.join(" "));
        self.runner
            .run_container(&self.container(handle, args), &run_config)
            .await
    }

    async fn run_step(&self, handle: &StackHandle, args: &[String]) -> Result<(), StepFailure> {
        let result = self.exec(handle, args).await.map_err(StepFailure::Runner)?;
        if result.success() {
            Ok(())
        } else {
            Err(StepFailure::Exit(result))
        }
    }

    fn args(&self, handle: &StackHandle, base: &[&str], with_vars: bool) -> Vec<String> {
        let mut args: Vec<String> = base.iter().map(|s| s.to_string()).collect();
        if with_vars {
            args.push(format!("-var-file={}", handle.var_file()));
        }
        if handle.config().options.no_color {
            args.push("-no-color".to_string());
        }
        args
    }

    fn write_var_file(&self, handle: &StackHandle) -> IacResult<()> {
        let path = handle.workdir().join(handle.var_file());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&handle.config().variables)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    fn remove_var_file(&self, handle: &StackHandle) {
        let path = handle.workdir().join(handle.var_file());
        if let Err(e) = std::fs::remove_file(&path) {
            debug!("Could not remove {:?}: {}", path, e);
        }
    }

    async fn check_idempotent(&self, handle: &StackHandle) -> IacResult<()> {
        let args = self.args(handle, &["plan", "-input=false", "-lock=true", "-detailed-exitcode"], true);
        let result = self.exec(handle, &args).await?;
        match result.exit_code {
            0 => {
                debug!("{}: follow-up plan is empty", handle.id());
                Ok(())
            }
            2 => Err(IacError::ApplyFailed(format!(
                "stack is not idempotent, plan after apply still reports changes:\n{}",
                result.output_tail(ERROR_TAIL_LINES)
            ))),
            code => Err(IacError::ApplyFailed(format!(
                "idempotence plan failed with exit code {}: {}",
                code,
                result.output_tail(ERROR_TAIL_LINES)
            ))),
        }
    }

    async fn read_outputs(&self, handle: &StackHandle) -> IacResult<StackOutputs> {
        let args = vec!["output".to_string(), "-json".to_string()];
        let result = self.exec(handle, &args).await?;
        if !result.success() {
            return Err(IacError::OutputFormat(format!(
                "terraform output exited with {}: {}",
                result.exit_code,
                result.output_tail(ERROR_TAIL_LINES)
            )));
        }
        StackOutputs::from_terraform_json(&result.stdout)
    }
}

fn copy_to_scratch(source: &Path) -> IacResult<tempfile::TempDir> {
    let scratch = tempfile::Builder::new().prefix("stackprobe-").tempdir()?;

    let mut options = CopyOptions::new();
    options.content_only = true;
    options.overwrite = true;
    fs_extra::dir::copy(source, scratch.path(), &options)
        .map_err(|e| IacError::Copy(format!("{:?} -> {:?}: {}", source, scratch.path(), e)))?;

    Ok(scratch)
}

fn compile_patterns(patterns: &[String]) -> IacResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p)
                .map_err(|e| IacError::InitFailed(format!("invalid retryable pattern '{}': {}", p, e)))
        })
        .collect()
}

#[async_trait]
impl StackLifecycle for TerraformLifecycle {
    async fn init(&self, config: &StackConfig) -> IacResult<StackHandle> {
        if !config.directory.is_dir() {
            return Err(IacError::InitFailed(format!(
                "stack directory {:?} does not exist",
                config.directory
            )));
        }

        let config = config.isolated();
        let retryable = compile_patterns(&config.options.retryable_errors)?;

        let (workdir, scratch) = if config.options.copy_to_temp {
            let scratch = copy_to_scratch(&config.directory)?;
            (scratch.path().to_path_buf(), Some(scratch))
        } else {
            (config.directory.clone(), None)
        };

        let handle = StackHandle::build(config, workdir, retryable, scratch);
        if let Some(namespace) = handle.config().namespace_value() {
            info!("Initializing stack {} (namespace {})", handle.id(), namespace);
        } else {
            info!("Initializing stack {}", handle.id());
        }

        self.runner
            .ensure_image(&self.settings.image, &self.settings.tag)
            .await?;
        self.write_var_file(&handle)?;

        let args = self.args(&handle, &["init", "-input=false"], false);
        let patterns = handle.retryable_patterns();
        let outcome = self
            .policy_for(&handle)
            .run(
                "terraform init",
                || self.run_step(&handle, &args),
                |failure| failure.matches_any(patterns),
            )
            .await;

        if let Err(e) = outcome {
            // No handle escapes, so nothing else would clean up the var file.
            self.remove_var_file(&handle);
            return Err(IacError::InitFailed(e.into_inner().to_string()));
        }
        Ok(handle)
    }

    async fn apply(&self, handle: &StackHandle) -> IacResult<StackOutputs> {
        if handle.state() == StackState::Destroyed {
            return Err(IacError::HandleDestroyed(handle.id().to_string()));
        }

        info!("Applying stack {}", handle.id());
        let args = self.args(
            handle,
            &["apply", "-input=false", "-auto-approve", "-lock=true"],
            true,
        );
        let patterns = handle.retryable_patterns();

        // Apply timeouts are hard failures: a half-finished apply is not safe to rerun blindly.
        let outcome = self
            .policy_for(handle)
            .run(
                "terraform apply",
                || self.run_step(handle, &args),
                |failure| failure.matches_any(patterns),
            )
            .await;

        match outcome {
            Ok(done) => {
                if done.retries > 0 {
                    info!("Stack {} applied after {} retries", handle.id(), done.retries);
                }
                handle.mark(StackState::Applied);
            }
            Err(e) => {
                handle.mark(StackState::ApplyFailed);
                return Err(IacError::ApplyFailed(e.into_inner().to_string()));
            }
        }

        if handle.config().options.check_idempotent {
            if let Err(e) = self.check_idempotent(handle).await {
                handle.mark(StackState::ApplyFailed);
                return Err(e);
            }
        }

        self.read_outputs(handle).await
    }

    async fn outputs(&self, handle: &StackHandle) -> IacResult<StackOutputs> {
        let state = handle.state();
        if state != StackState::Applied {
            return Err(IacError::NotApplied {
                handle: handle.id().to_string(),
                state: state.to_string(),
            });
        }
        self.read_outputs(handle).await
    }

    async fn destroy(&self, handle: &StackHandle) -> IacResult<()> {
        let state = handle.state();
        if !state.needs_teardown() {
            debug!("Stack {} is {}, nothing to destroy", handle.id(), state);
            if state == StackState::Initialized {
                self.remove_var_file(handle);
            }
            return Ok(());
        }

        info!("Destroying stack {}", handle.id());
        let args = self.args(
            handle,
            &["destroy", "-input=false", "-auto-approve", "-lock=true", "-lock-timeout=5m"],
            true,
        );
        let patterns = handle.retryable_patterns();

        let outcome = self
            .policy_for(handle)
            .run(
                "terraform destroy",
                || self.run_step(handle, &args),
                |failure| failure.is_timeout() || failure.matches_any(patterns),
            )
            .await;

        match outcome {
            Ok(_) => {
                handle.mark(StackState::Destroyed);
                self.remove_var_file(handle);
                info!("Stack {} destroyed", handle.id());
                Ok(())
            }
            Err(e) => {
                let failure = e.into_inner();
                warn!("Destroy of {} failed: {}", handle.id(), failure);
                Err(IacError::DestroyFailed(failure.to_string()))
            }
        }
    }
}
