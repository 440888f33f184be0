//! Run command - Provision, probe and tear down every test in a suite.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::watch;
use tracing::{info, warn};

use probe_cloud::{AwsCliApi, AwsCliSettings, ResourceStateProber};
use probe_core::{SuiteReport, TestOrchestrator, Verdict};
use probe_iac::{TerraformLifecycle, TerraformSettings};
use probe_runner::{ContainerRunner, DockerRunner};
use probe_spec::{Settings, Suite, SuiteReader, SuiteValidator};

use super::OutputFormat;
use crate::ExitCodes;

#[derive(Args)]
pub struct RunArgs {
    /// Suite file to run
    pub suite: PathBuf,

    /// Only run tests whose name matches this glob, or that carry it as a tag
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Report format (text, json)
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Tests allowed to run at once
    #[arg(short, long, env = "STACKPROBE_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Default region for resource probes
    #[arg(long, env = "STACKPROBE_REGION")]
    pub region: Option<String>,

    /// Re-probe observed resources after destroy
    #[arg(long)]
    pub verify_teardown: bool,

    /// Docker daemon to use instead of the local default
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,
}

pub async fn execute(args: RunArgs) -> Result<u8> {
    info!("Loading suite from {:?}", args.suite);

    let suite = SuiteReader::read(&args.suite)
        .with_context(|| format!("Failed to load suite {:?}", args.suite))?;
    let suite = apply_overrides(suite, &args)?;

    if suite.tests.is_empty() {
        eprintln!("⚠️  No tests selected in suite '{}'", suite.name);
        return Ok(ExitCodes::INVALID_ARGS);
    }

    let validation = SuiteValidator::validate(&suite);
    for warning in &validation.warnings {
        eprintln!("⚠️  {}", warning);
    }
    if !validation.valid {
        eprintln!("❌ Suite '{}' is invalid:", suite.name);
        for error in &validation.errors {
            eprintln!("   - {}", error);
        }
        return Ok(ExitCodes::INVALID_ARGS);
    }

    let runner: Arc<dyn ContainerRunner> = match args.docker_host.as_deref() {
        Some(host) if host.starts_with("http") || host.starts_with("tcp") => Arc::new(
            DockerRunner::with_host(host)
                .await
                .with_context(|| format!("Failed to connect to Docker at {}", host))?,
        ),
        _ => Arc::new(
            DockerRunner::new()
                .await
                .context("Docker is required to run terraform and the AWS CLI")?,
        ),
    };

    let aws_dir = aws_config_dir();
    let lifecycle = TerraformLifecycle::new(
        Arc::clone(&runner),
        terraform_settings(&suite.settings, aws_dir.as_deref()),
    )
    .with_retry(suite.settings.retry.clone());
    let api = AwsCliApi::new(runner, aws_settings(&suite.settings, aws_dir.as_deref()));
    let prober = ResourceStateProber::new(Arc::new(api)).with_retry(suite.settings.retry.clone());
    let orchestrator = TestOrchestrator::new(Arc::new(lifecycle), prober);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; tearing down provisioned stacks before exiting");
            let _ = cancel_tx.send(true);
        }
    });

    let report = orchestrator.run_suite_with_cancel(&suite, cancel_rx).await;

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => println!("{}", report.report()),
    }
    if let Some(path) = &args.output {
        write_report(&report, path)?;
    }

    Ok(exit_code(report.verdict()))
}

/// Apply command-line settings on top of the suite file.
fn apply_overrides(mut suite: Suite, args: &RunArgs) -> Result<Suite> {
    if let Some(concurrency) = args.concurrency {
        suite.settings.concurrency = concurrency;
    }
    if let Some(region) = &args.region {
        suite.settings.region = region.clone();
    }
    if args.verify_teardown {
        suite.settings.verify_teardown = true;
    }
    if let Some(filter) = &args.filter {
        let pattern = glob::Pattern::new(filter)
            .with_context(|| format!("Invalid filter pattern '{}'", filter))?;
        suite = suite.filtered(&pattern);
    }
    Ok(suite)
}

fn exit_code(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Passed => ExitCodes::SUCCESS,
        Verdict::Leaked => ExitCodes::LEAK_DETECTED,
        Verdict::Failed | Verdict::Errored | Verdict::Cancelled => ExitCodes::TEST_FAILURE,
    }
}

fn write_report(report: &SuiteReport, path: &Path) -> Result<()> {
    let json = report.to_json()?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
    info!("Wrote JSON report to {:?}", path);
    Ok(())
}

/// `~/.aws`, when it exists, for shared credentials and profiles.
fn aws_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".aws"))
        .filter(|dir| dir.is_dir())
}

fn terraform_settings(settings: &Settings, aws_dir: Option<&Path>) -> TerraformSettings {
    let defaults = TerraformSettings::default();
    let tool = &settings.terraform;
    let mut terraform = TerraformSettings::default()
        .with_image(tool.image_or(&defaults.image), tool.tag_or(&defaults.tag))
        .timeout(tool.timeout_seconds.unwrap_or(defaults.timeout_seconds));
    if let Some(dir) = aws_dir {
        terraform = terraform.with_aws_config(dir);
    }
    terraform
}

fn aws_settings(settings: &Settings, aws_dir: Option<&Path>) -> AwsCliSettings {
    let defaults = AwsCliSettings::default();
    let tool = &settings.aws_cli;
    let mut aws = AwsCliSettings::default()
        .with_image(tool.image_or(&defaults.image), tool.tag_or(&defaults.tag))
        .timeout(tool.timeout_seconds.unwrap_or(defaults.timeout_seconds));
    if let Some(dir) = aws_dir {
        aws = aws.with_aws_config(dir);
    }
    aws
}
