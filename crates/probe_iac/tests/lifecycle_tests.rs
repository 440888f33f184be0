//! Integration tests for the Terraform lifecycle.
//!
//! Terraform is scripted through the mock runner, so no Docker daemon or
//! cloud account is needed.

use std::sync::Arc;
use std::time::Duration;

use probe_iac::{
    IacError, OutputExtractor, StackLease, StackLifecycle, StackState, TerraformLifecycle,
    TerraformSettings,
};
use probe_runner::{MockResponse, MockRunner, RetryPolicy};
use probe_spec::{StackConfig, Value};
use tempfile::{tempdir, TempDir};

const OUTPUTS: &str = r#"{
  "s3_bucket_name": {"sensitive": false, "type": "string", "value": "test-pizza-shop-a1b2c3"},
  "website_url": {"sensitive": false, "type": "string", "value": "http://test-pizza-shop-a1b2c3.s3-website-us-west-2.amazonaws.com"},
  "api_token": {"sensitive": true, "type": "string", "value": "s3cr3t"}
}"#;

fn stack() -> (TempDir, StackConfig) {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("main.tf"), "# pizza shop").unwrap();
    let config = StackConfig::new(dir.path())
        .var("project_name", "test-pizza-shop")
        .var("environment", "test");
    (dir, config)
}

fn lifecycle(runner: &MockRunner) -> Arc<TerraformLifecycle> {
    Arc::new(
        TerraformLifecycle::new(Arc::new(runner.clone()), TerraformSettings::default())
            .with_retry(RetryPolicy::immediate(0)),
    )
}

fn healthy_runner() -> MockRunner {
    MockRunner::new()
        .respond("init", MockResponse::success("Terraform has been successfully initialized!"))
        .respond("apply", MockResponse::success("Apply complete! Resources: 4 added"))
        .respond("output -json", MockResponse::success(OUTPUTS))
        .respond("destroy", MockResponse::success("Destroy complete! Resources: 4 destroyed"))
}

#[tokio::test]
async fn test_full_lifecycle() {
    let (_dir, config) = stack();
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    assert_eq!(handle.state(), StackState::Initialized);

    let outputs = lifecycle.apply(&handle).await.unwrap();
    assert_eq!(handle.state(), StackState::Applied);
    assert_eq!(
        outputs.get("s3_bucket_name").unwrap(),
        &Value::from("test-pizza-shop-a1b2c3")
    );
    assert!(outputs.is_sensitive("api_token"));

    lifecycle.destroy(&handle).await.unwrap();
    assert_eq!(handle.state(), StackState::Destroyed);

    let calls = runner.get_calls();
    assert_eq!(calls[0].method, "pull_image");
    let order: Vec<String> = calls
        .iter()
        .filter(|c| c.method == "run_container")
        .map(|c| c.command.first().cloned().unwrap_or_default())
        .collect();
    assert_eq!(order, vec!["init", "apply", "output", "destroy"]);
}

#[tokio::test]
async fn test_reapply_is_idempotent() {
    let (_dir, config) = stack();
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    let first = lifecycle.apply(&handle).await.unwrap();
    let second = lifecycle.apply(&handle).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(handle.state(), StackState::Applied);
}

#[tokio::test]
async fn test_destroy_without_apply_is_noop() {
    let (dir, config) = stack();
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    lifecycle.destroy(&handle).await.unwrap();

    assert!(runner.runs_matching("destroy").is_empty());
    assert_eq!(handle.state(), StackState::Initialized);
    assert!(!dir.path().join(handle.var_file()).exists());
}

#[tokio::test]
async fn test_second_destroy_is_noop() {
    let (_dir, config) = stack();
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    lifecycle.apply(&handle).await.unwrap();
    lifecycle.destroy(&handle).await.unwrap();
    lifecycle.destroy(&handle).await.unwrap();

    assert_eq!(runner.runs_matching("destroy").len(), 1);
}

#[tokio::test]
async fn test_apply_after_destroy_is_rejected() {
    let (_dir, config) = stack();
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    lifecycle.apply(&handle).await.unwrap();
    lifecycle.destroy(&handle).await.unwrap();

    let err = lifecycle.apply(&handle).await.unwrap_err();
    assert!(matches!(err, IacError::HandleDestroyed(_)));
}

#[tokio::test]
async fn test_failed_apply_still_needs_destroy() {
    let (_dir, config) = stack();
    let runner = MockRunner::new()
        .respond("apply", MockResponse::failure(1, "Error: creating S3 Bucket: BucketAlreadyExists"))
        .respond("destroy", MockResponse::success("Destroy complete!"));
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    let err = lifecycle.apply(&handle).await.unwrap_err();

    assert!(matches!(err, IacError::ApplyFailed(ref m) if m.contains("BucketAlreadyExists")));
    assert_eq!(handle.state(), StackState::ApplyFailed);
    // Not a retryable pattern: one attempt only.
    assert_eq!(runner.runs_matching("apply").len(), 1);

    lifecycle.destroy(&handle).await.unwrap();
    assert_eq!(runner.runs_matching("destroy").len(), 1);
    assert_eq!(handle.state(), StackState::Destroyed);
}

#[tokio::test]
async fn test_transient_apply_error_is_retried() {
    let (_dir, config) = stack();
    let runner = MockRunner::new()
        .on_command(
            "apply",
            vec![
                MockResponse::failure(1, "Error: RequestError: send request failed"),
                MockResponse::success("Apply complete!"),
            ],
        )
        .respond("output -json", MockResponse::success(OUTPUTS));
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    lifecycle.apply(&handle).await.unwrap();

    assert_eq!(runner.runs_matching("apply").len(), 2);
    assert_eq!(handle.state(), StackState::Applied);
}

#[tokio::test]
async fn test_apply_timeout_is_not_retried() {
    let (_dir, config) = stack();
    let runner = MockRunner::new().respond("apply", MockResponse::timeout());
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    let err = lifecycle.apply(&handle).await.unwrap_err();

    assert!(matches!(err, IacError::ApplyFailed(_)));
    assert_eq!(runner.runs_matching("apply").len(), 1);
    assert_eq!(handle.state(), StackState::ApplyFailed);
}

#[tokio::test]
async fn test_destroy_timeout_is_retried() {
    let (_dir, config) = stack();
    let runner = MockRunner::new()
        .respond("apply", MockResponse::success("Apply complete!"))
        .respond("output -json", MockResponse::success(OUTPUTS))
        .on_command(
            "destroy",
            vec![MockResponse::timeout(), MockResponse::success("Destroy complete!")],
        );
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    lifecycle.apply(&handle).await.unwrap();
    lifecycle.destroy(&handle).await.unwrap();

    assert_eq!(runner.runs_matching("destroy").len(), 2);
    assert_eq!(handle.state(), StackState::Destroyed);
}

#[tokio::test]
async fn test_destroy_failure_reports_leak() {
    let (_dir, mut config) = stack();
    config.options.max_retries = 1;
    let runner = MockRunner::new()
        .respond("output -json", MockResponse::success(OUTPUTS))
        .respond("destroy", MockResponse::timeout());
    let lifecycle = lifecycle(&runner);

    let handle = lifecycle.init(&config).await.unwrap();
    lifecycle.apply(&handle).await.unwrap();
    let err = lifecycle.destroy(&handle).await.unwrap_err();

    assert!(matches!(err, IacError::DestroyFailed(_)));
    assert_eq!(runner.runs_matching("destroy").len(), 2);
    assert_eq!(handle.state(), StackState::Applied);
}

#[tokio::test]
async fn test_extractor_distinguishes_missing_from_unapplied() {
    let (_dir, config) = stack();
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);
    let extractor = OutputExtractor::new(lifecycle.clone());

    let handle = lifecycle.init(&config).await.unwrap();
    let err = extractor.output(&handle, "s3_bucket_name").await.unwrap_err();
    assert!(matches!(err, IacError::NotApplied { .. }));

    lifecycle.apply(&handle).await.unwrap();

    let bucket = extractor.output_string(&handle, "s3_bucket_name").await.unwrap();
    assert_eq!(bucket, "test-pizza-shop-a1b2c3");

    let token = extractor.lookup(&handle, "api_token").await.unwrap();
    assert!(token.sensitive);

    match extractor.output(&handle, "subnet_ids").await {
        Err(IacError::MissingOutput { name, available }) => {
            assert_eq!(name, "subnet_ids");
            assert!(available.contains(&"website_url".to_string()));
        }
        other => panic!("expected MissingOutput, got {:?}", other),
    }

    let err = extractor.output_list(&handle, "website_url").await.unwrap_err();
    assert!(matches!(err, IacError::OutputType { expected: "list", .. }));
    assert!(err.is_usage_error());
}

#[tokio::test]
async fn test_namespace_isolates_concurrent_handles() {
    let (_dir, config) = stack();
    let config = config.with_namespace("project_name", "test-pizza-shop");
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);

    let a = lifecycle.init(&config).await.unwrap();
    let b = lifecycle.init(&config).await.unwrap();

    assert_ne!(a.config().namespace_value(), b.config().namespace_value());
    assert_ne!(a.var_file(), b.var_file());
}

#[tokio::test]
async fn test_lease_release_destroys_once() {
    let (_dir, config) = stack();
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);

    let lease = StackLease::acquire(lifecycle.clone(), &config).await.unwrap();
    lifecycle.apply(lease.handle()).await.unwrap();
    let handle = lease.handle().clone();

    lease.release().await.unwrap();

    assert_eq!(handle.state(), StackState::Destroyed);
    assert_eq!(runner.runs_matching("destroy").len(), 1);
}

#[tokio::test]
async fn test_dropped_lease_schedules_destroy() {
    let (_dir, config) = stack();
    let runner = healthy_runner();
    let lifecycle = lifecycle(&runner);

    let lease = StackLease::acquire(lifecycle.clone(), &config).await.unwrap();
    lifecycle.apply(lease.handle()).await.unwrap();
    let handle = lease.handle().clone();
    drop(lease);

    for _ in 0..50 {
        if handle.state() == StackState::Destroyed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(handle.state(), StackState::Destroyed);
    assert_eq!(runner.runs_matching("destroy").len(), 1);
}
