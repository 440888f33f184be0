//! End-to-end orchestration tests against a scripted stack and provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use probe_cloud::{
    BucketDescriptor, InstanceDescriptor, MockOutcome, MockProvider, PublicAccessBlock,
    ResourceDescriptor, ResourceStateProber,
};
use probe_core::{Teardown, TestOrchestrator, Verdict, REDACTED};
use probe_iac::{ScriptedLifecycle, StackOutputs, TerraformLifecycle, TerraformSettings};
use probe_runner::{MockResponse, MockRunner, RetryPolicy};
use probe_spec::{
    CheckSpec, Predicate, ResourceKind, ResourceRef, StackConfig, Suite, TestCase, Value,
};

fn bucket(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::Bucket(BucketDescriptor {
        name: name.to_string(),
        encryption_enabled: false,
        public_access_block: PublicAccessBlock::default(),
    })
}

fn pizza_outputs() -> StackOutputs {
    StackOutputs::new()
        .with("s3_bucket_name", "t-abc")
        .with("instance_count", 3i64)
}

fn orchestrator(lifecycle: &ScriptedLifecycle, provider: &MockProvider) -> TestOrchestrator {
    let prober =
        ResourceStateProber::new(Arc::new(provider.clone())).with_retry(RetryPolicy::immediate(3));
    TestOrchestrator::new(Arc::new(lifecycle.clone()), prober)
}

fn pizza_case() -> TestCase {
    TestCase::new("pizza-shop", StackConfig::new("playground/pizza-shop"))
}

fn bucket_ref() -> ResourceRef {
    ResourceRef::from_output(ResourceKind::Bucket, "s3_bucket_name")
}

#[tokio::test]
async fn test_every_check_is_reported_in_order() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new().with_resource(bucket("t-abc"));

    let case = pizza_case()
        .check(CheckSpec::output("A", "s3_bucket_name", Predicate::NotEmpty))
        .check(CheckSpec::output("B", "instance_count", Predicate::between(5.0, 10.0)))
        .check(CheckSpec::resource(
            "C",
            bucket_ref(),
            "public_access_block.block_public_acls",
            Predicate::equals(false),
        ));

    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    let outcomes: Vec<_> = report
        .assertions
        .iter()
        .map(|a| (a.name.as_str(), a.passed))
        .collect();
    assert_eq!(outcomes, vec![("A", true), ("B", false), ("C", true)]);
    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(report.teardown, Teardown::Destroyed);
    assert!(report.errors.is_empty());
    assert_eq!(lifecycle.count("destroy"), 1);
}

#[tokio::test]
async fn test_bucket_probe_passes() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new().with_resource(bucket("t-abc"));

    let case = pizza_case()
        .check(CheckSpec::resource(
            "public ACLs allowed",
            bucket_ref(),
            "public_access_block.block_public_acls",
            Predicate::equals(false),
        ))
        .check(CheckSpec::exists("bucket exists", bucket_ref()));

    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Passed, "{}", report.report());
    assert_eq!(provider.calls_for("t-abc"), 2);
    assert_eq!(provider.calls()[0].region, "us-west-2");
}

#[tokio::test]
async fn test_apply_failure_still_destroys() {
    let lifecycle = ScriptedLifecycle::new().fail_apply("Error creating S3 bucket: BucketAlreadyExists");
    let provider = MockProvider::new();

    let case = pizza_case().check(CheckSpec::output("A", "s3_bucket_name", Predicate::NotEmpty));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert!(report.assertions.is_empty());
    assert!(report.errors[0].contains("BucketAlreadyExists"));
    assert_eq!(report.teardown, Teardown::Destroyed);
    assert_eq!(lifecycle.calls(), vec!["init", "apply", "destroy"]);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_init_failure_needs_no_teardown() {
    let lifecycle = ScriptedLifecycle::new().fail_init("Module not installed");
    let provider = MockProvider::new();

    let report = orchestrator(&lifecycle, &provider).run(&pizza_case()).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(report.teardown, Teardown::Skipped);
    assert_eq!(lifecycle.calls(), vec!["init"]);
}

#[tokio::test]
async fn test_missing_output_is_an_error_not_a_crash() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new();

    let case = pizza_case()
        .check(CheckSpec::output("typo", "s3_bucket_nmae", Predicate::NotEmpty))
        .check(CheckSpec::output("count", "instance_count", Predicate::equals(3i64)));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Errored);
    assert!(!report.assertions[0].passed);
    assert!(report.assertions[1].passed);
    assert!(report.errors[0].contains("s3_bucket_nmae"));
    assert!(report.errors[0].contains("s3_bucket_name"));
    assert_eq!(report.teardown, Teardown::Destroyed);
}

#[tokio::test]
async fn test_absence_check() {
    let lifecycle = ScriptedLifecycle::new();
    let provider = MockProvider::new();

    let case = pizza_case().check(CheckSpec::absent(
        "old instance gone",
        ResourceRef::with_id(ResourceKind::Instance, "i-0abc"),
    ));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Passed);
    assert!(report.assertions[0].message.contains("absent"));
}

#[tokio::test]
async fn test_absence_check_fails_when_resource_exists() {
    let lifecycle = ScriptedLifecycle::new();
    let provider = MockProvider::new().with_resource(ResourceDescriptor::Instance(
        InstanceDescriptor {
            id: "i-0abc".to_string(),
            state: "running".to_string(),
            instance_type: "t3.micro".to_string(),
        },
    ));

    let case = pizza_case().check(CheckSpec::absent(
        "old instance gone",
        ResourceRef::with_id(ResourceKind::Instance, "i-0abc"),
    ));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_missing_resource_fails_without_error() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new();

    let case = pizza_case().check(CheckSpec::exists("bucket exists", bucket_ref()));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_unknown_field_lists_available_fields() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new().with_resource(bucket("t-abc"));

    let case = pizza_case().check(CheckSpec::resource(
        "typo",
        bucket_ref(),
        "versioning",
        Predicate::equals(true),
    ));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Errored);
    assert!(report.errors[0].contains("encryption_enabled"));
}

#[tokio::test]
async fn test_transient_provider_errors_are_retried() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new().script(
        "t-abc",
        vec![
            MockOutcome::Transient("Throttling: Rate exceeded".into()),
            MockOutcome::Transient("Throttling: Rate exceeded".into()),
            MockOutcome::Found(bucket("t-abc")),
        ],
    );

    let case = pizza_case().check(CheckSpec::exists("bucket exists", bucket_ref()));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Passed);
    assert_eq!(provider.calls_for("t-abc"), 3);
}

#[tokio::test]
async fn test_provider_error_is_errored() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new().script(
        "t-abc",
        vec![MockOutcome::Provider("AccessDenied".into())],
    );

    let case = pizza_case().check(CheckSpec::exists("bucket exists", bucket_ref()));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Errored);
    assert_eq!(provider.calls_for("t-abc"), 1);
    assert_eq!(lifecycle.count("destroy"), 1);
}

#[tokio::test]
async fn test_destroy_failure_is_leaked() {
    let lifecycle = ScriptedLifecycle::new()
        .with_outputs(pizza_outputs())
        .fail_destroy("DependencyViolation");
    let provider = MockProvider::new();

    let case = pizza_case().check(CheckSpec::output("A", "s3_bucket_name", Predicate::NotEmpty));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Leaked);
    assert_eq!(report.teardown, Teardown::Failed);
    assert!(report.errors.iter().any(|e| e.contains("DependencyViolation")));
}

#[tokio::test]
async fn test_verify_teardown_detects_survivors() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new().with_resource(bucket("t-abc"));

    let case = pizza_case().check(CheckSpec::exists("bucket exists", bucket_ref()));
    let report = orchestrator(&lifecycle, &provider)
        .with_verify_teardown(true)
        .run(&case)
        .await;

    assert_eq!(report.verdict, Verdict::Leaked);
    assert_eq!(report.teardown, Teardown::Leaked);
    assert!(report.errors.iter().any(|e| e.contains("t-abc")));
}

#[tokio::test]
async fn test_verify_teardown_passes_when_resources_are_gone() {
    let provider = MockProvider::new().with_resource(bucket("t-abc"));
    let cleared = provider.clone();
    let lifecycle = ScriptedLifecycle::new()
        .with_outputs(pizza_outputs())
        .on_destroy(move || cleared.clear());

    let case = pizza_case()
        .verify_teardown(true)
        .check(CheckSpec::exists("bucket exists", bucket_ref()));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    assert_eq!(report.verdict, Verdict::Passed, "{}", report.report());
    assert_eq!(report.teardown, Teardown::Destroyed);
    assert_eq!(provider.calls_for("t-abc"), 2);
}

#[tokio::test]
async fn test_sensitive_outputs_are_redacted() {
    let mut outputs = StackOutputs::new().with("db_password", "hunter2");
    outputs.mark_sensitive("db_password");
    let lifecycle = ScriptedLifecycle::new().with_outputs(outputs);
    let provider = MockProvider::new();

    let case = pizza_case().check(CheckSpec::output(
        "password",
        "db_password",
        Predicate::equals("nope"),
    ));
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    let result = &report.assertions[0];
    assert!(!result.passed);
    assert!(!result.message.contains("hunter2"));
    assert!(!report.report().contains("hunter2"));
    assert_eq!(result.actual, Some(Value::from(REDACTED)));
}

#[tokio::test]
async fn test_namespace_is_reported() {
    let lifecycle = ScriptedLifecycle::new();
    let provider = MockProvider::new();

    let case = TestCase::new(
        "isolated",
        StackConfig::new("playground/pizza-shop").with_namespace("bucket_prefix", "pizza"),
    );
    let report = orchestrator(&lifecycle, &provider).run(&case).await;

    let namespace = report.namespace.expect("namespace recorded");
    assert!(namespace.starts_with("pizza-"));
}

#[tokio::test]
async fn test_cancel_during_apply_still_destroys() {
    let lifecycle = ScriptedLifecycle::new()
        .with_outputs(pizza_outputs())
        .apply_delay(Duration::from_secs(30));
    let provider = MockProvider::new();
    let orchestrator = orchestrator(&lifecycle, &provider);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let case = pizza_case().check(CheckSpec::output("A", "s3_bucket_name", Predicate::NotEmpty));
    let run = tokio::spawn(async move { orchestrator.run_with_cancel(&case, cancel_rx).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_tx.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancel honored promptly")
        .unwrap();

    assert_eq!(report.verdict, Verdict::Cancelled);
    assert_eq!(report.teardown, Teardown::Destroyed);
    assert!(report.assertions.is_empty());
    assert_eq!(lifecycle.calls(), vec!["init", "apply", "destroy"]);
}

#[tokio::test]
async fn test_cancel_before_start_provisions_nothing() {
    let lifecycle = ScriptedLifecycle::new();
    let provider = MockProvider::new();

    let (_cancel_tx, cancel_rx) = watch::channel(true);
    let report = orchestrator(&lifecycle, &provider)
        .run_with_cancel(&pizza_case(), cancel_rx)
        .await;

    assert_eq!(report.verdict, Verdict::Cancelled);
    assert!(lifecycle.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_during_checks_keeps_finished_assertions() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new()
        .with_resource(bucket("t-abc"))
        .slow("t-abc", Duration::from_secs(30));
    let orchestrator = orchestrator(&lifecycle, &provider);

    let case = pizza_case()
        .check(CheckSpec::output("A", "s3_bucket_name", Predicate::NotEmpty))
        .check(CheckSpec::resource(
            "B",
            bucket_ref(),
            "public_access_block.block_public_acls",
            Predicate::equals(false),
        ))
        .check(CheckSpec::output("C", "instance_count", Predicate::NotEmpty));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let run = tokio::spawn(async move { orchestrator.run_with_cancel(&case, cancel_rx).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_tx.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancel honored promptly")
        .unwrap();

    assert_eq!(report.verdict, Verdict::Cancelled);
    assert_eq!(report.teardown, Teardown::Destroyed);
    assert_eq!(lifecycle.count("destroy"), 1);
    let names: Vec<_> = report.assertions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["A"]);
    assert_eq!(provider.calls_for("t-abc"), 1);
}

#[tokio::test]
async fn test_cancel_removes_the_running_apply_container() {
    let dir = tempfile::tempdir().unwrap();
    let runner = MockRunner::new().respond(
        "apply",
        MockResponse::success("Apply complete!").held_for(60_000),
    );
    let lifecycle = TerraformLifecycle::new(Arc::new(runner.clone()), TerraformSettings::default());
    let prober = ResourceStateProber::new(Arc::new(MockProvider::new()));
    let orchestrator = TestOrchestrator::new(Arc::new(lifecycle), prober);

    let case = TestCase::new("pizza-shop", StackConfig::new(dir.path()));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let run = tokio::spawn(async move { orchestrator.run_with_cancel(&case, cancel_rx).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_tx.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancel honored promptly")
        .unwrap();

    assert_eq!(report.verdict, Verdict::Cancelled);
    assert_eq!(report.teardown, Teardown::Destroyed);

    let steps: Vec<String> = runner
        .get_calls()
        .iter()
        .filter(|c| c.method != "pull_image")
        .map(|c| format!("{} {}", c.method, c.command.first().cloned().unwrap_or_default()))
        .collect();
    assert_eq!(
        steps,
        vec![
            "run_container init",
            "run_container apply",
            "abandon_run apply",
            "run_container destroy",
        ]
    );
}

#[tokio::test]
async fn test_suite_keeps_declaration_order_under_concurrency() {
    let lifecycle = ScriptedLifecycle::new()
        .with_outputs(pizza_outputs())
        .apply_delay(Duration::from_millis(20));
    let provider = MockProvider::new();

    let mut suite = Suite::new("playground");
    suite.settings.concurrency = 3;
    for (name, min) in [("first", 0.0), ("second", 5.0), ("third", 0.0), ("fourth", 0.0)] {
        suite = suite.test(
            TestCase::new(name, StackConfig::new("playground/pizza-shop")).check(
                CheckSpec::output("count", "instance_count", Predicate::between(min, 10.0)),
            ),
        );
    }

    let report = orchestrator(&lifecycle, &provider).run_suite(&suite).await;

    let names: Vec<_> = report.tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third", "fourth"]);
    assert_eq!(report.get("second").unwrap().verdict, Verdict::Failed);
    assert_eq!(report.summary.passed, 3);
    assert_eq!(report.verdict(), Verdict::Failed);
    assert_eq!(lifecycle.count("destroy"), 4);
}

#[tokio::test]
async fn test_suite_region_applies_to_probes() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new().with_resource(bucket("t-abc"));

    let mut suite = Suite::new("eu").test(
        pizza_case().check(CheckSpec::exists("bucket exists", bucket_ref())),
    );
    suite.settings.region = "eu-west-1".to_string();

    let report = orchestrator(&lifecycle, &provider).run_suite(&suite).await;

    assert!(report.passed());
    assert_eq!(provider.calls()[0].region, "eu-west-1");
}

#[tokio::test]
async fn test_suite_settings_replace_orchestrator_settings() {
    let lifecycle = ScriptedLifecycle::new().with_outputs(pizza_outputs());
    let provider = MockProvider::new().with_resource(bucket("t-abc"));

    let mut suite = Suite::new("eu").test(
        pizza_case().check(CheckSpec::exists("bucket exists", bucket_ref())),
    );
    suite.settings.region = "eu-west-1".to_string();
    suite.settings.verify_teardown = false;

    let report = orchestrator(&lifecycle, &provider)
        .with_region("ap-south-1")
        .with_verify_teardown(true)
        .run_suite(&suite)
        .await;

    // The bucket outlives teardown here, so verification would report a leak.
    assert!(report.passed());
    assert_eq!(provider.call_count(), 1);
    assert_eq!(provider.calls()[0].region, "eu-west-1");
}
