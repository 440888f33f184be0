//! Test orchestration: provision, observe, assert, tear down.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use probe_cloud::{CloudError, ResourceStateProber};
use probe_iac::{OutputExtractor, StackHandle, StackLease, StackLifecycle, StackState};
use probe_spec::{CheckSpec, CheckTarget, ResourceKind, Suite, TestCase};

use crate::assertion::AssertionRunner;
use crate::report::{SuiteReport, Teardown, TestReport, Verdict};

/// Defaults for test cases that do not override them. Suite runs take these
/// from the suite instead.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub region: String,
    pub verify_teardown: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            verify_teardown: false,
        }
    }
}

/// A resource observed during a test, re-checked after teardown.
#[derive(Debug, Clone, PartialEq)]
struct Probed {
    kind: ResourceKind,
    region: String,
    id: String,
}

/// State accumulated while checks run.
#[derive(Default)]
struct Evaluation {
    assertions: AssertionRunner,
    errors: Vec<String>,
    harness_error: bool,
    probed: Vec<Probed>,
}

impl Evaluation {
    fn usage_error(&mut self, check: &CheckSpec, message: String) {
        self.assertions.fail(&check.name, check.expectation(), message.clone());
        self.errors.push(format!("check '{}': {}", check.name, message));
        self.harness_error = true;
    }

    fn remember(&mut self, probed: Probed) {
        if !self.probed.contains(&probed) {
            self.probed.push(probed);
        }
    }
}

/// Runs test cases against one lifecycle and one prober.
///
/// The orchestrator holds no per-test state, so clones can run tests
/// concurrently.
#[derive(Clone)]
pub struct TestOrchestrator {
    lifecycle: Arc<dyn StackLifecycle>,
    prober: ResourceStateProber,
    settings: OrchestratorSettings,
}

impl TestOrchestrator {
    pub fn new(lifecycle: Arc<dyn StackLifecycle>, prober: ResourceStateProber) -> Self {
        Self {
            lifecycle,
            prober,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.settings.region = region.into();
        self
    }

    pub fn with_verify_teardown(mut self, enabled: bool) -> Self {
        self.settings.verify_teardown = enabled;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one test case to completion.
    pub async fn run(&self, case: &TestCase) -> TestReport {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_with_cancel(case, cancel_rx).await
    }

    /// Run one test case, abandoning provisioning and checks once `cancel`
    /// turns true. Teardown always runs to completion.
    pub async fn run_with_cancel(
        &self,
        case: &TestCase,
        mut cancel: watch::Receiver<bool>,
    ) -> TestReport {
        let started = Instant::now();
        let mut report = TestReport::new(&case.name);
        info!("Running test '{}'", case.name);

        if *cancel.borrow() {
            report.verdict = Verdict::Cancelled;
            return report;
        }

        let acquired = tokio::select! {
            acquired = StackLease::acquire(Arc::clone(&self.lifecycle), &case.stack) => Some(acquired),
            _ = cancelled(&mut cancel) => None,
        };
        let lease = match acquired {
            None => {
                report.verdict = Verdict::Cancelled;
                report.duration_ms = started.elapsed().as_millis() as u64;
                return report;
            }
            Some(Err(e)) => {
                error!("Test '{}': init failed: {}", case.name, e);
                report.errors.push(format!("init: {}", e));
                report.verdict = Verdict::Failed;
                report.duration_ms = started.elapsed().as_millis() as u64;
                return report;
            }
            Some(Ok(lease)) => lease,
        };

        let handle = lease.handle().clone();
        report.namespace = handle.config().namespace_value().map(str::to_string);

        let mut eval = Evaluation::default();
        let mut was_cancelled = false;
        let mut apply_failed = false;

        let applied = tokio::select! {
            applied = self.lifecycle.apply(&handle) => Some(applied),
            _ = cancelled(&mut cancel) => None,
        };
        match applied {
            None => {
                warn!("Test '{}' cancelled during apply", case.name);
                // A partial apply may have created resources.
                handle.mark(StackState::ApplyFailed);
                was_cancelled = true;
            }
            Some(Err(e)) => {
                error!("Test '{}': apply failed: {}", case.name, e);
                eval.errors.push(format!("apply: {}", e));
                apply_failed = true;
            }
            Some(Ok(outputs)) => {
                debug!("Test '{}': {} outputs", case.name, outputs.len());
                let finished = tokio::select! {
                    _ = self.evaluate(case, &handle, &mut eval) => true,
                    _ = cancelled(&mut cancel) => false,
                };
                if !finished {
                    warn!("Test '{}' cancelled during checks", case.name);
                    was_cancelled = true;
                }
            }
        }

        let needed_teardown = handle.state().needs_teardown();
        let mut leaked = false;
        report.teardown = match lease.release().await {
            Ok(()) if needed_teardown => Teardown::Destroyed,
            Ok(()) => Teardown::Skipped,
            Err(e) => {
                error!("Test '{}': {}", case.name, e);
                eval.errors.push(format!("destroy: {}", e));
                leaked = true;
                Teardown::Failed
            }
        };

        let verify = case.verify_teardown.unwrap_or(self.settings.verify_teardown);
        if verify && report.teardown == Teardown::Destroyed {
            let probed = std::mem::take(&mut eval.probed);
            let remaining = self.verify_teardown(&probed, &mut eval).await;
            if remaining > 0 {
                report.teardown = Teardown::Leaked;
                leaked = true;
            }
        }

        report.verdict = if leaked {
            Verdict::Leaked
        } else if was_cancelled {
            Verdict::Cancelled
        } else if apply_failed {
            Verdict::Failed
        } else if eval.harness_error {
            Verdict::Errored
        } else if eval.assertions.verdict() {
            Verdict::Passed
        } else {
            Verdict::Failed
        };

        report.assertions = eval.assertions.into_results();
        report.errors = eval.errors;
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Test '{}' {} ({} checks, teardown {})",
            case.name,
            report.verdict,
            report.assertions.len(),
            report.teardown
        );
        report
    }

    /// Evaluate every declared check, in order, without stopping at failures.
    async fn evaluate(&self, case: &TestCase, handle: &StackHandle, eval: &mut Evaluation) {
        let extractor = OutputExtractor::new(Arc::clone(&self.lifecycle));
        let region = case.region.as_deref().unwrap_or(&self.settings.region);

        for check in &case.checks {
            match check.target() {
                Err(e) => eval.usage_error(check, e.to_string()),
                Ok(CheckTarget::Output(name)) => {
                    self.check_output(check, name, handle, &extractor, eval).await
                }
                Ok(CheckTarget::Resource(resource)) => {
                    let id = match (&resource.id, &resource.output) {
                        (Some(id), _) => id.clone(),
                        (None, Some(output)) => match extractor.output_string(handle, output).await {
                            Ok(id) => id,
                            Err(e) => {
                                eval.usage_error(check, e.to_string());
                                continue;
                            }
                        },
                        (None, None) => {
                            eval.usage_error(check, "resource has no 'output' or 'id'".to_string());
                            continue;
                        }
                    };
                    let region = resource.region.as_deref().unwrap_or(region);
                    self.check_resource(check, resource.kind, region, &id, eval)
                        .await;
                }
            }
        }
    }

    async fn check_output(
        &self,
        check: &CheckSpec,
        name: &str,
        handle: &StackHandle,
        extractor: &OutputExtractor,
        eval: &mut Evaluation,
    ) {
        match extractor.lookup(handle, name).await {
            Ok(found) => match &check.expect {
                Some(predicate) if found.sensitive => {
                    eval.assertions.check_sensitive(&check.name, &found.value, predicate);
                }
                Some(predicate) => {
                    eval.assertions.check(&check.name, &found.value, predicate);
                }
                None => {
                    eval.assertions
                        .pass(&check.name, "output exists", format!("output '{}' exists", name));
                }
            },
            Err(e) => eval.usage_error(check, e.to_string()),
        }
    }

    async fn check_resource(
        &self,
        check: &CheckSpec,
        kind: ResourceKind,
        region: &str,
        id: &str,
        eval: &mut Evaluation,
    ) {
        eval.remember(Probed {
            kind,
            region: region.to_string(),
            id: id.to_string(),
        });

        match self.prober.describe(kind, region, id).await {
            Ok(descriptor) if check.absent => {
                eval.assertions.fail(
                    &check.name,
                    check.expectation(),
                    format!("{} '{}' still exists", kind, descriptor.id()),
                );
            }
            Ok(descriptor) => match (&check.field, &check.expect) {
                (Some(path), Some(predicate)) => match descriptor.field(path) {
                    Some(value) => {
                        eval.assertions.check(&check.name, &value, predicate);
                    }
                    None => eval.usage_error(
                        check,
                        format!(
                            "{} has no field '{}' (fields: {})",
                            kind,
                            path,
                            descriptor.field_names().join(", ")
                        ),
                    ),
                },
                (None, Some(predicate)) => {
                    eval.assertions
                        .check(&check.name, &descriptor.to_value(), predicate);
                }
                (_, None) => {
                    eval.assertions.pass(
                        &check.name,
                        check.expectation(),
                        format!("{} '{}' exists", kind, id),
                    );
                }
            },
            Err(CloudError::NotFound { .. }) if check.absent => {
                eval.assertions.pass(
                    &check.name,
                    check.expectation(),
                    format!("{} '{}' is absent", kind, id),
                );
            }
            Err(e @ CloudError::NotFound { .. }) => {
                eval.assertions
                    .fail(&check.name, check.expectation(), e.to_string());
            }
            Err(e) => {
                warn!("Check '{}': {}", check.name, e);
                eval.assertions
                    .fail(&check.name, check.expectation(), e.to_string());
                eval.errors.push(format!("check '{}': {}", check.name, e));
                eval.harness_error = true;
            }
        }
    }

    /// Probe every observed resource again; returns how many still exist.
    async fn verify_teardown(&self, probed: &[Probed], eval: &mut Evaluation) -> usize {
        let mut remaining = 0;
        for resource in probed {
            match self
                .prober
                .describe(resource.kind, &resource.region, &resource.id)
                .await
            {
                Ok(_) => {
                    error!("{} '{}' survived teardown", resource.kind, resource.id);
                    eval.errors.push(format!(
                        "leak: {} '{}' still exists after destroy",
                        resource.kind, resource.id
                    ));
                    remaining += 1;
                }
                Err(CloudError::NotFound { .. }) => {
                    debug!("{} '{}' is gone", resource.kind, resource.id);
                }
                Err(e) => {
                    eval.errors.push(format!(
                        "could not verify teardown of {} '{}': {}",
                        resource.kind, resource.id, e
                    ));
                    eval.harness_error = true;
                }
            }
        }
        remaining
    }

    /// Run every test of `suite`, honoring its settings.
    pub async fn run_suite(&self, suite: &Suite) -> SuiteReport {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_suite_with_cancel(suite, cancel_rx).await
    }

    /// Run a suite with at most `suite.settings.concurrency` tests in flight.
    ///
    /// The suite's settings replace the orchestrator's own region and
    /// teardown verification for the whole run. Reports come back in
    /// declaration order whatever order tests finish in.
    pub async fn run_suite_with_cancel(
        &self,
        suite: &Suite,
        cancel: watch::Receiver<bool>,
    ) -> SuiteReport {
        let started_at = Utc::now();
        let orchestrator = self.clone().with_settings(OrchestratorSettings {
            region: suite.settings.region.clone(),
            verify_teardown: suite.settings.verify_teardown,
        });
        let concurrency = suite.settings.concurrency.max(1);

        info!(
            "Running suite '{}': {} tests, concurrency {}",
            suite.name,
            suite.tests.len(),
            concurrency
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        for (index, case) in suite.tests.iter().cloned().enumerate() {
            let orchestrator = orchestrator.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, orchestrator.run_with_cancel(&case, cancel).await)
            });
        }

        let mut slots: Vec<Option<TestReport>> = (0..suite.tests.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!("Test task failed: {}", e),
            }
        }

        let tests = slots
            .into_iter()
            .zip(&suite.tests)
            .map(|(slot, case)| {
                slot.unwrap_or_else(|| {
                    let mut report = TestReport::new(&case.name);
                    report.verdict = Verdict::Errored;
                    report.errors.push("test task panicked".to_string());
                    report
                })
            })
            .collect();

        SuiteReport::new(&suite.name, started_at, tests)
    }
}

/// Resolves once the cancel flag is set. Never resolves if the sender is
/// dropped without cancelling.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
