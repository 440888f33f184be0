//! # probe_core
//!
//! Test orchestration for stackprobe.
//!
//! Each test case provisions its stack, reads outputs, probes live resources
//! and evaluates every check before tearing the stack down again. Teardown
//! runs on every path out of a test: passing, failing, errored or cancelled.
//!
//! ## Verdicts
//!
//! | Verdict     | Meaning                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `Passed`    | all checks passed and the stack was destroyed             |
//! | `Failed`    | a check failed, or init/apply of the stack failed         |
//! | `Errored`   | a check could not be evaluated (missing output, provider) |
//! | `Cancelled` | abandoned on request, teardown still ran                  |
//! | `Leaked`    | destroy failed or resources survived it                   |
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use probe_cloud::{MockProvider, ResourceStateProber};
//! use probe_core::TestOrchestrator;
//! use probe_iac::{ScriptedLifecycle, StackOutputs};
//! use probe_spec::{CheckSpec, Predicate, StackConfig, TestCase};
//!
//! # async fn run() {
//! let lifecycle = ScriptedLifecycle::new()
//!     .with_outputs(StackOutputs::new().with("s3_bucket_name", "t-abc"));
//! let prober = ResourceStateProber::new(Arc::new(MockProvider::new()));
//! let orchestrator = TestOrchestrator::new(Arc::new(lifecycle), prober);
//!
//! let case = TestCase::new("pizza-shop", StackConfig::new("playground/pizza-shop"))
//!     .check(CheckSpec::output("bucket named", "s3_bucket_name", Predicate::NotEmpty));
//!
//! let report = orchestrator.run(&case).await;
//! println!("{}", report.report());
//! # }
//! ```

pub mod assertion;
pub mod error;
pub mod orchestrator;
pub mod report;

pub use assertion::{AssertionResult, AssertionRunner, REDACTED};
pub use error::{CoreError, CoreResult};
pub use orchestrator::{OrchestratorSettings, TestOrchestrator};
pub use report::{SuiteReport, SuiteSummary, Teardown, TestReport, Verdict};
