//! # probe_iac
//!
//! Stack lifecycle management for stackprobe.
//!
//! A stack moves through `init → apply → destroy` exactly once per test.
//! [`TerraformLifecycle`] drives Terraform inside containers, and
//! [`StackLease`] ties teardown to the scope that provisioned the stack.
//!
//! ## Features
//!
//! - Containerized `terraform init / apply / output / destroy`
//! - Typed variables written as a JSON var file
//! - Retry of known-transient Terraform failures
//! - Optional idempotence check after apply
//! - Output extraction with missing-output and usage errors kept distinct
//! - Scripted lifecycle for testing code that drives stacks
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use probe_iac::{OutputExtractor, StackLease, StackLifecycle, TerraformLifecycle, TerraformSettings};
//! use probe_runner::DockerRunner;
//! use probe_spec::StackConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = Arc::new(DockerRunner::new().await?);
//! let lifecycle = Arc::new(TerraformLifecycle::new(runner, TerraformSettings::default()));
//!
//! let config = StackConfig::new("playground/pizza-shop").var("environment", "test");
//! let lease = StackLease::acquire(lifecycle.clone(), &config).await?;
//! lifecycle.apply(lease.handle()).await?;
//!
//! let extractor = OutputExtractor::new(lifecycle.clone());
//! let bucket = extractor.output_string(lease.handle(), "s3_bucket_name").await?;
//! println!("bucket: {}", bucket);
//!
//! lease.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod mock;
pub mod outputs;
pub mod terraform;

pub use error::{IacError, IacResult};
pub use handle::{StackHandle, StackState};
pub use lifecycle::{StackLease, StackLifecycle};
pub use mock::ScriptedLifecycle;
pub use outputs::{OutputExtractor, OutputValue, StackOutputs};
pub use terraform::{TerraformLifecycle, TerraformSettings};
