//! # probe_runner
//!
//! Container execution layer for stackprobe.
//!
//! Terraform and the provider CLI never run on the host: every invocation is a
//! short-lived container started through a [`ContainerRunner`]. This crate also
//! owns [`RetryPolicy`], the bounded exponential backoff shared by the
//! lifecycle manager and the resource prober.
//!
//! # Features
//!
//! - **Docker API runner** backed by bollard
//! - **Mock runner** with command-matched scripted responses for tests
//! - **Retry policy** with capped exponential backoff
//!
//! # Example
//!
//! ```rust,no_run
//! use probe_runner::{ContainerConfig, ContainerRunner, DockerRunner, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = DockerRunner::new().await?;
//!
//!     let config = ContainerConfig::new("hashicorp/terraform")
//!         .tag("1.6")
//!         .args(["version"]);
//!
//!     let result = runner.run_container(&config, &RunConfig::default()).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

mod abandon;
pub mod config;
pub mod docker;
pub mod error;
pub mod mock;
pub mod retry;
pub mod runner;

pub use config::{ContainerConfig, MountConfig, RunConfig, ToolImages};
pub use docker::DockerRunner;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use retry::{Retried, RetryError, RetryPolicy};
pub use runner::{ContainerRunner, ExecutionResult};
