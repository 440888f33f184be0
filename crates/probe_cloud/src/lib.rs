//! # probe_cloud
//!
//! Live resource probing for stackprobe.
//!
//! [`ResourceStateProber`] asks the provider's control plane what a resource
//! looks like right now and returns a [`ResourceDescriptor`]. Throttling and
//! connectivity errors are retried with backoff; a missing resource is
//! reported as [`CloudError::NotFound`] straight away.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use probe_cloud::{AwsCliApi, AwsCliSettings, ResourceStateProber};
//! use probe_runner::DockerRunner;
//! use probe_spec::ResourceKind;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = Arc::new(DockerRunner::new().await?);
//! let api = Arc::new(AwsCliApi::new(runner, AwsCliSettings::default()));
//! let prober = ResourceStateProber::new(api);
//!
//! let bucket = prober.describe(ResourceKind::Bucket, "us-west-2", "t-abc").await?;
//! println!("{:?}", bucket.field("public_access_block.block_public_acls"));
//! # Ok(())
//! # }
//! ```

pub mod aws;
pub mod descriptor;
pub mod error;
pub mod mock;
pub mod prober;
pub mod provider;

pub use aws::{AwsCliApi, AwsCliSettings};
pub use descriptor::{
    BucketDescriptor, InstanceDescriptor, NetworkDescriptor, PublicAccessBlock,
    ResourceDescriptor, SecurityGroupDescriptor, SecurityGroupRule,
};
pub use error::{CloudError, CloudResult};
pub use mock::{MockOutcome, MockProvider, ProbeCall};
pub use prober::ResourceStateProber;
pub use provider::ProviderApi;
