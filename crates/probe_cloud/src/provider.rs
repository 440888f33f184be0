//! Single-attempt access to the provider's control plane.

use async_trait::async_trait;

use probe_spec::ResourceKind;

use crate::descriptor::ResourceDescriptor;
use crate::error::CloudResult;

/// Raw provider lookup. One call is one attempt; retrying is the
/// [`crate::ResourceStateProber`]'s job.
///
/// Implementations must report a missing resource as
/// [`crate::CloudError::NotFound`] and throttling or connectivity problems as
/// [`crate::CloudError::Transient`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderApi: Send + Sync {
    async fn describe(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
    ) -> CloudResult<ResourceDescriptor>;
}
