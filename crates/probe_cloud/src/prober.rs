//! Retrying resource lookups.

use std::sync::Arc;

use tracing::{debug, info};

use probe_runner::{Retried, RetryError, RetryPolicy};
use probe_spec::ResourceKind;

use crate::descriptor::ResourceDescriptor;
use crate::error::{CloudError, CloudResult};
use crate::provider::ProviderApi;

/// Fetches live resource descriptors, retrying transient provider errors
/// with bounded exponential backoff.
///
/// `NotFound` and other provider errors are returned on the first attempt.
#[derive(Clone)]
pub struct ResourceStateProber {
    api: Arc<dyn ProviderApi>,
    retry: RetryPolicy,
}

impl ResourceStateProber {
    pub fn new(api: Arc<dyn ProviderApi>) -> Self {
        Self {
            api,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn describe(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
    ) -> CloudResult<ResourceDescriptor> {
        Ok(self.probe(kind, region, id).await?.value)
    }

    /// Like [`describe`](Self::describe), also reporting how many retries
    /// were spent.
    pub async fn probe(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
    ) -> CloudResult<Retried<ResourceDescriptor>> {
        debug!("Describing {} '{}' in {}", kind, id, region);
        let what = format!("describe {} {}", kind, id);

        let outcome = self
            .retry
            .run(&what, || self.api.describe(kind, region, id), CloudError::is_transient)
            .await;

        match outcome {
            Ok(found) => {
                if found.retries > 0 {
                    info!("{} '{}' described after {} retries", kind, id, found.retries);
                }
                Ok(found)
            }
            Err(RetryError::Permanent { error, .. }) => Err(error),
            Err(RetryError::Exhausted { last, attempts }) => Err(CloudError::RetriesExhausted {
                attempts,
                last: last.to_string(),
            }),
        }
    }

    /// Whether the resource currently exists.
    pub async fn exists(&self, kind: ResourceKind, region: &str, id: &str) -> CloudResult<bool> {
        match self.describe(kind, region, id).await {
            Ok(_) => Ok(true),
            Err(CloudError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
