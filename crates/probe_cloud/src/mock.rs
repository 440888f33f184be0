//! Scripted provider for testing.
//!
//! Known resources are described on every call. A script for an id overrides
//! that: its outcomes are served in order and the last one repeats. Anything
//! else is `NotFound`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use probe_spec::ResourceKind;

use crate::descriptor::ResourceDescriptor;
use crate::error::{CloudError, CloudResult};
use crate::provider::ProviderApi;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Found(ResourceDescriptor),
    NotFound,
    Transient(String),
    Provider(String),
}

impl MockOutcome {
    fn resolve(self, kind: ResourceKind, id: &str) -> CloudResult<ResourceDescriptor> {
        match self {
            MockOutcome::Found(descriptor) => Ok(descriptor),
            MockOutcome::NotFound => Err(CloudError::NotFound {
                kind,
                id: id.to_string(),
            }),
            MockOutcome::Transient(msg) => Err(CloudError::Transient(msg)),
            MockOutcome::Provider(msg) => Err(CloudError::Provider(msg)),
        }
    }
}

/// A captured `describe` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCall {
    pub kind: ResourceKind,
    pub region: String,
    pub id: String,
}

#[derive(Debug)]
struct Script {
    outcomes: Vec<MockOutcome>,
    served: usize,
}

/// Mock provider. Clones share state.
#[derive(Clone, Default)]
pub struct MockProvider {
    resources: Arc<RwLock<HashMap<String, ResourceDescriptor>>>,
    scripts: Arc<RwLock<HashMap<String, Script>>>,
    calls: Arc<RwLock<Vec<ProbeCall>>>,
    latency: Arc<RwLock<HashMap<String, Duration>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live resource under its own id.
    pub fn with_resource(self, descriptor: ResourceDescriptor) -> Self {
        self.resources
            .write()
            .insert(descriptor.id().to_string(), descriptor);
        self
    }

    /// Script the answers for `id`.
    pub fn script(self, id: impl Into<String>, outcomes: Vec<MockOutcome>) -> Self {
        self.scripts.write().insert(
            id.into(),
            Script {
                outcomes,
                served: 0,
            },
        );
        self
    }

    /// Answer every `describe` of `id` only after `latency`.
    pub fn slow(self, id: impl Into<String>, latency: Duration) -> Self {
        self.latency.write().insert(id.into(), latency);
        self
    }

    /// Forget a resource, as if it had been torn down.
    pub fn remove(&self, id: &str) {
        self.resources.write().remove(id);
        self.scripts.write().remove(id);
    }

    /// Forget every resource.
    pub fn clear(&self) {
        self.resources.write().clear();
        self.scripts.write().clear();
    }

    pub fn calls(&self) -> Vec<ProbeCall> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.read().iter().filter(|c| c.id == id).count()
    }

    fn next_outcome(&self, id: &str) -> MockOutcome {
        if let Some(script) = self.scripts.write().get_mut(id) {
            let index = script.served.min(script.outcomes.len().saturating_sub(1));
            script.served += 1;
            if let Some(outcome) = script.outcomes.get(index) {
                return outcome.clone();
            }
        }
        match self.resources.read().get(id) {
            Some(descriptor) => MockOutcome::Found(descriptor.clone()),
            None => MockOutcome::NotFound,
        }
    }
}

#[async_trait]
impl ProviderApi for MockProvider {
    async fn describe(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
    ) -> CloudResult<ResourceDescriptor> {
        self.calls.write().push(ProbeCall {
            kind,
            region: region.to_string(),
            id: id.to_string(),
        });

        let latency = self.latency.read().get(id).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let descriptor = self.next_outcome(id).resolve(kind, id)?;
        if descriptor.kind() != kind {
            return Err(CloudError::Provider(format!(
                "'{}' is a {}, not a {}",
                id,
                descriptor.kind(),
                kind
            )));
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::NetworkDescriptor;

    fn vpc() -> ResourceDescriptor {
        ResourceDescriptor::Network(NetworkDescriptor {
            id: "vpc-1".to_string(),
            cidr_block: "10.0.0.0/16".to_string(),
        })
    }

    #[tokio::test]
    async fn test_known_resource_and_unknown_id() {
        let provider = MockProvider::new().with_resource(vpc());

        let found = provider
            .describe(ResourceKind::Network, "us-west-2", "vpc-1")
            .await
            .unwrap();
        assert_eq!(found, vpc());

        let missing = provider
            .describe(ResourceKind::Network, "us-west-2", "vpc-2")
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_script_then_repeat_last() {
        let provider = MockProvider::new().script(
            "vpc-1",
            vec![MockOutcome::Transient("Throttling".into()), MockOutcome::Found(vpc())],
        );

        for expected_ok in [false, true, true] {
            let result = provider.describe(ResourceKind::Network, "us-west-2", "vpc-1").await;
            assert_eq!(result.is_ok(), expected_ok);
        }
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_provider_error() {
        let provider = MockProvider::new().with_resource(vpc());
        let err = provider
            .describe(ResourceKind::Bucket, "us-west-2", "vpc-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Provider(_)));
    }

    #[tokio::test]
    async fn test_remove_simulates_teardown() {
        let provider = MockProvider::new().with_resource(vpc());
        provider.remove("vpc-1");

        let err = provider
            .describe(ResourceKind::Network, "us-west-2", "vpc-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
