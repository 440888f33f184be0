//! Stack lifecycle contract and scoped teardown.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use probe_spec::StackConfig;

use crate::error::IacResult;
use crate::handle::StackHandle;
use crate::outputs::StackOutputs;

/// Owns `init → apply → destroy` for stack instances.
///
/// Implementations must keep these guarantees:
/// - `apply` on an applied handle with an unchanged config converges without
///   recreating resources and returns the same outputs;
/// - a failed `apply` leaves the handle in `ApplyFailed`, so `destroy` still
///   cleans up partial resources;
/// - `destroy` on an `Initialized` or `Destroyed` handle is a no-op success.
#[async_trait]
pub trait StackLifecycle: Send + Sync {
    /// Prepare a stack instance. Nothing is provisioned yet.
    async fn init(&self, config: &StackConfig) -> IacResult<StackHandle>;

    /// Provision the stack and return its outputs.
    async fn apply(&self, handle: &StackHandle) -> IacResult<StackOutputs>;

    /// Read the current outputs of an applied stack.
    async fn outputs(&self, handle: &StackHandle) -> IacResult<StackOutputs>;

    /// Tear the stack down.
    async fn destroy(&self, handle: &StackHandle) -> IacResult<()>;
}

/// Scoped ownership of an initialized stack.
///
/// Acquired at `init` and released with [`StackLease::release`]. A lease that
/// is dropped without being released, for example because the owning future
/// was cancelled, logs an error and schedules a best-effort destroy on the
/// current tokio runtime.
pub struct StackLease {
    lifecycle: Arc<dyn StackLifecycle>,
    handle: StackHandle,
    released: bool,
}

impl StackLease {
    /// Initialize a stack and take ownership of its teardown.
    pub async fn acquire(
        lifecycle: Arc<dyn StackLifecycle>,
        config: &StackConfig,
    ) -> IacResult<Self> {
        let handle = lifecycle.init(config).await?;
        Ok(Self {
            lifecycle,
            handle,
            released: false,
        })
    }

    pub fn handle(&self) -> &StackHandle {
        &self.handle
    }

    /// Destroy the stack.
    ///
    /// The lease only counts as released once destroy has returned, so
    /// dropping this future partway still triggers the fallback teardown.
    pub async fn release(mut self) -> IacResult<()> {
        let result = self.lifecycle.destroy(&self.handle).await;
        self.released = true;
        result
    }
}

impl Drop for StackLease {
    fn drop(&mut self) {
        if self.released || !self.handle.state().needs_teardown() {
            return;
        }

        error!(
            "Stack {} dropped without teardown (state: {})",
            self.handle.id(),
            self.handle.state()
        );

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let lifecycle = Arc::clone(&self.lifecycle);
                let handle = self.handle.clone();
                info!("Scheduling fallback destroy for {}", handle.id());
                runtime.spawn(async move {
                    if let Err(e) = lifecycle.destroy(&handle).await {
                        error!("Fallback destroy of {} failed: {}", handle.id(), e);
                    }
                });
            }
            Err(_) => error!(
                "No runtime available to destroy {}; clean up {:?} manually",
                self.handle.id(),
                self.handle.workdir()
            ),
        }
    }
}
