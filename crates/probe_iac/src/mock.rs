//! Scripted lifecycle for testing.
//!
//! Provisions nothing: `apply` hands back preset outputs, and failures or
//! delays are injected per operation. Calls are captured in order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use probe_spec::StackConfig;

use crate::error::{IacError, IacResult};
use crate::handle::{StackHandle, StackState};
use crate::lifecycle::StackLifecycle;
use crate::outputs::StackOutputs;

type DestroyHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Script {
    outputs: StackOutputs,
    fail_init: Option<String>,
    fail_apply: Option<String>,
    fail_destroy: Option<String>,
    apply_delay: Option<Duration>,
    on_destroy: Vec<DestroyHook>,
    calls: Vec<String>,
}

/// Mock lifecycle. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedLifecycle {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(self, outputs: StackOutputs) -> Self {
        self.script.lock().outputs = outputs;
        self
    }

    pub fn fail_init(self, message: impl Into<String>) -> Self {
        self.script.lock().fail_init = Some(message.into());
        self
    }

    pub fn fail_apply(self, message: impl Into<String>) -> Self {
        self.script.lock().fail_apply = Some(message.into());
        self
    }

    pub fn fail_destroy(self, message: impl Into<String>) -> Self {
        self.script.lock().fail_destroy = Some(message.into());
        self
    }

    /// Make `apply` take this long before answering.
    pub fn apply_delay(self, delay: Duration) -> Self {
        self.script.lock().apply_delay = Some(delay);
        self
    }

    /// Run `hook` after every successful teardown.
    pub fn on_destroy<F>(self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.script.lock().on_destroy.push(Arc::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    fn record(&self, operation: &str) {
        self.script.lock().calls.push(operation.to_string());
    }
}

#[async_trait]
impl StackLifecycle for ScriptedLifecycle {
    async fn init(&self, config: &StackConfig) -> IacResult<StackHandle> {
        self.record("init");
        if let Some(message) = self.script.lock().fail_init.clone() {
            return Err(IacError::InitFailed(message));
        }
        Ok(StackHandle::new(config.isolated(), config.directory.clone()))
    }

    async fn apply(&self, handle: &StackHandle) -> IacResult<StackOutputs> {
        self.record("apply");
        if handle.state() == StackState::Destroyed {
            return Err(IacError::HandleDestroyed(handle.id().to_string()));
        }

        let delay = self.script.lock().apply_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (failure, outputs) = {
            let script = self.script.lock();
            (script.fail_apply.clone(), script.outputs.clone())
        };
        match failure {
            Some(message) => {
                handle.mark(StackState::ApplyFailed);
                Err(IacError::ApplyFailed(message))
            }
            None => {
                handle.mark(StackState::Applied);
                Ok(outputs)
            }
        }
    }

    async fn outputs(&self, handle: &StackHandle) -> IacResult<StackOutputs> {
        self.record("outputs");
        let state = handle.state();
        if state != StackState::Applied {
            return Err(IacError::NotApplied {
                handle: handle.id().to_string(),
                state: state.to_string(),
            });
        }
        Ok(self.script.lock().outputs.clone())
    }

    async fn destroy(&self, handle: &StackHandle) -> IacResult<()> {
        self.record("destroy");
        if !handle.state().needs_teardown() {
            return Ok(());
        }

        let (failure, hooks) = {
            let script = self.script.lock();
            (script.fail_destroy.clone(), script.on_destroy.clone())
        };
        if let Some(message) = failure {
            return Err(IacError::DestroyFailed(message));
        }

        handle.mark(StackState::Destroyed);
        for hook in hooks {
            hook();
        }
        Ok(())
    }
}
