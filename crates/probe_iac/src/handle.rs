//! Stack handles and their lifecycle state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use uuid::Uuid;

use probe_spec::StackConfig;

/// Where a provisioned stack instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackState {
    /// Initialized, nothing provisioned yet
    Initialized,
    /// Apply succeeded
    Applied,
    /// Apply failed; partial resources may exist
    ApplyFailed,
    /// Torn down; the handle is no longer usable
    Destroyed,
}

impl StackState {
    /// Whether destroy has real work to do from this state.
    pub fn needs_teardown(&self) -> bool {
        matches!(self, StackState::Applied | StackState::ApplyFailed)
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StackState::Initialized => "initialized",
            StackState::Applied => "applied",
            StackState::ApplyFailed => "apply_failed",
            StackState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

struct HandleInner {
    id: String,
    config: StackConfig,
    workdir: PathBuf,
    retryable: Vec<Regex>,
    state: Mutex<StackState>,
    // Keeps a private working copy alive for as long as any clone exists.
    _scratch: Option<TempDir>,
}

/// Opaque token for one provisioned instance of a [`StackConfig`].
///
/// Clones share state, so a transition seen through one clone is seen
/// through all of them.
#[derive(Clone)]
pub struct StackHandle {
    inner: Arc<HandleInner>,
}

impl StackHandle {
    /// Create a handle in the `Initialized` state.
    ///
    /// `config` should already be isolated; it is frozen from here on.
    pub fn new(config: StackConfig, workdir: impl Into<PathBuf>) -> Self {
        Self::build(config, workdir.into(), Vec::new(), None)
    }

    pub(crate) fn build(
        config: StackConfig,
        workdir: PathBuf,
        retryable: Vec<Regex>,
        scratch: Option<TempDir>,
    ) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            inner: Arc::new(HandleInner {
                id: format!("sp-{}", &id[..8]),
                config,
                workdir,
                retryable,
                state: Mutex::new(StackState::Initialized),
                _scratch: scratch,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &StackConfig {
        &self.inner.config
    }

    /// Directory Terraform runs in (the stack directory or its private copy).
    pub fn workdir(&self) -> &Path {
        &self.inner.workdir
    }

    pub fn state(&self) -> StackState {
        *self.inner.state.lock()
    }

    /// Record a lifecycle transition. Intended for [`crate::StackLifecycle`]
    /// implementations.
    pub fn mark(&self, state: StackState) {
        *self.inner.state.lock() = state;
    }

    pub(crate) fn retryable_patterns(&self) -> &[Regex] {
        &self.inner.retryable
    }

    /// Var file path relative to the working directory.
    pub fn var_file(&self) -> String {
        format!(".stackprobe/{}.tfvars.json", self.inner.id)
    }
}

impl fmt::Debug for StackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackHandle")
            .field("id", &self.inner.id)
            .field("directory", &self.inner.config.directory)
            .field("state", &self.state())
            .finish()
    }
}
