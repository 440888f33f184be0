//! Stack configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Error patterns in Terraform output that are worth another attempt.
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "RequestError: send request failed",
    "read: connection reset by peer",
    "TLS handshake timeout",
    "Error installing provider",
    "Failed to query available provider packages",
    "timeout while waiting for state",
    "RequestLimitExceeded",
    "(?i)throttl",
];

/// One test's target stack: where it is defined and what it is fed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Directory holding the stack definition
    pub directory: PathBuf,
    /// Input variables
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub options: StackOptions,
    /// Variable that receives a unique name prefix for this run
    #[serde(default)]
    pub namespace: Option<NamespaceSpec>,
}

/// Execution options for one stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackOptions {
    /// Pass `-no-color` to Terraform
    pub no_color: bool,
    /// Work on a private temporary copy of the directory
    pub copy_to_temp: bool,
    /// Fail apply when a follow-up plan still reports changes
    pub check_idempotent: bool,
    /// Retries for apply/destroy failures matching `retryable_errors`
    pub max_retries: u32,
    /// Regex patterns marking Terraform errors as transient
    pub retryable_errors: Vec<String>,
    /// Extra environment for the Terraform container
    pub env: BTreeMap<String, String>,
    /// Override for the Terraform container timeout
    pub timeout_seconds: Option<u64>,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            no_color: true,
            copy_to_temp: false,
            check_idempotent: false,
            max_retries: 3,
            retryable_errors: DEFAULT_RETRYABLE_ERRORS.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            timeout_seconds: None,
        }
    }
}

/// Per-run isolation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceSpec {
    /// Variable that receives the generated prefix
    pub variable: String,
    /// Base for the prefix; defaults to the variable's current value
    #[serde(default)]
    pub prefix: Option<String>,
}

impl StackConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            variables: BTreeMap::new(),
            options: StackOptions::default(),
            namespace: None,
        }
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: StackOptions) -> Self {
        self.options = options;
        self
    }

    /// Give `variable` a unique `<base>-<suffix>` value at lifecycle start.
    pub fn with_namespace(mut self, variable: impl Into<String>, base: impl Into<String>) -> Self {
        self.namespace = Some(NamespaceSpec {
            variable: variable.into(),
            prefix: Some(base.into()),
        });
        self
    }

    /// Resolve the namespace into a concrete variable value.
    ///
    /// Returns the config unchanged when no namespace is declared. Each call
    /// draws a fresh suffix, so two runs of the same config never share names.
    pub fn isolated(&self) -> Self {
        let mut config = self.clone();
        if let Some(namespace) = &self.namespace {
            let base = namespace
                .prefix
                .clone()
                .or_else(|| {
                    self.variables
                        .get(&namespace.variable)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "stackprobe".to_string());
            let suffix = Uuid::new_v4().simple().to_string();
            config.variables.insert(
                namespace.variable.clone(),
                Value::String(format!("{}-{}", base, &suffix[..6])),
            );
        }
        config
    }

    /// The generated isolation value, if a namespace is declared and resolved.
    pub fn namespace_value(&self) -> Option<&str> {
        self.namespace
            .as_ref()
            .and_then(|ns| self.variables.get(&ns.variable))
            .and_then(Value::as_str)
    }

    /// Resolve a relative directory against `base`.
    pub fn rooted_at(mut self, base: &Path) -> Self {
        if self.directory.is_relative() {
            self.directory = base.join(&self.directory);
        }
        self
    }
}
