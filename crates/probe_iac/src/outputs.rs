//! Stack outputs and their extraction.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use probe_spec::Value;

use crate::error::{IacError, IacResult};
use crate::handle::{StackHandle, StackState};
use crate::lifecycle::StackLifecycle;

/// Outputs published by a successful apply.
///
/// One value per name; looking up an absent name is an error, never a default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StackOutputs {
    values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    sensitive: BTreeSet<String>,
}

/// Entry of `terraform output -json`.
#[derive(Debug, Deserialize)]
struct TerraformOutput {
    #[serde(default)]
    sensitive: bool,
    value: serde_json::Value,
}

impl StackOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn mark_sensitive(&mut self, name: impl Into<String>) {
        self.sensitive.insert(name.into());
    }

    /// Parse the document printed by `terraform output -json`.
    pub fn from_terraform_json(json: &str) -> IacResult<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let raw: BTreeMap<String, TerraformOutput> = serde_json::from_str(trimmed)
            .map_err(|e| IacError::OutputFormat(e.to_string()))?;

        let mut outputs = Self::default();
        for (name, output) in raw {
            if output.sensitive {
                outputs.sensitive.insert(name.clone());
            }
            outputs.values.insert(name, Value::from(output.value));
        }
        Ok(outputs)
    }

    pub fn get(&self, name: &str) -> IacResult<&Value> {
        self.values.get(name).ok_or_else(|| IacError::MissingOutput {
            name: name.to_string(),
            available: self.names(),
        })
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// A single output and whether Terraform marks it sensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputValue {
    pub value: Value,
    pub sensitive: bool,
}

/// Reads named outputs from an applied stack.
///
/// Every call goes back to the lifecycle; nothing is cached between calls.
pub struct OutputExtractor {
    lifecycle: Arc<dyn StackLifecycle>,
}

impl OutputExtractor {
    pub fn new(lifecycle: Arc<dyn StackLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Fetch one output with its sensitivity flag.
    pub async fn lookup(&self, handle: &StackHandle, name: &str) -> IacResult<OutputValue> {
        let state = handle.state();
        if state != StackState::Applied {
            return Err(IacError::NotApplied {
                handle: handle.id().to_string(),
                state: state.to_string(),
            });
        }

        debug!("Reading output '{}' of {}", name, handle.id());
        let outputs = self.lifecycle.outputs(handle).await?;
        let value = outputs.get(name)?.clone();
        Ok(OutputValue {
            value,
            sensitive: outputs.is_sensitive(name),
        })
    }

    pub async fn output(&self, handle: &StackHandle, name: &str) -> IacResult<Value> {
        Ok(self.lookup(handle, name).await?.value)
    }

    pub async fn output_string(&self, handle: &StackHandle, name: &str) -> IacResult<String> {
        match self.output(handle, name).await? {
            Value::String(s) => Ok(s),
            scalar @ (Value::Number(_) | Value::Bool(_)) => Ok(scalar.to_string()),
            other => Err(type_error(name, "string", &other)),
        }
    }

    pub async fn output_list(&self, handle: &StackHandle, name: &str) -> IacResult<Vec<Value>> {
        match self.output(handle, name).await? {
            Value::List(items) => Ok(items),
            other => Err(type_error(name, "list", &other)),
        }
    }

    pub async fn output_map(
        &self,
        handle: &StackHandle,
        name: &str,
    ) -> IacResult<BTreeMap<String, Value>> {
        match self.output(handle, name).await? {
            Value::Map(map) => Ok(map),
            other => Err(type_error(name, "map", &other)),
        }
    }
}

fn type_error(name: &str, expected: &'static str, actual: &Value) -> IacError {
    IacError::OutputType {
        name: name.to_string(),
        expected,
        actual: actual.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT_JSON: &str = r#"{
  "s3_bucket_name": {"sensitive": false, "type": "string", "value": "t-abc"},
  "subnet_ids": {"sensitive": false, "type": ["list", "string"], "value": ["subnet-1", "subnet-2"]},
  "db_password": {"sensitive": true, "type": "string", "value": "hunter2"},
  "instance_count": {"sensitive": false, "type": "number", "value": 2}
}"#;

    #[test]
    fn test_parse_terraform_output_json() {
        let outputs = StackOutputs::from_terraform_json(OUTPUT_JSON).unwrap();

        assert_eq!(outputs.len(), 4);
        assert_eq!(outputs.get("s3_bucket_name").unwrap(), &Value::from("t-abc"));
        assert_eq!(outputs.get("instance_count").unwrap(), &Value::Number(2.0));
        assert_eq!(
            outputs.get("subnet_ids").unwrap().as_list().map(|l| l.len()),
            Some(2)
        );
        assert!(outputs.is_sensitive("db_password"));
        assert!(!outputs.is_sensitive("s3_bucket_name"));
    }

    #[test]
    fn test_empty_output_document() {
        assert!(StackOutputs::from_terraform_json("").unwrap().is_empty());
        assert!(StackOutputs::from_terraform_json("{}\n").unwrap().is_empty());
    }

    #[test]
    fn test_missing_output_is_error_not_default() {
        let outputs = StackOutputs::new().with("vpc_id", "vpc-123");

        match outputs.get("subnet_id") {
            Err(IacError::MissingOutput { name, available }) => {
                assert_eq!(name, "subnet_id");
                assert_eq!(available, vec!["vpc_id".to_string()]);
            }
            other => panic!("expected MissingOutput, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_output_json() {
        let err = StackOutputs::from_terraform_json("Error: no state").unwrap_err();
        assert!(matches!(err, IacError::OutputFormat(_)));
    }
}
