//! Check definitions: what to observe and what to expect of it.

use serde::{Deserialize, Serialize};

use crate::error::{SpecError, SpecResult};
use crate::predicate::Predicate;

/// Resource kinds the prober can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[serde(alias = "s3_bucket")]
    Bucket,
    #[serde(alias = "ec2_instance")]
    Instance,
    SecurityGroup,
    #[serde(alias = "vpc")]
    Network,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::Instance => "instance",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::Network => "network",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            ResourceKind::Bucket,
            ResourceKind::Instance,
            ResourceKind::SecurityGroup,
            ResourceKind::Network,
        ]
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A live resource, identified by a stack output or a literal id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    /// Output holding the resource identifier
    #[serde(default)]
    pub output: Option<String>,
    /// Literal identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Region override
    #[serde(default)]
    pub region: Option<String>,
}

impl ResourceRef {
    pub fn from_output(kind: ResourceKind, output: impl Into<String>) -> Self {
        Self {
            kind,
            output: Some(output.into()),
            id: None,
            region: None,
        }
    }

    pub fn with_id(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            output: None,
            id: Some(id.into()),
            region: None,
        }
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Resolved target of a check.
#[derive(Debug, Clone, Copy)]
pub enum CheckTarget<'a> {
    Output(&'a str),
    Resource(&'a ResourceRef),
}

/// One named check.
///
/// Exactly one of `output` or `resource` is set. `field` selects a dotted path
/// inside the observed value; `absent` asserts that the resource is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSpec {
    pub name: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub resource: Option<ResourceRef>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub expect: Option<Predicate>,
    #[serde(default)]
    pub absent: bool,
}

impl CheckSpec {
    /// Check a stack output.
    pub fn output(name: impl Into<String>, output: impl Into<String>, expect: Predicate) -> Self {
        Self {
            name: name.into(),
            output: Some(output.into()),
            resource: None,
            field: None,
            expect: Some(expect),
            absent: false,
        }
    }

    /// Check a field of a live resource.
    pub fn resource(
        name: impl Into<String>,
        resource: ResourceRef,
        field: impl Into<String>,
        expect: Predicate,
    ) -> Self {
        Self {
            name: name.into(),
            output: None,
            resource: Some(resource),
            field: Some(field.into()),
            expect: Some(expect),
            absent: false,
        }
    }

    /// Check that a resource exists, without looking at any field.
    pub fn exists(name: impl Into<String>, resource: ResourceRef) -> Self {
        Self {
            name: name.into(),
            output: None,
            resource: Some(resource),
            field: None,
            expect: None,
            absent: false,
        }
    }

    /// Check that a resource is gone.
    pub fn absent(name: impl Into<String>, resource: ResourceRef) -> Self {
        Self {
            absent: true,
            ..Self::exists(name, resource)
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn target(&self) -> SpecResult<CheckTarget<'_>> {
        match (&self.output, &self.resource) {
            (Some(output), None) => Ok(CheckTarget::Output(output)),
            (None, Some(resource)) => Ok(CheckTarget::Resource(resource)),
            (Some(_), Some(_)) => Err(self.invalid("set either 'output' or 'resource', not both")),
            (None, None) => Err(self.invalid("one of 'output' or 'resource' is required")),
        }
    }

    /// Human-readable expectation, used in reports.
    pub fn expectation(&self) -> String {
        match (&self.expect, self.absent) {
            (_, true) => "resource absent".to_string(),
            (Some(predicate), false) => predicate.describe(),
            (None, false) => "resource exists".to_string(),
        }
    }

    fn invalid(&self, message: &str) -> SpecError {
        SpecError::InvalidCheck {
            check: self.name.clone(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_deserialize_output_check() {
        let yaml = r#"
name: bucket name present
output: s3_bucket_name
expect: not_empty
"#;
        let check: CheckSpec = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(check.target().unwrap(), CheckTarget::Output("s3_bucket_name")));
        assert!(matches!(check.expect, Some(Predicate::NotEmpty)));
    }

    #[test]
    fn test_deserialize_resource_check() {
        let yaml = r#"
name: bucket allows public ACLs
resource: { kind: s3_bucket, output: s3_bucket_name }
field: public_access_block.block_public_acls
expect: { equals: false }
"#;
        let check: CheckSpec = serde_yaml::from_str(yaml).unwrap();
        match check.target().unwrap() {
            CheckTarget::Resource(resource) => {
                assert_eq!(resource.kind, ResourceKind::Bucket);
                assert_eq!(resource.output.as_deref(), Some("s3_bucket_name"));
            }
            other => panic!("unexpected target {:?}", other),
        }
        assert!(matches!(check.expect, Some(Predicate::Equals(Value::Bool(false)))));
    }

    #[test]
    fn test_target_requires_exactly_one() {
        let mut check = CheckSpec::output("c", "vpc_id", Predicate::NotEmpty);
        check.resource = Some(ResourceRef::with_id(ResourceKind::Network, "vpc-1"));
        assert!(check.target().is_err());

        check.output = None;
        check.resource = None;
        assert!(check.target().is_err());
    }

    #[test]
    fn test_expectation_text() {
        let gone = CheckSpec::absent("gone", ResourceRef::with_id(ResourceKind::Instance, "i-1"));
        assert_eq!(gone.expectation(), "resource absent");

        let exists = CheckSpec::exists("there", ResourceRef::with_id(ResourceKind::Instance, "i-1"));
        assert_eq!(exists.expectation(), "resource exists");
    }
}
