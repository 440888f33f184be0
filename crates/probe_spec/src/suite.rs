//! Suite and test case definitions.

use serde::{Deserialize, Serialize};

use probe_runner::RetryPolicy;

use crate::check::CheckSpec;
use crate::stack::StackConfig;

/// A named collection of test cases plus harness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// Harness-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Test cases allowed to run at once
    pub concurrency: usize,
    /// Default region for resource probes
    pub region: String,
    /// Re-probe every observed resource after destroy
    pub verify_teardown: bool,
    pub terraform: ToolSettings,
    pub aws_cli: ToolSettings,
    /// Backoff for transient provider errors
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            region: "us-west-2".to_string(),
            verify_teardown: false,
            terraform: ToolSettings::default(),
            aws_cli: ToolSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Image and timeout overrides for one containerized tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub image: Option<String>,
    pub tag: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl ToolSettings {
    pub fn image_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.image.as_deref().unwrap_or(default)
    }

    pub fn tag_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.tag.as_deref().unwrap_or(default)
    }
}

/// One provision → observe → assert → teardown cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub stack: StackConfig,
    /// Region override for this test's probes
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
    /// Overrides the suite's `verify_teardown`
    #[serde(default)]
    pub verify_teardown: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, stack: StackConfig) -> Self {
        Self {
            name: name.into(),
            stack,
            region: None,
            checks: Vec::new(),
            verify_teardown: None,
            tags: Vec::new(),
        }
    }

    pub fn check(mut self, check: CheckSpec) -> Self {
        self.checks.push(check);
        self
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn verify_teardown(mut self, enabled: bool) -> Self {
        self.verify_teardown = Some(enabled);
        self
    }
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Settings::default(),
            tests: Vec::new(),
        }
    }

    pub fn test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    /// Keep only tests whose name matches the glob `pattern` or that carry
    /// a tag equal to it.
    pub fn filtered(mut self, pattern: &glob::Pattern) -> Self {
        self.tests.retain(|t| {
            pattern.matches(&t.name) || t.tags.iter().any(|tag| pattern.as_str() == tag)
        });
        self
    }
}
