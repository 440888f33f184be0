//! Test and suite reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assertion::AssertionResult;
use crate::error::CoreResult;

/// Final outcome of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every check passed and teardown succeeded
    Passed,
    /// A check failed, or the stack under test failed to provision
    Failed,
    /// The harness could not observe what it needed to
    Errored,
    /// Teardown failed or left resources behind
    Leaked,
    /// Abandoned on request; teardown still ran
    Cancelled,
}

impl Verdict {
    fn severity(self) -> u8 {
        match self {
            Verdict::Passed => 0,
            Verdict::Failed => 1,
            Verdict::Errored => 2,
            Verdict::Cancelled => 3,
            Verdict::Leaked => 4,
        }
    }

    /// The more severe of two verdicts. `Leaked` outranks everything.
    pub fn worst(self, other: Verdict) -> Verdict {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn is_success(self) -> bool {
        self == Verdict::Passed
    }

    fn icon(self) -> &'static str {
        match self {
            Verdict::Passed => "✅",
            Verdict::Failed => "❌",
            Verdict::Errored => "💥",
            Verdict::Leaked => "🚨",
            Verdict::Cancelled => "⏹️",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Passed => "PASSED",
            Verdict::Failed => "FAILED",
            Verdict::Errored => "ERRORED",
            Verdict::Leaked => "LEAKED",
            Verdict::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// What happened at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Teardown {
    /// Nothing was provisioned
    Skipped,
    Destroyed,
    /// Destroy returned an error
    Failed,
    /// Destroy succeeded but probed resources are still there
    Leaked,
}

impl fmt::Display for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Teardown::Skipped => "skipped",
            Teardown::Destroyed => "destroyed",
            Teardown::Failed => "failed",
            Teardown::Leaked => "leaked",
        };
        f.write_str(s)
    }
}

/// Everything observed while running one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub name: String,
    pub verdict: Verdict,
    /// Generated isolation value, when the stack declares a namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub assertions: Vec<AssertionResult>,
    /// Lifecycle and harness errors, in the order they happened
    pub errors: Vec<String>,
    pub teardown: Teardown,
    pub duration_ms: u64,
}

impl TestReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict: Verdict::Passed,
            namespace: None,
            assertions: Vec::new(),
            errors: Vec::new(),
            teardown: Teardown::Skipped,
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.is_success()
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertions.iter().filter(|a| !a.passed)
    }

    /// Human-readable report for this test.
    pub fn report(&self) -> String {
        let mut report = String::new();

        match &self.namespace {
            Some(ns) => report.push_str(&format!("Test: {} ({})\n", self.name, ns)),
            None => report.push_str(&format!("Test: {}\n", self.name)),
        }
        report.push_str(&format!("Status: {} {}\n", self.verdict.icon(), self.verdict));
        report.push_str(&format!("Duration: {}ms\n", self.duration_ms));

        if !self.assertions.is_empty() {
            report.push_str("\nChecks:\n");
            for result in &self.assertions {
                let status = if result.passed { "✅" } else { "❌" };
                report.push_str(&format!("  {} {} - {}\n", status, result.name, result.message));
            }
        }

        if !self.errors.is_empty() {
            report.push_str("\nErrors:\n");
            for error in &self.errors {
                let truncated: String = error.chars().take(500).collect();
                report.push_str(&format!("  ❌ {}\n", truncated));
            }
        }

        report.push_str(&format!("\nTeardown: {}\n", self.teardown));
        report
    }
}

/// Counts per verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub leaked: usize,
    pub cancelled: usize,
}

/// Reports for a whole suite, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub summary: SuiteSummary,
    pub tests: Vec<TestReport>,
}

impl SuiteReport {
    pub fn new(name: impl Into<String>, started_at: DateTime<Utc>, tests: Vec<TestReport>) -> Self {
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        let summary = Self::compute_summary(&tests);
        Self {
            name: name.into(),
            started_at,
            duration_ms,
            summary,
            tests,
        }
    }

    fn compute_summary(tests: &[TestReport]) -> SuiteSummary {
        let count = |v: Verdict| tests.iter().filter(|t| t.verdict == v).count();
        SuiteSummary {
            total: tests.len(),
            passed: count(Verdict::Passed),
            failed: count(Verdict::Failed),
            errored: count(Verdict::Errored),
            leaked: count(Verdict::Leaked),
            cancelled: count(Verdict::Cancelled),
        }
    }

    /// The worst verdict across all tests; an empty suite passes.
    pub fn verdict(&self) -> Verdict {
        self.tests
            .iter()
            .fold(Verdict::Passed, |acc, t| acc.worst(t.verdict))
    }

    pub fn passed(&self) -> bool {
        self.verdict().is_success()
    }

    pub fn get(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable report for the whole suite.
    pub fn report(&self) -> String {
        let verdict = self.verdict();
        let mut report = String::new();

        report.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        report.push_str(&format!("║  {:<60}║\n", format!("STACKPROBE REPORT: {}", self.name)));
        report.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        report.push_str(&format!("║  {:<60}║\n", format!("Status: {}", verdict)));
        report.push_str("╚══════════════════════════════════════════════════════════════╝\n\n");

        for test in &self.tests {
            report.push_str(&test.report());
            report.push('\n');
            report.push_str(&"-".repeat(60));
            report.push('\n');
        }

        let s = &self.summary;
        report.push_str(&format!(
            "\nSummary: {}/{} passed, {} failed, {} errored, {} leaked, {} cancelled ({}ms)\n",
            s.passed, s.total, s.failed, s.errored, s.leaked, s.cancelled, self.duration_ms
        ));
        report
    }
}
