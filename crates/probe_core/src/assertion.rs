//! Assertion evaluation without short-circuiting.

use serde::{Deserialize, Serialize};

use probe_spec::{Predicate, Value};

/// Placeholder shown in place of sensitive values.
pub const REDACTED: &str = "(sensitive)";

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub name: String,
    pub passed: bool,
    /// What the check expected, in words
    pub expected: String,
    /// What was observed, when anything was
    pub actual: Option<Value>,
    pub message: String,
}

/// Evaluates checks and keeps every result.
///
/// A failing check never stops the ones after it; [`AssertionRunner::verdict`]
/// is the conjunction of all results, and true for an empty run.
#[derive(Debug, Default)]
pub struct AssertionRunner {
    results: Vec<AssertionResult>,
}

impl AssertionRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `predicate` against `actual` and record the result.
    pub fn check(&mut self, name: &str, actual: &Value, predicate: &Predicate) -> &AssertionResult {
        self.check_value(name, actual, predicate, false)
    }

    /// Like [`check`](Self::check), but never records the observed value.
    pub fn check_sensitive(
        &mut self,
        name: &str,
        actual: &Value,
        predicate: &Predicate,
    ) -> &AssertionResult {
        self.check_value(name, actual, predicate, true)
    }

    fn check_value(
        &mut self,
        name: &str,
        actual: &Value,
        predicate: &Predicate,
        sensitive: bool,
    ) -> &AssertionResult {
        let passed = predicate.evaluate(actual);
        let shown = if sensitive {
            Value::from(REDACTED)
        } else {
            actual.clone()
        };
        let message = if passed {
            format!("{} {}", shown, predicate)
        } else {
            format!("expected {}, got {}", predicate, shown)
        };

        self.record(AssertionResult {
            name: name.to_string(),
            passed,
            expected: predicate.describe(),
            actual: Some(shown),
            message,
        })
    }

    /// Record a passing result that needed no predicate.
    pub fn pass(
        &mut self,
        name: &str,
        expected: impl Into<String>,
        message: impl Into<String>,
    ) -> &AssertionResult {
        self.record(AssertionResult {
            name: name.to_string(),
            passed: true,
            expected: expected.into(),
            actual: None,
            message: message.into(),
        })
    }

    /// Record a failure where nothing could be observed.
    pub fn fail(
        &mut self,
        name: &str,
        expected: impl Into<String>,
        message: impl Into<String>,
    ) -> &AssertionResult {
        self.record(AssertionResult {
            name: name.to_string(),
            passed: false,
            expected: expected.into(),
            actual: None,
            message: message.into(),
        })
    }

    fn record(&mut self, result: AssertionResult) -> &AssertionResult {
        self.results.push(result);
        &self.results[self.results.len() - 1]
    }

    pub fn results(&self) -> &[AssertionResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<AssertionResult> {
        self.results
    }

    pub fn verdict(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_short_circuit() {
        let mut runner = AssertionRunner::new();
        runner.check("A", &Value::from("t-abc"), &Predicate::NotEmpty);
        runner.check("B", &Value::from(3i64), &Predicate::between(5.0, 10.0));
        runner.check("C", &Value::Bool(false), &Predicate::equals(false));

        let names: Vec<_> = runner.results().iter().map(|r| (r.name.as_str(), r.passed)).collect();
        assert_eq!(names, vec![("A", true), ("B", false), ("C", true)]);
        assert!(!runner.verdict());
        assert_eq!(runner.failed_count(), 1);
    }

    #[test]
    fn test_empty_run_is_vacuously_true() {
        assert!(AssertionRunner::new().verdict());
    }

    #[test]
    fn test_failure_message_shows_both_sides() {
        let mut runner = AssertionRunner::new();
        let result = runner.check("state", &Value::from("stopped"), &Predicate::equals("running"));

        assert!(!result.passed);
        assert_eq!(result.message, "expected == running, got stopped");
        assert_eq!(result.actual, Some(Value::from("stopped")));
    }

    #[test]
    fn test_sensitive_values_are_redacted() {
        let mut runner = AssertionRunner::new();
        let result = runner.check_sensitive("token", &Value::from("s3cr3t"), &Predicate::equals("nope"));

        assert!(!result.passed);
        assert!(!result.message.contains("s3cr3t"));
        assert_eq!(result.actual, Some(Value::from(REDACTED)));
    }

    #[test]
    fn test_custom_predicate() {
        let mut runner = AssertionRunner::new();
        let even = Predicate::custom("is even", |v| v.as_f64().is_some_and(|n| n % 2.0 == 0.0));

        assert!(runner.check("count", &Value::from(4i64), &even).passed);
        assert_eq!(runner.results()[0].expected, "is even");
    }
}
