//! Suite validation with actionable messages.

use std::collections::HashSet;

use regex::Regex;

use crate::check::{CheckSpec, CheckTarget};
use crate::predicate::Predicate;
use crate::suite::{Suite, TestCase};

/// Validation result with details.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        if !other.valid {
            self.valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validator for suites.
pub struct SuiteValidator;

impl SuiteValidator {
    pub fn validate(suite: &Suite) -> ValidationResult {
        let mut result = ValidationResult::new();

        if suite.name.trim().is_empty() {
            result.add_error("Suite name cannot be empty");
        }
        if suite.settings.concurrency == 0 {
            result.add_error("settings.concurrency must be at least 1");
        }
        if suite.tests.is_empty() {
            result.add_warning(format!("Suite '{}' declares no tests", suite.name));
        }

        let mut names = HashSet::new();
        let mut shared_dirs = HashSet::new();
        for test in &suite.tests {
            if !names.insert(test.name.as_str()) {
                result.add_error(format!("Duplicate test name '{}'", test.name));
            }
            result.merge(Self::validate_test(test));

            if suite.settings.concurrency > 1 && test.stack.namespace.is_none() {
                result.add_warning(format!(
                    "Test '{}' runs concurrently without a namespace; resource names may collide",
                    test.name
                ));
            }
            if suite.settings.concurrency > 1
                && !test.stack.options.copy_to_temp
                && !shared_dirs.insert(test.stack.directory.as_path())
            {
                result.add_warning(format!(
                    "Test '{}' shares stack directory {:?} with another test; set copy_to_temp to avoid clashing .terraform state",
                    test.name, test.stack.directory
                ));
            }
        }

        result
    }

    pub fn validate_test(test: &TestCase) -> ValidationResult {
        let mut result = ValidationResult::new();

        if test.name.trim().is_empty() {
            result.add_error("Test name cannot be empty");
        }
        if !test.stack.directory.is_dir() {
            result.add_error(format!(
                "Test '{}': stack directory {:?} does not exist",
                test.name, test.stack.directory
            ));
        }
        if test.checks.is_empty() {
            result.add_warning(format!("Test '{}' has no checks", test.name));
        }

        for pattern in &test.stack.options.retryable_errors {
            if let Err(e) = Regex::new(pattern) {
                result.add_error(format!(
                    "Test '{}': retryable error pattern '{}' is invalid: {}",
                    test.name, pattern, e
                ));
            }
        }

        if let Some(namespace) = &test.stack.namespace {
            if namespace.variable.trim().is_empty() {
                result.add_error(format!("Test '{}': namespace variable is empty", test.name));
            }
        }

        let mut check_names = HashSet::new();
        for check in &test.checks {
            if !check_names.insert(check.name.as_str()) {
                result.add_error(format!(
                    "Test '{}': duplicate check name '{}'",
                    test.name, check.name
                ));
            }
            result.merge(Self::validate_check(&test.name, check));
        }

        result
    }

    pub fn validate_check(test: &str, check: &CheckSpec) -> ValidationResult {
        let mut result = ValidationResult::new();
        let label = format!("Test '{}', check '{}'", test, check.name);

        match check.target() {
            Err(e) => result.add_error(format!("{}: {}", label, e)),
            Ok(CheckTarget::Output(_)) => {
                if check.absent {
                    result.add_error(format!("{}: 'absent' only applies to resources", label));
                }
                if check.expect.is_none() {
                    result.add_error(format!("{}: output checks need 'expect'", label));
                }
            }
            Ok(CheckTarget::Resource(resource)) => {
                match (&resource.output, &resource.id) {
                    (None, None) => result.add_error(format!(
                        "{}: resource needs an 'output' or 'id' to identify it",
                        label
                    )),
                    (Some(_), Some(_)) => result.add_error(format!(
                        "{}: resource sets both 'output' and 'id'",
                        label
                    )),
                    _ => {}
                }
                if check.absent && (check.expect.is_some() || check.field.is_some()) {
                    result.add_warning(format!(
                        "{}: 'expect' and 'field' are ignored when 'absent' is set",
                        label
                    ));
                }
                if check.field.is_some() && check.expect.is_none() && !check.absent {
                    result.add_error(format!("{}: 'field' without 'expect'", label));
                }
            }
        }

        if let Some(Predicate::Matches(pattern)) = &check.expect {
            if let Err(e) = Regex::new(pattern) {
                result.add_error(format!("{}: invalid regex '{}': {}", label, pattern, e));
            }
        }

        result
    }
}
