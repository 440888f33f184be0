//! # probe_spec
//!
//! Declarative model for stackprobe: what stack to provision, with which
//! variables, and which checks to run against it.
//!
//! ## Features
//!
//! - **Tagged values**: [`Value`] carries variables, outputs and probed fields
//! - **Stack configuration**: [`StackConfig`] with per-test namespace isolation
//! - **Checks and predicates**: [`CheckSpec`] targets an output or a live resource
//! - **Suites**: YAML suite files read by [`SuiteReader`] and linted by [`SuiteValidator`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use probe_spec::{SuiteReader, SuiteValidator};
//!
//! let suite = SuiteReader::read("tests/playground.yaml").unwrap();
//! let result = SuiteValidator::validate(&suite);
//! for error in &result.errors {
//!     eprintln!("Error: {}", error);
//! }
//! ```

pub mod check;
pub mod error;
pub mod predicate;
pub mod reader;
pub mod stack;
pub mod suite;
pub mod validator;
pub mod value;

pub use check::{CheckSpec, CheckTarget, ResourceKind, ResourceRef};
pub use error::{SpecError, SpecResult};
pub use predicate::{CustomPredicate, Predicate};
pub use reader::SuiteReader;
pub use stack::{NamespaceSpec, StackConfig, StackOptions, DEFAULT_RETRYABLE_ERRORS};
pub use suite::{Settings, Suite, TestCase, ToolSettings};
pub use validator::{SuiteValidator, ValidationResult};
pub use value::Value;
