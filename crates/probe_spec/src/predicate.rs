//! Pure predicates over observed values.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Expectation applied to an observed value.
///
/// In YAML, unit predicates are plain strings (`not_empty`) and the rest are
/// single-key maps (`{ equals: t3.micro }`, `{ in_range: { min: 1, max: 3 } }`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Equals(Value),
    NotEquals(Value),
    NotEmpty,
    Empty,
    OneOf(Vec<Value>),
    InRange {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Substring for strings, element for lists, key for maps. A map needle
    /// matches any list element holding all of its entries.
    Contains(Value),
    Excludes(Value),
    Matches(String),
    #[serde(skip)]
    Custom(CustomPredicate),
}

/// Named closure predicate for suites built in code.
#[derive(Clone)]
pub struct CustomPredicate {
    pub name: String,
    check: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate").field("name", &self.name).finish()
    }
}

impl Predicate {
    pub fn equals(value: impl Into<Value>) -> Self {
        Predicate::Equals(value.into())
    }

    pub fn contains(value: impl Into<Value>) -> Self {
        Predicate::Contains(value.into())
    }

    pub fn excludes(value: impl Into<Value>) -> Self {
        Predicate::Excludes(value.into())
    }

    pub fn between(min: f64, max: f64) -> Self {
        Predicate::InRange {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom(CustomPredicate {
            name: name.into(),
            check: Arc::new(check),
        })
    }

    pub fn evaluate(&self, actual: &Value) -> bool {
        match self {
            Predicate::Equals(expected) => actual.loosely_equals(expected),
            Predicate::NotEquals(expected) => !actual.loosely_equals(expected),
            Predicate::NotEmpty => !actual.is_empty(),
            Predicate::Empty => actual.is_empty(),
            Predicate::OneOf(options) => options.iter().any(|o| actual.loosely_equals(o)),
            Predicate::InRange { min, max } => actual.as_f64().is_some_and(|n| {
                min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi)
            }),
            Predicate::Contains(needle) => contains(actual, needle),
            Predicate::Excludes(needle) => !contains(actual, needle),
            Predicate::Matches(pattern) => Regex::new(pattern)
                .map(|re| re.is_match(&actual.to_string()))
                .unwrap_or(false),
            Predicate::Custom(custom) => (custom.check)(actual),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Predicate::Equals(v) => format!("== {}", v),
            Predicate::NotEquals(v) => format!("!= {}", v),
            Predicate::NotEmpty => "not empty".to_string(),
            Predicate::Empty => "empty".to_string(),
            Predicate::OneOf(options) => format!(
                "one of [{}]",
                options.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
            ),
            Predicate::InRange { min, max } => format!(
                "in [{}, {}]",
                min.map_or("-inf".to_string(), |v| v.to_string()),
                max.map_or("+inf".to_string(), |v| v.to_string())
            ),
            Predicate::Contains(v) => format!("contains {}", v),
            Predicate::Excludes(v) => format!("excludes {}", v),
            Predicate::Matches(pattern) => format!("matches /{}/", pattern),
            Predicate::Custom(custom) => custom.name.clone(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(s), _) => s.contains(&needle.to_string()),
        (Value::List(items), Value::Map(subset)) => items.iter().any(|item| covers(item, subset)),
        (Value::List(items), _) => items.iter().any(|item| item.loosely_equals(needle)),
        (Value::Map(map), _) => map.contains_key(&needle.to_string()),
        _ => false,
    }
}

/// Whether a list element satisfies every entry of a map needle.
///
/// Elements carrying `from_port` describe a port range: a needle `port`
/// matches anywhere inside it, and a null bound leaves that side open. An
/// element whose protocol is `all` matches any needle protocol.
fn covers(item: &Value, subset: &BTreeMap<String, Value>) -> bool {
    let Some(map) = item.as_map() else {
        return false;
    };
    subset.iter().all(|(key, wanted)| match key.as_str() {
        "port" if map.contains_key("from_port") => port_in_range(map, wanted),
        "protocol" if any_protocol(map.get("protocol")) => true,
        _ => map.get(key).is_some_and(|actual| actual.loosely_equals(wanted)),
    })
}

fn any_protocol(protocol: Option<&Value>) -> bool {
    matches!(protocol.and_then(Value::as_str), Some("all" | "-1"))
}

fn port_in_range(rule: &BTreeMap<String, Value>, wanted: &Value) -> bool {
    let Some(port) = wanted.as_f64() else {
        return false;
    };
    let bound = |key: &str| rule.get(key).and_then(Value::as_f64);
    bound("from_port").map_or(true, |from| from <= port)
        && bound("to_port").map_or(true, |to| port <= to)
}
