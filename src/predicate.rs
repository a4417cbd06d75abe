//! Predicate builder
//!
//! Conditions over a single attribute, used by `search`, `count`,
//! `group_del` and as the guard of `condput`.
//!
//! ## Semantics
//! - `Equals` is what a raw value means inside a filter
//! - `LessThan` / `GreaterThan` are strict, `LessEqual` / `GreaterEqual` inclusive
//! - `Range(lo, hi)` is inclusive on both ends
//! - `Regex` matches anywhere in the string unless the pattern anchors itself
//! - `Length*` compare the length of a string (bytes) or collection
//! - `Contains` tests list/set membership or map key presence
//!
//! Building a predicate never fails. Type mismatches against the target
//! attribute are reported when the operation is built, before any I/O.

use std::cmp::Ordering;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpaceError};
use crate::schema::Schema;
use crate::value::{Attributes, DataType, Value};

/// A condition over one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    Equals(Value),
    LessThan(Value),
    LessEqual(Value),
    GreaterThan(Value),
    GreaterEqual(Value),
    Range(Value, Value),
    Regex(String),
    LengthEquals(u64),
    LengthLessEqual(u64),
    LengthGreaterEqual(u64),
    Contains(Value),
}

impl Predicate {
    pub fn equals(v: impl Into<Value>) -> Self {
        Predicate::Equals(v.into())
    }

    pub fn lt(v: impl Into<Value>) -> Self {
        Predicate::LessThan(v.into())
    }

    pub fn le(v: impl Into<Value>) -> Self {
        Predicate::LessEqual(v.into())
    }

    pub fn gt(v: impl Into<Value>) -> Self {
        Predicate::GreaterThan(v.into())
    }

    pub fn ge(v: impl Into<Value>) -> Self {
        Predicate::GreaterEqual(v.into())
    }

    /// Inclusive on both ends
    pub fn range(lo: impl Into<Value>, hi: impl Into<Value>) -> Self {
        Predicate::Range(lo.into(), hi.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Predicate::Regex(pattern.into())
    }

    pub fn length_eq(n: u64) -> Self {
        Predicate::LengthEquals(n)
    }

    pub fn length_le(n: u64) -> Self {
        Predicate::LengthLessEqual(n)
    }

    pub fn length_ge(n: u64) -> Self {
        Predicate::LengthGreaterEqual(n)
    }

    pub fn contains(v: impl Into<Value>) -> Self {
        Predicate::Contains(v.into())
    }

    /// Check this predicate can be applied to an attribute of `datatype`
    pub fn validate(&self, attribute: &str, datatype: &DataType) -> Result<()> {
        let wrong = |message: String| SpaceError::WrongType {
            attribute: attribute.to_string(),
            message,
        };

        match self {
            Predicate::Equals(v) => {
                if !datatype.conforms(v) {
                    return Err(wrong(format!("cannot compare {} with {}", datatype, v)));
                }
            }
            Predicate::LessThan(v)
            | Predicate::LessEqual(v)
            | Predicate::GreaterThan(v)
            | Predicate::GreaterEqual(v) => {
                if !datatype.is_ordered() {
                    return Err(wrong(format!("{} is not ordered", datatype)));
                }
                if !datatype.conforms(v) {
                    return Err(wrong(format!("cannot compare {} with {}", datatype, v)));
                }
            }
            Predicate::Range(lo, hi) => {
                if !datatype.is_ordered() {
                    return Err(wrong(format!("{} is not ordered", datatype)));
                }
                if !datatype.conforms(lo) || !datatype.conforms(hi) {
                    return Err(wrong(format!("range bounds must be {}", datatype)));
                }
            }
            Predicate::Regex(pattern) => {
                if *datatype != DataType::String {
                    return Err(wrong(format!("regex needs a string, attribute is {}", datatype)));
                }
                Regex::new(pattern).map_err(|e| {
                    SpaceError::Validation(format!("Invalid regex pattern: {}", e))
                })?;
            }
            Predicate::LengthEquals(_)
            | Predicate::LengthLessEqual(_)
            | Predicate::LengthGreaterEqual(_) => {
                if !datatype.has_length() {
                    return Err(wrong(format!("{} has no length", datatype)));
                }
            }
            Predicate::Contains(v) => match datatype.member() {
                Some(member) if member.conforms(v) => {}
                Some(member) => {
                    return Err(wrong(format!("members are {}, got {}", member, v)));
                }
                None => return Err(wrong(format!("{} is not a container", datatype))),
            },
        }
        Ok(())
    }

    /// Evaluate against a value. Regex patterns are compiled per call; use a
    /// `CompiledFilter` when evaluating many records.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Regex(pattern) => match (Regex::new(pattern), value) {
                (Ok(re), Value::String(s)) => re.is_match(s),
                _ => false,
            },
            other => other.matches_plain(value),
        }
    }

    fn matches_plain(&self, value: &Value) -> bool {
        let same_kind = |bound: &Value| bound.kind_name() == value.kind_name();
        let length = || value.len().map(|n| n as u64);

        match self {
            Predicate::Equals(v) => match (value, v) {
                (Value::Float(_), Value::Float(_)) => compare(value, v) == Ordering::Equal,
                _ => value == v,
            },
            Predicate::LessThan(v) => same_kind(v) && compare(value, v) == Ordering::Less,
            Predicate::LessEqual(v) => same_kind(v) && compare(value, v) != Ordering::Greater,
            Predicate::GreaterThan(v) => same_kind(v) && compare(value, v) == Ordering::Greater,
            Predicate::GreaterEqual(v) => same_kind(v) && compare(value, v) != Ordering::Less,
            Predicate::Range(lo, hi) => {
                same_kind(lo)
                    && same_kind(hi)
                    && compare(value, lo) != Ordering::Less
                    && compare(value, hi) != Ordering::Greater
            }
            Predicate::Regex(_) => false,
            Predicate::LengthEquals(n) => length() == Some(*n),
            Predicate::LengthLessEqual(n) => length().map_or(false, |len| len <= *n),
            Predicate::LengthGreaterEqual(n) => length().map_or(false, |len| len >= *n),
            Predicate::Contains(v) => match value {
                Value::List(items) => items.contains(v),
                Value::Set(items) => items.contains(v),
                Value::Map(entries) => entries.contains_key(v),
                _ => false,
            },
        }
    }
}

/// Order used by comparisons: IEEE for floats, so `-0.0` equals `0.0`
///
/// NaN has no IEEE order and falls back to the total order of `Value`.
fn compare(value: &Value, bound: &Value) -> Ordering {
    match (value, bound) {
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
        _ => value.cmp(bound),
    }
}

impl From<Value> for Predicate {
    fn from(v: Value) -> Self {
        Predicate::Equals(v)
    }
}

impl From<i64> for Predicate {
    fn from(v: i64) -> Self {
        Predicate::Equals(v.into())
    }
}

impl From<i32> for Predicate {
    fn from(v: i32) -> Self {
        Predicate::Equals(v.into())
    }
}

impl From<f64> for Predicate {
    fn from(v: f64) -> Self {
        Predicate::Equals(v.into())
    }
}

impl From<&str> for Predicate {
    fn from(v: &str) -> Self {
        Predicate::Equals(v.into())
    }
}

impl From<String> for Predicate {
    fn from(v: String) -> Self {
        Predicate::Equals(v.into())
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Conjunction of per-attribute predicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    checks: Vec<(String, Predicate)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition; an attribute may appear more than once
    pub fn with(mut self, attribute: impl Into<String>, predicate: impl Into<Predicate>) -> Self {
        self.checks.push((attribute.into(), predicate.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.checks.iter().map(|(a, p)| (a.as_str(), p))
    }

    /// Check every condition against the space's declared types
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for (attribute, predicate) in &self.checks {
            let datatype = schema.require(attribute)?;
            predicate.validate(attribute, &datatype)?;
        }
        Ok(())
    }

    /// Compile regexes once for repeated evaluation
    pub fn compile(&self) -> Result<CompiledFilter> {
        let checks = self
            .checks
            .iter()
            .map(|(attribute, predicate)| {
                let compiled = match predicate {
                    Predicate::Regex(pattern) => Compiled::Regex(Regex::new(pattern).map_err(|e| {
                        SpaceError::Validation(format!("Invalid regex pattern: {}", e))
                    })?),
                    other => Compiled::Plain(other.clone()),
                };
                Ok((attribute.clone(), compiled))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledFilter { checks })
    }
}

impl<S: Into<String>, P: Into<Predicate>> FromIterator<(S, P)> for Filter {
    fn from_iter<I: IntoIterator<Item = (S, P)>>(iter: I) -> Self {
        Self {
            checks: iter
                .into_iter()
                .map(|(a, p)| (a.into(), p.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Filter {
    type Item = (String, Predicate);
    type IntoIter = std::vec::IntoIter<(String, Predicate)>;

    fn into_iter(self) -> Self::IntoIter {
        self.checks.into_iter()
    }
}

/// A filter ready for evaluation against many records
pub struct CompiledFilter {
    checks: Vec<(String, Compiled)>,
}

enum Compiled {
    Plain(Predicate),
    Regex(Regex),
}

impl CompiledFilter {
    /// True when every condition holds. Missing attributes never match.
    pub fn matches(&self, record: &Attributes) -> bool {
        self.checks.iter().all(|(attribute, check)| {
            let Some(value) = record.get(attribute) else {
                return false;
            };
            match check {
                Compiled::Plain(p) => p.matches_plain(value),
                Compiled::Regex(re) => value.as_str().map_or(false, |s| re.is_match(s)),
            }
        })
    }
}
