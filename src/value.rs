//! Attribute values and their declared types
//!
//! `Value` is the closed set of things an attribute can hold. Collections are
//! homogeneous; homogeneity is checked against the declared `DataType` when
//! an operation is built, not when it executes.
//!
//! Values carry a total order (floats use `f64::total_cmp`) so they can be
//! record keys, set members and map keys.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpaceError};

/// A record: attribute name to value
pub type Attributes = BTreeMap<String, Value>;

/// One attribute value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<Value, Value>),
}

impl Value {
    /// Build a list from anything convertible to values
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a set; duplicates collapse
    pub fn set<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    /// Build a map from key/value pairs
    pub fn map<K: Into<Value>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Length of a string (in bytes) or collection; `None` for numbers
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::List(l) => Some(l.len()),
            Value::Set(s) => Some(s.len()),
            Value::Map(m) => Some(m.len()),
            Value::Int(_) | Value::Float(_) => None,
        }
    }

    /// Short name of the variant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::String(_) => 2,
            Value::List(_) => 3,
            Value::Set(_) => 4,
            Value::Map(_) => 5,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Set(items) => {
                write!(f, "{{")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v)
    }
}

impl<T: Into<Value>> From<BTreeSet<T>> for Value {
    fn from(v: BTreeSet<T>) -> Self {
        Value::set(v)
    }
}

impl<K: Into<Value>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(v: BTreeMap<K, V>) -> Self {
        Value::map(v)
    }
}

// =============================================================================
// Declared Types
// =============================================================================

/// Element type of a container, or the type of a scalar attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    String,
    Int,
    Float,
}

impl Primitive {
    pub fn zero(self) -> Value {
        match self {
            Primitive::String => Value::String(String::new()),
            Primitive::Int => Value::Int(0),
            Primitive::Float => Value::Float(0.0),
        }
    }

    pub fn conforms(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Primitive::String, Value::String(_))
                | (Primitive::Int, Value::Int(_))
                | (Primitive::Float, Value::Float(_))
        )
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::String => "string",
            Primitive::Int => "int",
            Primitive::Float => "float",
        };
        f.write_str(name)
    }
}

impl FromStr for Primitive {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "string" => Ok(Primitive::String),
            "int" | "int64" => Ok(Primitive::Int),
            "float" => Ok(Primitive::Float),
            other => Err(SpaceError::Validation(format!("Unknown primitive type: {}", other))),
        }
    }
}

/// Declared type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Int,
    Float,
    List(Primitive),
    Set(Primitive),
    Map(Primitive, Primitive),
}

impl DataType {
    /// Value taken by an attribute a `put` did not mention on a new record
    pub fn zero(&self) -> Value {
        match self {
            DataType::String => Value::String(String::new()),
            DataType::Int => Value::Int(0),
            DataType::Float => Value::Float(0.0),
            DataType::List(_) => Value::List(Vec::new()),
            DataType::Set(_) => Value::Set(BTreeSet::new()),
            DataType::Map(_, _) => Value::Map(BTreeMap::new()),
        }
    }

    /// Check that a value has exactly this type, including every element
    pub fn conforms(&self, value: &Value) -> bool {
        match (self, value) {
            (DataType::String, Value::String(_)) => true,
            (DataType::Int, Value::Int(_)) => true,
            (DataType::Float, Value::Float(_)) => true,
            (DataType::List(e), Value::List(items)) => items.iter().all(|v| e.conforms(v)),
            (DataType::Set(e), Value::Set(items)) => items.iter().all(|v| e.conforms(v)),
            (DataType::Map(k, v), Value::Map(entries)) => entries
                .iter()
                .all(|(key, val)| k.conforms(key) && v.conforms(val)),
            _ => false,
        }
    }

    /// Scalar types with a meaningful `<`
    pub fn is_ordered(&self) -> bool {
        matches!(self, DataType::String | DataType::Int | DataType::Float)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Types whose length can be tested
    pub fn has_length(&self) -> bool {
        !self.is_numeric()
    }

    /// Type of the things `Contains` looks for: list/set elements, map keys
    pub fn member(&self) -> Option<Primitive> {
        match self {
            DataType::List(e) | DataType::Set(e) => Some(*e),
            DataType::Map(k, _) => Some(*k),
            _ => None,
        }
    }

    /// The scalar view of this type, if it is one
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            DataType::String => Some(Primitive::String),
            DataType::Int => Some(Primitive::Int),
            DataType::Float => Some(Primitive::Float),
            _ => None,
        }
    }
}

impl From<Primitive> for DataType {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::String => DataType::String,
            Primitive::Int => DataType::Int,
            Primitive::Float => DataType::Float,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => f.write_str("string"),
            DataType::Int => f.write_str("int"),
            DataType::Float => f.write_str("float"),
            DataType::List(e) => write!(f, "list({})", e),
            DataType::Set(e) => write!(f, "set({})", e),
            DataType::Map(k, v) => write!(f, "map({}, {})", k, v),
        }
    }
}

impl FromStr for DataType {
    type Err = SpaceError;

    /// Parses `int`, `list(string)`, `map(string, float)` and friends
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(open) = s.find('(') else {
            return s.parse::<Primitive>().map(DataType::from);
        };
        let inner = s[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| SpaceError::Validation(format!("Unbalanced type: {}", s)))?;

        match s[..open].trim() {
            "list" => Ok(DataType::List(inner.parse()?)),
            "set" => Ok(DataType::Set(inner.parse()?)),
            "map" => {
                let (k, v) = inner.split_once(',').ok_or_else(|| {
                    SpaceError::Validation(format!("Map type needs key and value: {}", s))
                })?;
                Ok(DataType::Map(k.parse()?, v.parse()?))
            }
            other => Err(SpaceError::Validation(format!("Unknown container type: {}", other))),
        }
    }
}
