//! GraphBinary value types.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A value that can travel inside a request or response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphValue {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 string
    String(String),
    /// UUID
    Uuid(Uuid),
    /// UTC date-time
    DateTime(DateTime<Utc>),
    /// Byte array
    Binary(Vec<u8>),
    /// Ordered list
    List(Vec<GraphValue>),
    /// Set (insertion order kept, uniqueness not enforced on decode)
    Set(Vec<GraphValue>),
    /// Map with arbitrary keys, in wire order
    Map(Vec<(GraphValue, GraphValue)>),
}

impl GraphValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, GraphValue::Null)
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GraphValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as a 64-bit integer. Ints are widened.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GraphValue::Int(i) => Some(*i as i64),
            GraphValue::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Try to get as float. Integers are converted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GraphValue::Double(d) => Some(*d),
            GraphValue::Int(i) => Some(*i as f64),
            GraphValue::Long(l) => Some(*l as f64),
            _ => None,
        }
    }

    /// Try to get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GraphValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the elements of a list or set.
    pub fn as_list(&self) -> Option<&[GraphValue]> {
        match self {
            GraphValue::List(items) | GraphValue::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get map entries.
    pub fn as_map(&self) -> Option<&[(GraphValue, GraphValue)]> {
        match self {
            GraphValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a map entry by string key.
    pub fn get(&self, key: &str) -> Option<&GraphValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Build a map value from string-keyed entries.
    pub fn from_string_map(map: HashMap<String, GraphValue>) -> Self {
        GraphValue::Map(
            map.into_iter()
                .map(|(k, v)| (GraphValue::String(k), v))
                .collect(),
        )
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            GraphValue::Null => "Null",
            GraphValue::Boolean(_) => "Boolean",
            GraphValue::Int(_) => "Int",
            GraphValue::Long(_) => "Long",
            GraphValue::Double(_) => "Double",
            GraphValue::String(_) => "String",
            GraphValue::Uuid(_) => "Uuid",
            GraphValue::DateTime(_) => "DateTime",
            GraphValue::Binary(_) => "Binary",
            GraphValue::List(_) => "List",
            GraphValue::Set(_) => "Set",
            GraphValue::Map(_) => "Map",
        }
    }
}

impl Default for GraphValue {
    fn default() -> Self {
        GraphValue::Null
    }
}

impl fmt::Display for GraphValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphValue::Null => write!(f, "null"),
            GraphValue::Boolean(b) => write!(f, "{}", b),
            GraphValue::Int(i) => write!(f, "{}", i),
            GraphValue::Long(l) => write!(f, "{}", l),
            GraphValue::Double(d) => write!(f, "{}", d),
            GraphValue::String(s) => write!(f, "{:?}", s),
            GraphValue::Uuid(u) => write!(f, "{}", u),
            GraphValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            GraphValue::Binary(b) => write!(f, "<{} bytes>", b.len()),
            GraphValue::List(items) | GraphValue::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            GraphValue::Map(entries) => {
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

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for GraphValue {
    fn from(v: bool) -> Self {
        GraphValue::Boolean(v)
    }
}

impl From<i32> for GraphValue {
    fn from(v: i32) -> Self {
        GraphValue::Int(v)
    }
}

impl From<i64> for GraphValue {
    fn from(v: i64) -> Self {
        GraphValue::Long(v)
    }
}

impl From<f64> for GraphValue {
    fn from(v: f64) -> Self {
        GraphValue::Double(v)
    }
}

impl From<&str> for GraphValue {
    fn from(v: &str) -> Self {
        GraphValue::String(v.to_string())
    }
}

impl From<String> for GraphValue {
    fn from(v: String) -> Self {
        GraphValue::String(v)
    }
}

impl From<Uuid> for GraphValue {
    fn from(v: Uuid) -> Self {
        GraphValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for GraphValue {
    fn from(v: DateTime<Utc>) -> Self {
        GraphValue::DateTime(v)
    }
}

impl<T: Into<GraphValue>> From<Vec<T>> for GraphValue {
    fn from(v: Vec<T>) -> Self {
        GraphValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<GraphValue>> From<Option<T>> for GraphValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(GraphValue::Null)
    }
}
