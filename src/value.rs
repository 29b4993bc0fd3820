//! Canonical value representation carried by traversers, bytecode arguments,
//! and element properties.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::error::TraversalError;
use crate::structure::{Edge, Vertex};

/// Typed value tagged with explicit type information so the wire format remains
/// unambiguous across engines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed map of values.
    Map(BTreeMap<String, Value>),
    /// Vertex reference.
    Vertex(Vertex),
    /// Edge reference.
    Edge(Edge),
}

impl Value {
    /// Returns the string payload when this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload when this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true for vertex and edge values.
    pub fn is_element(&self) -> bool {
        matches!(self, Value::Vertex(_) | Value::Edge(_))
    }

    /// Interprets the value as an element identifier.
    pub fn as_element_id(&self) -> Option<u64> {
        match self {
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            Value::Vertex(v) => Some(v.id().0),
            Value::Edge(e) => Some(e.id().0),
            _ => None,
        }
    }

    /// Feeds a type-tagged encoding of the value into `hasher`.
    ///
    /// Elements hash by kind and id only, matching their equality.
    pub fn hash_into(&self, hasher: &mut Xxh64) {
        match self {
            Value::Null => hasher.write_u8(0),
            Value::Bool(v) => {
                hasher.write_u8(1);
                hasher.write_u8(*v as u8);
            }
            Value::Int(v) => {
                hasher.write_u8(2);
                hasher.write_i64(*v);
            }
            Value::Float(v) => {
                hasher.write_u8(3);
                hasher.write_u64(v.to_bits());
            }
            Value::String(s) => {
                hasher.write_u8(4);
                hasher.write_u64(s.len() as u64);
                hasher.write(s.as_bytes());
            }
            Value::List(items) => {
                hasher.write_u8(5);
                hasher.write_u64(items.len() as u64);
                for item in items {
                    item.hash_into(hasher);
                }
            }
            Value::Map(entries) => {
                hasher.write_u8(6);
                hasher.write_u64(entries.len() as u64);
                for (key, value) in entries {
                    hasher.write(key.as_bytes());
                    value.hash_into(hasher);
                }
            }
            Value::Vertex(v) => {
                hasher.write_u8(7);
                hasher.write_u64(v.id().0);
            }
            Value::Edge(e) => {
                hasher.write_u8(8);
                hasher.write_u64(e.id().0);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Value::Vertex(v) => write!(f, "{v}"),
            Value::Edge(e) => write!(f, "{e}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl TryFrom<u64> for Value {
    type Error = TraversalError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Value::Int)
            .map_err(|_| TraversalError::Invalid("integer does not fit in a signed 64-bit value"))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vertex> for Value {
    fn from(value: Vertex) -> Self {
        Value::Vertex(value)
    }
}

impl From<Edge> for Value {
    fn from(value: Edge) -> Self {
        Value::Edge(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(value: &Value) -> u64 {
        let mut hasher = Xxh64::new(0);
        value.hash_into(&mut hasher);
        hasher.digest()
    }

    #[test]
    fn tagged_wire_form() {
        let json = serde_json::to_string(&Value::Int(7)).unwrap();
        assert_eq!(json, r#"{"t":"Int","v":7}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Int(7));
    }

    #[test]
    fn hashing_distinguishes_types() {
        assert_ne!(digest(&Value::Int(1)), digest(&Value::Bool(true)));
        assert_ne!(
            digest(&Value::from("ab")),
            digest(&Value::List(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(digest(&Value::from("x")), digest(&Value::from("x")));
    }

    #[test]
    fn unsigned_integers_never_wrap() {
        assert_eq!(Value::try_from(i64::MAX as u64).unwrap(), Value::Int(i64::MAX));
        let err = Value::try_from(u64::MAX).unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
    }
}
