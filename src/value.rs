// src/value.rs

//! Literal values bound to task inputs and produced as task outputs.
//!
//! Every value has a canonical byte encoding that feeds the fingerprint:
//! - one tag byte per variant
//! - big-endian lengths and integers
//! - floats by IEEE-754 bits, with `-0.0` folded into `0.0`
//! - map entries in key order (guaranteed by `BTreeMap`)
//!
//! Non-finite floats have no canonical form and are rejected.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Type descriptor for task parameters and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    Map,
}

impl ValueType {
    /// Whether a concrete value may be bound where this type is declared.
    pub fn accepts(self, value: &Value) -> bool {
        self.accepts_type(value.value_type())
    }

    /// Whether values of type `other` may flow into a slot of this type.
    pub fn accepts_type(self, other: ValueType) -> bool {
        self == ValueType::Any || self == other
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "any",
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::Bytes => "bytes",
            ValueType::List => "list",
            ValueType::Map => "map",
        };
        f.write_str(name)
    }
}

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_STR: u8 = 0x05;
const TAG_BYTES: u8 = 0x06;
const TAG_LIST: u8 = 0x07;
const TAG_MAP: u8 = 0x08;

impl Value {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(data.into())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Bytes(_) => ValueType::Bytes,
            Value::List(_) => ValueType::List,
            Value::Map(_) => ValueType::Map,
        }
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

    /// Numeric view of `Int` and `Float` values.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Append the canonical encoding of this value to `out`.
    pub fn encode_canonical(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(false) => out.push(TAG_FALSE),
            Value::Bool(true) => out.push(TAG_TRUE),
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_be_bytes());
            }
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(EngineError::Serialization(format!(
                        "float {f} has no canonical representation"
                    )));
                }
                // -0.0 == 0.0 but their bit patterns differ.
                let normalised = if *f == 0.0 { 0.0f64 } else { *f };
                out.push(TAG_FLOAT);
                out.extend_from_slice(&normalised.to_bits().to_be_bytes());
            }
            Value::Str(s) => {
                out.push(TAG_STR);
                write_len_prefixed(out, s.as_bytes());
            }
            Value::Bytes(b) => {
                out.push(TAG_BYTES);
                write_len_prefixed(out, b);
            }
            Value::List(items) => {
                out.push(TAG_LIST);
                out.extend_from_slice(&(items.len() as u64).to_be_bytes());
                for item in items {
                    item.encode_canonical(out)?;
                }
            }
            Value::Map(map) => {
                out.push(TAG_MAP);
                out.extend_from_slice(&(map.len() as u64).to_be_bytes());
                for (key, value) in map {
                    write_len_prefixed(out, key.as_bytes());
                    value.encode_canonical(out)?;
                }
            }
        }
        Ok(())
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_canonical(&mut out)?;
        Ok(out)
    }

    /// Partial order used by range predicates.
    ///
    /// Ints and floats compare numerically with each other; other variants
    /// only compare within the same variant.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

pub(crate) fn write_len_prefixed(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u64).to_be_bytes());
    out.extend_from_slice(data);
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_encodes_like_zero() {
        let a = Value::Float(0.0).canonical_bytes().unwrap();
        let b = Value::Float(-0.0).canonical_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let nested = Value::List(vec![Value::Int(1), Value::Float(f)]);
            assert!(matches!(
                nested.canonical_bytes(),
                Err(EngineError::Serialization(_))
            ));
        }
    }

    #[test]
    fn int_and_float_encode_differently() {
        let a = Value::Int(1).canonical_bytes().unwrap();
        let b = Value::Float(1.0).canonical_bytes().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn string_boundaries_are_unambiguous() {
        let a = Value::List(vec!["ab".into(), "c".into()]);
        let b = Value::List(vec!["a".into(), "bc".into()]);
        assert_ne!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
    }

    #[test]
    fn type_acceptance() {
        assert!(ValueType::Any.accepts(&Value::Str("x".into())));
        assert!(ValueType::Int.accepts(&Value::Int(3)));
        assert!(!ValueType::Int.accepts(&Value::Float(3.0)));
        assert!(ValueType::Any.accepts_type(ValueType::Map));
        assert!(!ValueType::Str.accepts_type(ValueType::Any));
    }

    #[test]
    fn numbers_compare_across_variants() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Str("a".into()).compare(&Value::Int(1)), None);
    }
}
