//! Field values and field maps
//!
//! Entities and revisions are stored as [`Fields`]: an ordered map from
//! column name to [`Value`]. Ordering keeps encoded commit records and debug
//! output deterministic.
//!
//! Different variants are never equal (`Int(1) != Float(1.0)`), and floats
//! follow IEEE-754 equality.

use crate::error::{AnnalsError, AnnalsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL-style null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Value {
    /// Variant name, used in type-mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
        }
    }

    /// True for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[u8] if this is a Bytes value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered column map of an entity or revision row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// Empty field map
    pub fn new() -> Self {
        Fields(BTreeMap::new())
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a column, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Column by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Remove a column
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no columns are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate columns in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Nullable string column; missing and `Null` both read as `None`
    pub fn opt_str(&self, name: &str) -> AnnalsResult<Option<&str>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(type_mismatch(name, "String", other)),
        }
    }

    /// Non-null string column
    pub fn str(&self, name: &str) -> AnnalsResult<&str> {
        self.opt_str(name)?.ok_or_else(|| missing(name))
    }

    /// Nullable integer column
    pub fn opt_int(&self, name: &str) -> AnnalsResult<Option<i64>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(other) => Err(type_mismatch(name, "Int", other)),
        }
    }

    /// Non-null integer column
    pub fn int(&self, name: &str) -> AnnalsResult<i64> {
        self.opt_int(name)?.ok_or_else(|| missing(name))
    }

    /// Nullable boolean column
    pub fn opt_bool(&self, name: &str) -> AnnalsResult<Option<bool>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(type_mismatch(name, "Bool", other)),
        }
    }

    /// Nullable float column
    pub fn opt_float(&self, name: &str) -> AnnalsResult<Option<f64>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Float(f)) => Ok(Some(*f)),
            Some(other) => Err(type_mismatch(name, "Float", other)),
        }
    }
}

impl FromIterator<(String, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Fields(iter.into_iter().collect())
    }
}

fn type_mismatch(name: &str, expected: &str, actual: &Value) -> AnnalsError {
    AnnalsError::invalid_input(format!(
        "column '{}' expected {}, found {}",
        name,
        expected,
        actual.type_name()
    ))
}

fn missing(name: &str) -> AnnalsError {
    AnnalsError::invalid_input(format!("column '{}' is null or missing", name))
}
