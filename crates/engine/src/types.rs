//! Runtime values and declared data types.
//!
//! A field value is polymorphic: boolean, number, text, list, mapping, or
//! absent. Numbers are `rust_decimal::Decimal` -- never `f64` -- so the
//! dispatcher's equality check is exact (`70` and `70.0` are the same value).

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// Current value of a field or fact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Absent,
    Bool(bool),
    Number(Decimal),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns a human-readable type name for log and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "Absent",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// True for values a required field must not hold: absent, blank text,
    /// and empty collections.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Absent => true,
            Value::Text(t) => t.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Convert a JSON value. `null` becomes [`Value::Absent`]; numbers are
    /// read through their decimal text so `0.1` stays exact.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Absent,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
                    .or_else(|| n.as_f64().and_then(Decimal::from_f64))
                    .map(Value::Number)
                    .unwrap_or(Value::Absent)
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to plain JSON for output. Integral numbers are written as
    /// JSON integers; other numbers go through `f64`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Absent => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Text(t) => serde_json::Value::String(t.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: Decimal) -> serde_json::Value {
    if n.fract().is_zero() {
        if let Some(i) = n.to_i64() {
            return serde_json::Value::from(i);
        }
    }
    n.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(n.to_string()))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "absent"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n.normalize()),
            Value::Text(t) => write!(f, "{:?}", t),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// ──────────────────────────────────────────────
// Declared data types
// ──────────────────────────────────────────────

/// Declared type of a field, used to seed facts and to reset hidden fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Text,
    Bool,
    Number,
    List,
    Map,
}

impl DataType {
    /// Parse a type name case-insensitively. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<DataType> {
        match name.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Some(DataType::Text),
            "BOOL" => Some(DataType::Bool),
            "NUMBER" => Some(DataType::Number),
            "LIST" => Some(DataType::List),
            "MAP" => Some(DataType::Map),
            _ => None,
        }
    }

    /// The empty representation of this type.
    pub fn default_value(self) -> Value {
        match self {
            DataType::Bool => Value::Bool(false),
            DataType::Number => Value::Number(Decimal::ZERO),
            DataType::Text => Value::Absent,
            DataType::List => Value::List(Vec::new()),
            DataType::Map => Value::Map(BTreeMap::new()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Text => "text",
            DataType::Bool => "bool",
            DataType::Number => "number",
            DataType::List => "list",
            DataType::Map => "map",
        };
        write!(f, "{}", name)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
