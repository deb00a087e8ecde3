//! The fact store: field name -> current value, as seen by rule conditions.

use std::collections::BTreeMap;

use crate::types::{DataType, Value};

/// Mutable mapping of field names to values.
///
/// Owned by one [`FormEngine`](crate::FormEngine); evaluators receive it by
/// reference during a fire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactStore(BTreeMap<String, Value>);

impl FactStore {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Current value of a fact. Unknown facts read as `None`, which is
    /// distinct from a fact explicitly holding [`Value::Absent`].
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert or overwrite a fact, returning the previous value.
    pub fn put(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    /// Seed the type default for `name` unless a value is already present.
    /// Returns true when a default was written.
    pub fn seed_default(&mut self, name: &str, data_type: DataType) -> bool {
        if self.0.contains_key(name) {
            return false;
        }
        self.0.insert(name.to_string(), data_type.default_value());
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
