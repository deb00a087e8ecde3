//! Field records and field-level validation.
//!
//! Widgets belong to the host's view layer. The engine keeps one
//! [`FieldRecord`] per field: the declaration it was built from plus the last
//! value, metadata and visibility reported through the dispatcher.

use formwire_interchange::{FieldDefinition, RequiredStatus};

use crate::types::{DataType, Value};

const DEFAULT_REQUIRED_MESSAGE: &str = "This field is required";

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub name: String,
    /// Widget kind from the form declaration; empty for undeclared fields.
    pub field_type: String,
    pub data_type: Option<DataType>,
    pub value: Value,
    pub metadata: Option<Value>,
    pub visible: bool,
    /// Calculated fields this field feeds.
    pub calculations: Vec<String>,
    pub required: Option<RequiredStatus>,
    /// Message of the last failed validation.
    pub error: Option<String>,
}

impl FieldRecord {
    pub fn from_definition(def: &FieldDefinition) -> Self {
        Self {
            name: def.name.clone(),
            field_type: def.field_type.clone(),
            data_type: def.data_type.as_deref().and_then(DataType::parse),
            value: Value::Absent,
            metadata: None,
            visible: true,
            calculations: def.calculations.clone(),
            required: def.required_status.clone(),
            error: None,
        }
    }

    /// A record for a name with no declaration, e.g. a calculation target
    /// that is not rendered as a field.
    pub fn undeclared(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: String::new(),
            data_type: None,
            value: Value::Absent,
            metadata: None,
            visible: true,
            calculations: Vec::new(),
            required: None,
            error: None,
        }
    }

    /// The value a hidden field is reset to. `declared` is the type given
    /// where the field is watched as a subject; the field's own type wins.
    pub fn empty_value(&self, declared: Option<DataType>) -> Value {
        self.data_type
            .or(declared)
            .map(DataType::default_value)
            .unwrap_or(Value::Absent)
    }

    pub fn is_required(&self) -> bool {
        self.required.as_ref().is_some_and(|r| r.required)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.field_type,
            "value": self.value.to_json(),
            "metadata": self.metadata.as_ref().map(Value::to_json),
            "visible": self.visible,
        })
    }
}

/// Field-level validation run by the dispatcher on every accepted change.
pub trait Validator {
    /// `Err(message)` when the field's current state is invalid.
    fn validate(&self, field: &FieldRecord) -> Result<(), String>;
}

/// Fails required, visible fields holding an empty value.
///
/// Hidden fields always pass: their value has been reset on purpose.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequiredValidator;

impl Validator for RequiredValidator {
    fn validate(&self, field: &FieldRecord) -> Result<(), String> {
        if field.is_required() && field.visible && field.value.is_empty() {
            let message = field
                .required
                .as_ref()
                .and_then(|r| r.message.clone())
                .unwrap_or_else(|| DEFAULT_REQUIRED_MESSAGE.to_string());
            return Err(message);
        }
        Ok(())
    }
}
