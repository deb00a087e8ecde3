//! Deserialization of rule and form documents into typed structs.
//!
//! Both entry points first decode the raw text into a `serde_json::Value`
//! tree (YAML documents are transcoded) and then walk that tree by hand,
//! so error messages can name the rule or field at fault.

use crate::types::*;
use serde::Deserialize;
use std::collections::BTreeSet;

/// Errors while reading a rule or form document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterchangeError {
    /// The text is not valid JSON/YAML.
    #[error("{format} syntax error: {message}")]
    Syntax { format: String, message: String },
    /// A required top-level field is missing.
    #[error("document missing required field: '{field}'")]
    MissingField { field: String },
    /// A rule entry is malformed.
    #[error("rule '{name}': {message}")]
    RuleError { name: String, message: String },
    /// A field declaration is malformed.
    #[error("field '{name}': {message}")]
    FieldError { name: String, message: String },
    /// The document structure is invalid.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

// ── Rule documents ──────────────────────────────────────────────────

/// Parse a rule-definition document.
///
/// JSON documents hold a top-level array of rule objects. YAML documents
/// may hold a sequence, or a `---`-separated stream with one rule per
/// document. Rule names must be unique.
pub fn parse_rules(
    text: &str,
    file_type: RulesFileType,
) -> Result<Vec<RuleDefinition>, InterchangeError> {
    let entries = match file_type {
        RulesFileType::Json => {
            let doc: serde_json::Value =
                serde_json::from_str(text).map_err(|e| InterchangeError::Syntax {
                    format: "json".to_string(),
                    message: e.to_string(),
                })?;
            match doc {
                serde_json::Value::Array(items) => items,
                serde_json::Value::Object(_) => vec![doc],
                _ => {
                    return Err(InterchangeError::InvalidDocument(
                        "expected an array of rules".to_string(),
                    ))
                }
            }
        }
        RulesFileType::Yaml => yaml_documents(text)?,
    };

    let mut seen = BTreeSet::new();
    let mut rules = Vec::with_capacity(entries.len());
    for entry in &entries {
        let rule = parse_rule(entry)?;
        if !seen.insert(rule.name.clone()) {
            return Err(InterchangeError::RuleError {
                name: rule.name,
                message: "duplicate rule name".to_string(),
            });
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// Flatten a YAML stream into rule entries. Empty documents are skipped.
fn yaml_documents(text: &str) -> Result<Vec<serde_json::Value>, InterchangeError> {
    let mut entries = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value =
            serde_json::Value::deserialize(document).map_err(|e| InterchangeError::Syntax {
                format: "yaml".to_string(),
                message: e.to_string(),
            })?;
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Array(items) => entries.extend(items),
            other => entries.push(other),
        }
    }
    Ok(entries)
}

fn parse_rule(obj: &serde_json::Value) -> Result<RuleDefinition, InterchangeError> {
    if !obj.is_object() {
        return Err(InterchangeError::InvalidDocument(
            "rule entry is not an object".to_string(),
        ));
    }
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "name".to_string(),
        })?;

    let condition = match obj.get("condition") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        Some(_) => {
            return Err(InterchangeError::RuleError {
                name,
                message: "'condition' must be a string".to_string(),
            })
        }
        None => {
            return Err(InterchangeError::RuleError {
                name,
                message: "missing 'condition'".to_string(),
            })
        }
    };

    let actions = match obj.get("actions") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => {
            let mut actions = Vec::with_capacity(items.len());
            for item in items {
                let action = item.as_str().ok_or_else(|| InterchangeError::RuleError {
                    name: name.clone(),
                    message: "actions must be strings".to_string(),
                })?;
                actions.push(action.to_string());
            }
            actions
        }
        Some(_) => {
            return Err(InterchangeError::RuleError {
                name,
                message: "'actions' must be a list of strings".to_string(),
            })
        }
    };

    let priority = match obj.get("priority") {
        None | Some(serde_json::Value::Null) => DEFAULT_RULE_PRIORITY,
        Some(v) => v
            .as_i64()
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| InterchangeError::RuleError {
                name: name.clone(),
                message: format!("invalid priority {}", v),
            })?,
    };

    let description = obj
        .get("description")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Ok(RuleDefinition {
        name,
        description,
        priority,
        condition,
        actions,
    })
}

// ── Form documents ──────────────────────────────────────────────────

/// Parse a JSON form-structure document.
///
/// Field names must be unique across all steps.
pub fn parse_form(text: &str) -> Result<FormDefinition, InterchangeError> {
    let doc: serde_json::Value =
        serde_json::from_str(text).map_err(|e| InterchangeError::Syntax {
            format: "json".to_string(),
            message: e.to_string(),
        })?;

    let form = doc
        .get("form")
        .and_then(|v| v.as_str())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "form".to_string(),
        })?
        .to_string();

    let rules_file = doc
        .get("rules_file")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let steps_arr = doc
        .get("steps")
        .and_then(|v| v.as_array())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "steps".to_string(),
        })?;

    let mut seen = BTreeSet::new();
    let mut steps = Vec::with_capacity(steps_arr.len());
    for (index, step) in steps_arr.iter().enumerate() {
        let title = step
            .get("title")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("Step {}", index + 1));

        let mut fields = Vec::new();
        if let Some(arr) = step.get("fields").and_then(|v| v.as_array()) {
            for obj in arr {
                let field = parse_field(obj)?;
                if !seen.insert(field.name.clone()) {
                    return Err(InterchangeError::FieldError {
                        name: field.name,
                        message: "declared more than once".to_string(),
                    });
                }
                fields.push(field);
            }
        }
        steps.push(StepDefinition { title, fields });
    }

    Ok(FormDefinition {
        form,
        rules_file,
        steps,
    })
}

fn parse_field(obj: &serde_json::Value) -> Result<FieldDefinition, InterchangeError> {
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| InterchangeError::InvalidDocument("field without a name".to_string()))?;

    let field_type = obj
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let data_type = obj
        .get("data_type")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let subjects = string_list(obj.get("subjects"), &name, "subjects")?
        .iter()
        .filter_map(|s| SubjectDeclaration::parse(s))
        .collect();

    let calculations = string_list(obj.get("calculations"), &name, "calculations")?;

    let required_status = obj
        .get("required_status")
        .and_then(|v| v.as_str())
        .map(RequiredStatus::parse);

    let properties = obj
        .get("properties")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    Ok(FieldDefinition {
        name,
        field_type,
        data_type,
        subjects,
        calculations,
        required_status,
        properties,
    })
}

/// Accept either a JSON array of strings or one comma-separated string.
fn string_list(
    value: Option<&serde_json::Value>,
    field: &str,
    key: &str,
) -> Result<Vec<String>, InterchangeError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::String(s)) => Ok(s
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect()),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| InterchangeError::FieldError {
                        name: field.to_string(),
                        message: format!("'{}' entries must be strings", key),
                    })
            })
            .collect(),
        Some(_) => Err(InterchangeError::FieldError {
            name: field.to_string(),
            message: format!("'{}' must be a list or a comma-separated string", key),
        }),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
