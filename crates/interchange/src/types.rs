//! Typed structs for rule-definition and form-structure documents.
//!
//! Fields that only the host layer interprets (widget properties, option
//! lists) stay as `serde_json::Value` so this crate does not have to know
//! every widget kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Rule documents ──────────────────────────────────────────────────

/// Priority assigned to rules that do not declare one.
pub const DEFAULT_RULE_PRIORITY: i32 = i32::MAX - 1;

/// Encoding of a rule-definition document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulesFileType {
    Json,
    #[default]
    Yaml,
}

impl RulesFileType {
    /// Guess the encoding from a file name. `.yml`/`.yaml` map to YAML,
    /// `.json` to JSON; anything else is unknown.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".json") {
            Some(RulesFileType::Json)
        } else if lower.ends_with(".yml") || lower.ends_with(".yaml") {
            Some(RulesFileType::Yaml)
        } else {
            None
        }
    }
}

impl fmt::Display for RulesFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulesFileType::Json => write!(f, "json"),
            RulesFileType::Yaml => write!(f, "yaml"),
        }
    }
}

impl FromStr for RulesFileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(RulesFileType::Json),
            "yaml" | "yml" => Ok(RulesFileType::Yaml),
            other => Err(format!("unknown rules file type '{}'", other)),
        }
    }
}

/// One rule as written in a rule-definition document.
///
/// `condition` and `actions` are opaque expression text; the engine hands
/// them to an external evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: i32,
    pub condition: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

// ── Form documents ──────────────────────────────────────────────────

/// A parsed form: a titled sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub form: String,
    /// Rule resource named by the form, if any.
    pub rules_file: Option<String>,
    pub steps: Vec<StepDefinition>,
}

impl FormDefinition {
    /// All field declarations across steps, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.steps.iter().flat_map(|s| s.fields.iter())
    }

    /// Look up a field declaration by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub title: String,
    pub fields: Vec<FieldDefinition>,
}

/// A single field declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    /// Widget kind (`edit_text`, `checkbox`, ...). Opaque to the engine.
    pub field_type: String,
    /// Declared value type name, e.g. `number`.
    pub data_type: Option<String>,
    /// Fields this field watches.
    pub subjects: Vec<SubjectDeclaration>,
    /// Calculated fields this field feeds.
    pub calculations: Vec<String>,
    pub required_status: Option<RequiredStatus>,
    pub properties: serde_json::Value,
}

/// `"<field>:<type>"` entry of a field's `subjects` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDeclaration {
    pub field: String,
    pub data_type: Option<String>,
}

impl SubjectDeclaration {
    /// Split `age:number` into its parts. Whitespace around either part
    /// is ignored; an empty type counts as no type.
    pub fn parse(raw: &str) -> Option<Self> {
        let (field, data_type) = match raw.split_once(':') {
            Some((f, t)) => (f.trim(), Some(t.trim())),
            None => (raw.trim(), None),
        };
        if field.is_empty() {
            return None;
        }
        Some(SubjectDeclaration {
            field: field.to_string(),
            data_type: data_type
                .filter(|t| !t.is_empty())
                .map(|t| t.to_string()),
        })
    }
}

/// Parsed `required_status` descriptor: `"yes:Please enter a value"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredStatus {
    pub required: bool,
    pub message: Option<String>,
}

impl RequiredStatus {
    pub fn parse(raw: &str) -> Self {
        let (flag, message) = match raw.split_once(':') {
            Some((f, m)) => (f.trim(), Some(m.trim().to_string())),
            None => (raw.trim(), None),
        };
        RequiredStatus {
            required: matches!(flag.to_ascii_lowercase().as_str(), "yes" | "true"),
            message: message.filter(|m| !m.is_empty()),
        }
    }
}
