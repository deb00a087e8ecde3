//! Providers of form structure and rule documents.
//!
//! Both providers are asynchronous: reading a form or a rule file may block
//! on I/O, so the bootstrap runs them on its serial queue rather than on the
//! interaction thread. Parsing happens here too; the engine only ever sees
//! typed definitions.

use async_trait::async_trait;
use formwire_interchange::{
    parse_form, parse_rules, FormDefinition, InterchangeError, RuleDefinition, RulesFileType,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The named resource does not exist in this source.
    #[error("resource '{0}' not found")]
    NotFound(String),
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{resource}': {source}")]
    Interchange {
        resource: String,
        #[source]
        source: InterchangeError,
    },
}

// ──────────────────────────────────────────────
// Traits
// ──────────────────────────────────────────────

/// Supplies the parsed structure of one form.
#[async_trait]
pub trait FormStructureProvider: Send + Sync {
    async fn form_structure(&self) -> Result<FormDefinition, SourceError>;
}

/// Reads a named rule-definition resource.
#[async_trait]
pub trait RuleFileProvider: Send + Sync {
    async fn read_rules(
        &self,
        name: &str,
        file_type: RulesFileType,
    ) -> Result<Vec<RuleDefinition>, SourceError>;
}

fn parse_form_resource(resource: &str, text: &str) -> Result<FormDefinition, SourceError> {
    parse_form(text).map_err(|source| SourceError::Interchange {
        resource: resource.to_string(),
        source,
    })
}

fn parse_rules_resource(
    resource: &str,
    text: &str,
    file_type: RulesFileType,
) -> Result<Vec<RuleDefinition>, SourceError> {
    parse_rules(text, file_type).map_err(|source| SourceError::Interchange {
        resource: resource.to_string(),
        source,
    })
}

// ──────────────────────────────────────────────
// StaticSource
// ──────────────────────────────────────────────

/// In-memory form and rule documents.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    form: String,
    rules: HashMap<String, String>,
}

impl StaticSource {
    pub fn new(form: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            rules: HashMap::new(),
        }
    }

    pub fn with_rules(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.insert(name.into(), text.into());
        self
    }
}

#[async_trait]
impl FormStructureProvider for StaticSource {
    async fn form_structure(&self) -> Result<FormDefinition, SourceError> {
        parse_form_resource("<form>", &self.form)
    }
}

#[async_trait]
impl RuleFileProvider for StaticSource {
    async fn read_rules(
        &self,
        name: &str,
        file_type: RulesFileType,
    ) -> Result<Vec<RuleDefinition>, SourceError> {
        let text = self
            .rules
            .get(name)
            .ok_or_else(|| SourceError::NotFound(name.to_string()))?;
        parse_rules_resource(name, text, file_type)
    }
}

// ──────────────────────────────────────────────
// DirectorySource
// ──────────────────────────────────────────────

/// Form and rule files under a base directory. Rule names are paths
/// relative to the base.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    form_file: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, form_file: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            form_file: form_file.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, relative: &Path) -> Result<String, SourceError> {
        let path = self.root.join(relative);
        tokio::fs::read_to_string(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(path.display().to_string())
            } else {
                SourceError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })
    }
}

#[async_trait]
impl FormStructureProvider for DirectorySource {
    async fn form_structure(&self) -> Result<FormDefinition, SourceError> {
        let text = self.read(&self.form_file).await?;
        parse_form_resource(&self.form_file.display().to_string(), &text)
    }
}

#[async_trait]
impl RuleFileProvider for DirectorySource {
    async fn read_rules(
        &self,
        name: &str,
        file_type: RulesFileType,
    ) -> Result<Vec<RuleDefinition>, SourceError> {
        let text = self.read(Path::new(name)).await?;
        parse_rules_resource(name, &text, file_type)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = r#"{
        "form": "Profile",
        "rules_file": "rules.yml",
        "steps": [{"title": "One", "fields": [{"name": "age", "type": "edit_text"}]}]
    }"#;

    const RULES: &str = "name: ageVISIBILITY\ncondition: \"true\"\nactions: []\n";

    #[tokio::test]
    async fn static_source_serves_named_rules() {
        let source = StaticSource::new(FORM).with_rules("rules.yml", RULES);
        let form = source.form_structure().await.unwrap();
        assert_eq!(form.form, "Profile");

        let rules = source
            .read_rules("rules.yml", RulesFileType::Yaml)
            .await
            .unwrap();
        assert_eq!(rules[0].name, "ageVISIBILITY");
    }

    #[tokio::test]
    async fn static_source_missing_rules() {
        let source = StaticSource::new(FORM);
        let err = source
            .read_rules("rules.yml", RulesFileType::Yaml)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(name) if name == "rules.yml"));
    }

    #[tokio::test]
    async fn directory_source_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("form.json"), FORM).unwrap();
        std::fs::write(dir.path().join("rules.yml"), RULES).unwrap();

        let source = DirectorySource::new(dir.path(), "form.json");
        assert_eq!(source.form_structure().await.unwrap().steps.len(), 1);
        assert_eq!(
            source
                .read_rules("rules.yml", RulesFileType::Yaml)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn malformed_document_names_resource() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("form.json"), "{not json").unwrap();

        let err = DirectorySource::new(dir.path(), "form.json")
            .form_structure()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Interchange { .. }));
        assert!(err.to_string().starts_with("'form.json'"));
    }
}
