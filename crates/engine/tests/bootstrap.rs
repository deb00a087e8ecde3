//! Bootstrap integration: sources, serial preparation, and engine build.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use formwire_engine::{
    BootstrapError, DirectorySource, EngineConfig, FormBootstrap, FormEngine,
    FormStructureProvider, NativeEvaluator, RuleFileProvider, SerialQueue, SourceError,
    StaticSource, Value,
};
use formwire_interchange::{parse_form, parse_rules, FormDefinition, RuleDefinition, RulesFileType};

const FORM: &str = r#"{
    "form": "Consent",
    "rules_file": "rules.json",
    "steps": [{"title": "Start", "fields": [
        {"name": "consent", "type": "checkbox", "data_type": "bool"},
        {"name": "details", "type": "edit_text", "subjects": "consent:bool"}
    ]}]
}"#;

const RULES: &str = r#"[
    {"name": "detailsVISIBILITY", "condition": "consent == true", "actions": []}
]"#;

/// A provider with a slow form read that logs every step it runs.
struct SlowSource {
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl FormStructureProvider for SlowSource {
    async fn form_structure(&self) -> Result<FormDefinition, SourceError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.log.lock().unwrap().push("form");
        Ok(parse_form(FORM).unwrap())
    }
}

#[async_trait]
impl RuleFileProvider for SlowSource {
    async fn read_rules(
        &self,
        _name: &str,
        file_type: RulesFileType,
    ) -> Result<Vec<RuleDefinition>, SourceError> {
        self.log.lock().unwrap().push("rules");
        Ok(parse_rules(RULES, file_type).unwrap())
    }
}

fn consent_evaluator() -> NativeEvaluator {
    NativeEvaluator::new().with_condition("consent == true", |facts| {
        facts.get("consent").and_then(Value::as_bool) == Some(true)
    })
}

#[tokio::test]
async fn concurrent_prepares_parse_once_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let bootstrap = FormBootstrap::new(
        SlowSource {
            log: Arc::clone(&log),
        },
        SerialQueue::new(),
    );

    let (first, second) = tokio::join!(bootstrap.prepare(), bootstrap.prepare());
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(Arc::ptr_eq(&first.form, &second.form));
    assert!(Arc::ptr_eq(&first.rules, &second.rules));
    assert_eq!(*log.lock().unwrap(), vec!["form", "rules"]);
}

#[tokio::test]
async fn prepared_form_builds_working_engine() {
    let bootstrap =
        FormBootstrap::new(StaticSource::new(FORM).with_rules("rules.json", RULES), SerialQueue::new());
    let prepared = bootstrap.prepare().await.unwrap();

    let mut engine = FormEngine::build(
        &prepared,
        Box::new(consent_evaluator()),
        EngineConfig::default(),
    )
    .unwrap();

    assert_eq!(engine.facts().get("consent"), Some(&Value::from(false)));
    assert!(!engine.field("details").unwrap().visible);

    engine.on_field_changed("consent", Value::from(true), None, true);
    assert!(engine.field("details").unwrap().visible);
}

#[tokio::test]
async fn directory_source_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("form.json"), FORM).unwrap();
    std::fs::write(dir.path().join("rules.json"), RULES).unwrap();

    let bootstrap = FormBootstrap::new(DirectorySource::new(dir.path(), "form.json"), SerialQueue::new());
    let prepared = bootstrap.prepare().await.unwrap();

    assert_eq!(prepared.form.form, "Consent");
    assert_eq!(prepared.rules.len(), 1);
}

#[tokio::test]
async fn missing_rules_file_aborts_bootstrap() {
    let bootstrap = FormBootstrap::new(StaticSource::new(FORM), SerialQueue::new());
    let err = bootstrap.prepare().await.unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Source(SourceError::NotFound(ref name)) if name == "rules.json"
    ));
    assert!(!bootstrap.is_prepared());
}

#[tokio::test]
async fn form_without_rules_file_uses_configured_default() {
    let form = r#"{"form": "Bare", "steps": []}"#;
    let rules = "name: xVISIBILITY\ncondition: \"true\"\n";

    let bootstrap = FormBootstrap::new(
        StaticSource::new(form).with_rules("defaults", rules),
        SerialQueue::new(),
    )
    .with_rules_file("defaults")
    .with_file_type(RulesFileType::Yaml);
    let prepared = bootstrap.prepare().await.unwrap();
    assert_eq!(prepared.rules[0].name, "xVISIBILITY");

    let unnamed = FormBootstrap::new(StaticSource::new(form), SerialQueue::new());
    assert!(unnamed.prepare().await.unwrap().rules.is_empty());
}
