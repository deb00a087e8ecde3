//! The form engine: one instance per form session.
//!
//! [`FormEngine`] exclusively owns the fact store, the subject registry and
//! the rule catalog. The field layer registers fields, reports value changes
//! through [`FormEngine::on_field_changed`] and listens for the engine's
//! calculation, visibility and validation notifications.
//!
//! A change is handled synchronously before `on_field_changed` returns:
//! record update, validation, rule selection, fire, then post-evaluation.
//! Calculation and visibility effects re-enter the dispatcher for the
//! affected field. Propagation terminates because a change equal to the
//! recorded value is dropped; there is no iteration cap, so rules that
//! keep producing new values for each other never settle.

use std::collections::BTreeMap;

use formwire_interchange::{FieldDefinition, RuleDefinition, RulesFileType};
use tracing::{debug, trace};

use crate::bootstrap::Prepared;
use crate::catalog::{CatalogError, RuleCatalog};
use crate::config::EngineConfig;
use crate::evaluator::Evaluator;
use crate::facts::FactStore;
use crate::fields::{FieldRecord, RequiredValidator, Validator};
use crate::listeners::{
    CalculationListener, ListenerId, ListenerSet, ValidationListener, VisibilityListener,
};
use crate::post_eval::{PostEffect, PostEvaluationHandler};
use crate::rules::{FireReport, RuleEngine, RuleListener};
use crate::selector::RuleSelector;
use crate::subjects::SubjectRegistry;
use crate::types::{DataType, Value};

/// What [`FormEngine::on_field_changed`] did with a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The value equals the recorded one; nothing ran.
    Unchanged,
    /// The record and fact were updated; the field drives no rules.
    Updated,
    /// Rules were selected and fired.
    Fired(FireReport),
}

impl DispatchOutcome {
    pub fn fired(&self) -> Option<&FireReport> {
        match self {
            DispatchOutcome::Fired(report) => Some(report),
            _ => None,
        }
    }
}

/// Rule propagation for one form session.
///
/// Build it with [`FormEngine::build`] from a completed bootstrap, or with
/// [`FormEngine::new`] and explicit registration.
pub struct FormEngine {
    config: EngineConfig,
    catalog: RuleCatalog,
    facts: FactStore,
    registry: SubjectRegistry,
    rules: RuleEngine,
    post: PostEvaluationHandler,
    fields: BTreeMap<String, FieldRecord>,
    /// First type declared for each subject; resets hidden fields with no
    /// type of their own.
    subject_types: BTreeMap<String, DataType>,
    validator: Box<dyn Validator>,
    calculation_listeners: ListenerSet<dyn CalculationListener>,
    visibility_listeners: ListenerSet<dyn VisibilityListener>,
    validation_listeners: ListenerSet<dyn ValidationListener>,
}

impl FormEngine {
    pub fn new(evaluator: Box<dyn Evaluator>, config: EngineConfig) -> Self {
        Self {
            config,
            catalog: RuleCatalog::new(),
            facts: FactStore::new(),
            registry: SubjectRegistry::new(),
            rules: RuleEngine::new(evaluator),
            post: PostEvaluationHandler::new(),
            fields: BTreeMap::new(),
            subject_types: BTreeMap::new(),
            validator: Box::new(RequiredValidator),
            calculation_listeners: ListenerSet::default(),
            visibility_listeners: ListenerSet::default(),
            validation_listeners: ListenerSet::default(),
        }
    }

    /// Build an engine from a completed bootstrap: install the rules, then
    /// register every field of every step.
    pub fn build(
        prepared: &Prepared,
        evaluator: Box<dyn Evaluator>,
        config: EngineConfig,
    ) -> Result<Self, CatalogError> {
        let mut engine = Self::new(evaluator, config);
        engine.install_rules(prepared.rules.as_ref().clone())?;
        for field in prepared.form.fields() {
            engine.register_field(field);
        }
        debug!(
            form = %prepared.form.form,
            fields = engine.fields.len(),
            subjects = engine.registry.len(),
            "form engine built"
        );
        Ok(engine)
    }

    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    // ── Rules ───────────────────────────────────────────────────────

    /// Load the rule catalog. Only the first successful load takes effect;
    /// later calls return `Ok(false)`. Pending subject bindings are resolved
    /// right after the load.
    pub fn install_rules(&mut self, definitions: Vec<RuleDefinition>) -> Result<bool, CatalogError> {
        let loaded = self.catalog.load(definitions)?;
        if loaded {
            let resolved = self.registry.resolve(&self.catalog);
            debug!(bindings = resolved, "subject bindings resolved");
        }
        Ok(loaded)
    }

    pub fn load_rules_str(&mut self, text: &str, file_type: RulesFileType) -> Result<bool, CatalogError> {
        let loaded = self.catalog.load_str(text, file_type)?;
        if loaded {
            let resolved = self.registry.resolve(&self.catalog);
            debug!(bindings = resolved, "subject bindings resolved");
        }
        Ok(loaded)
    }

    // ── Registration ────────────────────────────────────────────────

    /// Seed the default fact for `subject` and record that `dependent`
    /// watches it. Returns `false` if the pair was already registered.
    pub fn register_subject(
        &mut self,
        subject: &str,
        dependent: &str,
        data_type: Option<DataType>,
    ) -> bool {
        if let Some(data_type) = data_type {
            if self.facts.seed_default(subject, data_type) {
                trace!(subject, %data_type, "default fact seeded");
            }
            self.subject_types
                .entry(subject.to_string())
                .or_insert(data_type);
        }
        self.registry.register(subject, dependent, &self.catalog)
    }

    /// Create the record for a declared field and register its subjects.
    ///
    /// A field with a VISIBILITY rule starts hidden until that rule first
    /// resolves. Registering a name again replaces its record.
    pub fn register_field(&mut self, definition: &FieldDefinition) {
        let mut record = FieldRecord::from_definition(definition);
        if self.catalog.has_visibility_rule(&record.name) {
            record.visible = false;
        }
        for subject in &definition.subjects {
            let data_type = subject.data_type.as_deref().and_then(DataType::parse);
            self.register_subject(&subject.field, &definition.name, data_type);
        }
        debug!(field = %record.name, visible = record.visible, "field registered");
        self.fields.insert(record.name.clone(), record);
    }

    /// Drop a field's record on teardown. Its subject bindings stay: the
    /// registry only grows during a session.
    pub fn remove_field(&mut self, name: &str) -> Option<FieldRecord> {
        self.fields.remove(name)
    }

    // ── Listeners ───────────────────────────────────────────────────

    pub fn add_calculation_listener(
        &mut self,
        listener: impl CalculationListener + 'static,
    ) -> ListenerId {
        self.calculation_listeners.add(Box::new(listener))
    }

    pub fn remove_calculation_listener(&mut self, id: ListenerId) -> bool {
        self.calculation_listeners.remove(id)
    }

    pub fn add_visibility_listener(
        &mut self,
        listener: impl VisibilityListener + 'static,
    ) -> ListenerId {
        self.visibility_listeners.add(Box::new(listener))
    }

    pub fn remove_visibility_listener(&mut self, id: ListenerId) -> bool {
        self.visibility_listeners.remove(id)
    }

    pub fn add_validation_listener(
        &mut self,
        listener: impl ValidationListener + 'static,
    ) -> ListenerId {
        self.validation_listeners.add(Box::new(listener))
    }

    pub fn remove_validation_listener(&mut self, id: ListenerId) -> bool {
        self.validation_listeners.remove(id)
    }

    pub fn add_rule_listener(&mut self, listener: impl RuleListener + 'static) -> ListenerId {
        self.rules.add_listener(Box::new(listener))
    }

    pub fn remove_rule_listener(&mut self, id: ListenerId) -> bool {
        self.rules.remove_listener(id)
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Handle a value change reported by the field layer.
    ///
    /// Changes for unregistered names create an undeclared record.
    pub fn on_field_changed(
        &mut self,
        name: &str,
        value: Value,
        metadata: Option<Value>,
        visible: bool,
    ) -> DispatchOutcome {
        let record = self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| FieldRecord::undeclared(name));
        if record.value == value {
            trace!(field = name, "value unchanged; dispatch skipped");
            return DispatchOutcome::Unchanged;
        }

        record.value = value.clone();
        record.metadata = metadata;
        record.visible = visible;
        let calculations = record.calculations.clone();
        self.facts.put(name, value);
        self.validate(name);

        if !self.registry.contains(name) && calculations.is_empty() {
            return DispatchOutcome::Updated;
        }

        let selected = RuleSelector::new(&self.catalog, &self.registry)
            .with_calculation_hops(self.config.calculation_hops)
            .select_rules(name, &calculations);
        self.post.begin(&selected, &self.facts);
        let report = self.rules.fire(&selected, &mut self.facts, &mut self.post);
        let effects = self.post.finish(&self.facts);
        debug!(
            field = name,
            evaluated = report.evaluated.len(),
            effects = effects.len(),
            "rules fired"
        );

        for effect in effects {
            self.apply(effect);
        }
        DispatchOutcome::Fired(report)
    }

    /// Route initial values through the dispatcher.
    pub fn prefill<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (name, value) in values {
            let visible = self.fields.get(&name).is_none_or(|r| r.visible);
            self.on_field_changed(&name, value, None, visible);
        }
    }

    fn apply(&mut self, effect: PostEffect) {
        match effect {
            PostEffect::Calculation { field, value } => {
                debug!(field = %field, %value, "calculation changed");
                let (metadata, visible) = self
                    .fields
                    .get(&field)
                    .map_or((None, true), |r| (r.metadata.clone(), r.visible));
                self.on_field_changed(&field, value.clone(), metadata, visible);
                for listener in self.calculation_listeners.iter_mut() {
                    listener.on_calculation_changed(&field, &value);
                }
            }
            PostEffect::Visibility { field, visible } => {
                let record = self
                    .fields
                    .entry(field.clone())
                    .or_insert_with(|| FieldRecord::undeclared(&field));
                if record.visible == visible {
                    return;
                }
                record.visible = visible;
                let empty = record.empty_value(self.subject_types.get(&field).copied());
                let reset = !visible && self.config.reset_hidden_values && record.value != empty;
                debug!(field = %field, visible, "visibility changed");

                for listener in self.visibility_listeners.iter_mut() {
                    listener.on_visibility_changed(&field, visible);
                }
                if reset {
                    self.on_field_changed(&field, empty, None, false);
                } else {
                    self.validate(&field);
                }
            }
        }
    }

    fn validate(&mut self, name: &str) {
        let Some(record) = self.fields.get_mut(name) else {
            return;
        };
        let error = self.validator.validate(record).err();
        record.error = error.clone();
        for listener in self.validation_listeners.iter_mut() {
            listener.on_validation(name, error.as_deref());
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn registry(&self) -> &SubjectRegistry {
        &self.registry
    }

    pub fn field(&self, name: &str) -> Option<&FieldRecord> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldRecord> {
        self.fields.values()
    }

    /// `{name: {type, value, metadata, visible}}` for every field record.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, record)| (name.clone(), record.to_json()))
                .collect(),
        )
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
