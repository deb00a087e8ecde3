//! Reactive rule propagation for declarative forms.
//!
//! Fields declare which other fields they watch (subjects) and which
//! calculated fields they feed. Rules named `<field>VISIBILITY` and
//! `<field>CALCULATION` drive skip logic and derived values. When a field
//! changes, the engine fires only the rules that can be affected, applies
//! their visibility and calculation effects, and propagates those effects
//! until values stop changing.
//!
//! Typical use:
//! 1. [`FormBootstrap::prepare`] parses the form and loads its rules, once.
//! 2. [`FormEngine::build`] installs the rules and registers every field.
//! 3. The field layer reports edits through [`FormEngine::on_field_changed`]
//!    and listens for calculation, visibility and validation updates.

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod facts;
pub mod fields;
pub mod listeners;
pub mod post_eval;
pub mod rules;
pub mod selector;
pub mod sources;
pub mod subjects;
pub mod types;

pub use bootstrap::{BootstrapError, FormBootstrap, Prepared, SerialQueue};
pub use catalog::{CatalogError, Rule, RuleCatalog, RuleId, RuleKind};
pub use config::{ConfigError, EngineConfig};
pub use engine::{DispatchOutcome, FormEngine};
pub use evaluator::{EvaluationError, Evaluator, NativeEvaluator};
pub use facts::FactStore;
pub use fields::{FieldRecord, RequiredValidator, Validator};
pub use listeners::{CalculationListener, ListenerId, ValidationListener, VisibilityListener};
pub use post_eval::{PostEffect, PostEvaluationHandler};
pub use rules::{FireReport, NoopListener, RuleEngine, RuleListener};
pub use selector::RuleSelector;
pub use sources::{
    DirectorySource, FormStructureProvider, RuleFileProvider, SourceError, StaticSource,
};
pub use subjects::{RuleBinding, SubjectRegistry};
pub use types::{DataType, Value};
