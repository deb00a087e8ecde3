//! The seam to the expression language.
//!
//! The engine never interprets a rule's condition or actions. An
//! [`Evaluator`] does, and reports failures as [`EvaluationError`]s which
//! the rule engine keeps local to the offending rule.
//!
//! [`NativeEvaluator`] maps expression text to Rust closures. Hosts that
//! write their rule logic in Rust use it directly; it is also what the
//! tests use.

use std::collections::HashMap;
use std::fmt;

use crate::catalog::Rule;
use crate::facts::FactStore;

/// Failure raised while evaluating a rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// The expression could not be compiled (unknown or malformed text).
    #[error("cannot compile '{expression}': {message}")]
    Compile { expression: String, message: String },
    /// The expression compiled but failed against the current facts.
    #[error("evaluation failed: {0}")]
    Runtime(String),
}

impl EvaluationError {
    pub fn is_compile(&self) -> bool {
        matches!(self, EvaluationError::Compile { .. })
    }
}

/// Evaluates rule conditions and executes rule actions against facts.
pub trait Evaluator {
    /// Evaluate `rule.condition`.
    fn evaluate(&self, rule: &Rule, facts: &FactStore) -> Result<bool, EvaluationError>;

    /// Execute `rule.actions` in order. Actions may write facts.
    fn execute(&self, rule: &Rule, facts: &mut FactStore) -> Result<(), EvaluationError>;
}

// ──────────────────────────────────────────────
// NativeEvaluator
// ──────────────────────────────────────────────

type ConditionFn = Box<dyn Fn(&FactStore) -> Result<bool, EvaluationError>>;
type ActionFn = Box<dyn Fn(&mut FactStore) -> Result<(), EvaluationError>>;

/// An evaluator backed by a table of Rust closures keyed by expression text.
///
/// The conditions `"true"` and `"false"` are always available. Any other
/// expression must be registered; unknown text is a compile error.
#[derive(Default)]
pub struct NativeEvaluator {
    conditions: HashMap<String, ConditionFn>,
    actions: HashMap<String, ActionFn>,
}

impl NativeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(
        mut self,
        expression: &str,
        f: impl Fn(&FactStore) -> bool + 'static,
    ) -> Self {
        self.conditions
            .insert(expression.to_string(), Box::new(move |facts| Ok(f(facts))));
        self
    }

    pub fn with_fallible_condition(
        mut self,
        expression: &str,
        f: impl Fn(&FactStore) -> Result<bool, EvaluationError> + 'static,
    ) -> Self {
        self.conditions.insert(expression.to_string(), Box::new(f));
        self
    }

    pub fn with_action(
        mut self,
        expression: &str,
        f: impl Fn(&mut FactStore) -> Result<(), EvaluationError> + 'static,
    ) -> Self {
        self.actions.insert(expression.to_string(), Box::new(f));
        self
    }
}

impl fmt::Debug for NativeEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut conditions: Vec<_> = self.conditions.keys().collect();
        conditions.sort();
        let mut actions: Vec<_> = self.actions.keys().collect();
        actions.sort();
        f.debug_struct("NativeEvaluator")
            .field("conditions", &conditions)
            .field("actions", &actions)
            .finish()
    }
}

impl Evaluator for NativeEvaluator {
    fn evaluate(&self, rule: &Rule, facts: &FactStore) -> Result<bool, EvaluationError> {
        let expression = rule.condition.trim();
        match expression {
            "true" => return Ok(true),
            "false" => return Ok(false),
            _ => {}
        }
        let condition = self
            .conditions
            .get(expression)
            .ok_or_else(|| EvaluationError::Compile {
                expression: expression.to_string(),
                message: "unknown condition".to_string(),
            })?;
        condition(facts)
    }

    fn execute(&self, rule: &Rule, facts: &mut FactStore) -> Result<(), EvaluationError> {
        for expression in &rule.actions {
            let action =
                self.actions
                    .get(expression.trim())
                    .ok_or_else(|| EvaluationError::Compile {
                        expression: expression.clone(),
                        message: "unknown action".to_string(),
                    })?;
            action(facts)?;
        }
        Ok(())
    }
}
