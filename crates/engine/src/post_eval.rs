//! Turning the facts left behind by a fire into field-level effects.
//!
//! The handler is the engine's internal [`RuleListener`]. While a fire runs it
//! records each VISIBILITY rule's outcome as it resolves (skip-logic
//! bookkeeping) and mirrors it into the fact `<ruleName>` so later rules in
//! the same fire can read it. Once the fire completes, [`finish`] reports:
//! - a [`PostEffect::Visibility`] for every field whose VISIBILITY rule
//!   resolved during the fire
//! - a [`PostEffect::Calculation`] for every CALCULATION target whose fact
//!   differs from its value before the fire
//!
//! [`finish`]: PostEvaluationHandler::finish

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::{Rule, RuleKind};
use crate::facts::FactStore;
use crate::rules::RuleListener;
use crate::types::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum PostEffect {
    Visibility { field: String, visible: bool },
    Calculation { field: String, value: Value },
}

#[derive(Debug, Default)]
pub struct PostEvaluationHandler {
    /// Calculation targets of the current fire with their pre-fire facts.
    previous: BTreeMap<String, Value>,
    /// Visibility outcomes resolved during the current fire.
    visibility: BTreeMap<String, bool>,
}

impl PostEvaluationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the calculation targets of `rules` before they fire.
    pub fn begin(&mut self, rules: &[Arc<Rule>], facts: &FactStore) {
        self.previous.clear();
        self.visibility.clear();
        for rule in rules {
            if let RuleKind::Calculation { field } = &rule.kind {
                let before = facts.get(field).cloned().unwrap_or_default();
                self.previous.insert(field.clone(), before);
            }
        }
    }

    /// Effects of the fire that ran since [`begin`](Self::begin).
    pub fn finish(&mut self, facts: &FactStore) -> Vec<PostEffect> {
        let mut effects: Vec<PostEffect> = std::mem::take(&mut self.visibility)
            .into_iter()
            .map(|(field, visible)| PostEffect::Visibility { field, visible })
            .collect();

        for (field, before) in std::mem::take(&mut self.previous) {
            let after = facts.get(&field).cloned().unwrap_or_default();
            if after != before {
                effects.push(PostEffect::Calculation { field, value: after });
            }
        }
        effects
    }
}

impl RuleListener for PostEvaluationHandler {
    fn after_evaluate(&mut self, rule: &Rule, facts: &mut FactStore, result: bool) {
        if let RuleKind::Visibility { field } = &rule.kind {
            facts.put(rule.name.clone(), Value::Bool(result));
            self.visibility.insert(field.clone(), result);
        }
    }
}
