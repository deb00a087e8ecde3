//! Computing the minimal rule subset to fire when a field changes.
//!
//! The selection for a changed field is the union of:
//! - (a) the matching rules of every binding keyed by the field
//! - (b) the `<calc>CALCULATION` rule of each calculation the field feeds
//! - (c) the matching rules of every binding keyed by one of those
//!   calculations, i.e. the fields watching a calculation's result
//!
//! Step (c) goes exactly one hop by default: a calculation feeding another
//! calculation that feeds a third watcher does not pull in the third
//! watcher's rules. `calculation_hops` extends (or disables) that walk.
//!
//! With no catalog loaded the selection is empty.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{Rule, RuleCatalog, RuleId};
use crate::subjects::SubjectRegistry;

pub struct RuleSelector<'a> {
    catalog: &'a RuleCatalog,
    registry: &'a SubjectRegistry,
    calculation_hops: usize,
}

impl<'a> RuleSelector<'a> {
    pub fn new(catalog: &'a RuleCatalog, registry: &'a SubjectRegistry) -> Self {
        Self {
            catalog,
            registry,
            calculation_hops: 1,
        }
    }

    pub fn with_calculation_hops(mut self, hops: usize) -> Self {
        self.calculation_hops = hops;
        self
    }

    /// Rule ids to evaluate after `changed` changes. `calculations` is the
    /// changed field's calculation-target list.
    pub fn select(&self, changed: &str, calculations: &[String]) -> BTreeSet<RuleId> {
        if !self.catalog.is_loaded() {
            debug!(field = changed, "rules not loaded; nothing selected");
            return BTreeSet::new();
        }

        let mut selected = self.registry.rules_for(changed);

        for calc in calculations {
            if let Some(id) = self.catalog.calculation_rule(calc) {
                selected.insert(id);
            }
        }

        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut frontier: Vec<&str> = calculations.iter().map(|c| c.as_str()).collect();
        for _ in 0..self.calculation_hops {
            let mut next = Vec::new();
            for name in frontier {
                if !visited.insert(name) {
                    continue;
                }
                for binding in self.registry.bindings(name) {
                    selected.extend(binding.matching_rules());
                    next.push(binding.dependent());
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        debug!(field = changed, rules = selected.len(), "rules selected");
        selected
    }

    /// Like [`select`](Self::select), returning the rules in firing order.
    pub fn select_rules(&self, changed: &str, calculations: &[String]) -> Vec<Arc<Rule>> {
        self.select(changed, calculations)
            .into_iter()
            .filter_map(|id| self.catalog.get(id).cloned())
            .collect()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
