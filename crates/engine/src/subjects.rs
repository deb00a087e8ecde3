//! The subject registry: which dependents' rules to consider when a field
//! changes.
//!
//! A field name is a key here iff some other field declared it as a subject.
//! Each key holds one [`RuleBinding`] per dependent field. Bindings are
//! resolved against the catalog in one explicit step -- at registration time
//! if rules are already loaded, otherwise by [`SubjectRegistry::resolve`]
//! right after the catalog loads -- so selection is a pure read.
//!
//! The registry only grows during a session.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{RuleCatalog, RuleId};

/// A dependent field watching a subject, with the rules it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBinding {
    dependent: String,
    matching: Option<BTreeSet<RuleId>>,
}

impl RuleBinding {
    fn new(dependent: &str) -> Self {
        Self {
            dependent: dependent.to_string(),
            matching: None,
        }
    }

    pub fn dependent(&self) -> &str {
        &self.dependent
    }

    pub fn is_resolved(&self) -> bool {
        self.matching.is_some()
    }

    /// Rules whose name starts with the dependent field's name. Empty until
    /// resolved; stable afterwards.
    pub fn matching_rules(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.matching.iter().flat_map(|m| m.iter().copied())
    }

    fn resolve(&mut self, catalog: &RuleCatalog) -> bool {
        if self.matching.is_some() || !catalog.is_loaded() {
            return false;
        }
        self.matching = Some(catalog.matching_prefix(&self.dependent));
        true
    }
}

#[derive(Debug, Default)]
pub struct SubjectRegistry {
    entries: BTreeMap<String, BTreeMap<String, RuleBinding>>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` watches `subject`. Registering the same pair
    /// again is a no-op and returns `false`.
    pub fn register(&mut self, subject: &str, dependent: &str, catalog: &RuleCatalog) -> bool {
        let bindings = self.entries.entry(subject.to_string()).or_default();
        if bindings.contains_key(dependent) {
            return false;
        }
        let mut binding = RuleBinding::new(dependent);
        binding.resolve(catalog);
        bindings.insert(dependent.to_string(), binding);
        true
    }

    /// Resolve every pending binding against a loaded catalog. Returns the
    /// number of bindings resolved by this call.
    pub fn resolve(&mut self, catalog: &RuleCatalog) -> usize {
        self.entries
            .values_mut()
            .flat_map(|b| b.values_mut())
            .filter_map(|binding| binding.resolve(catalog).then_some(()))
            .count()
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.entries.contains_key(subject)
    }

    pub fn bindings(&self, subject: &str) -> impl Iterator<Item = &RuleBinding> {
        self.entries.get(subject).into_iter().flat_map(|b| b.values())
    }

    /// Union of the matching rules of every binding under `subject`.
    pub fn rules_for(&self, subject: &str) -> BTreeSet<RuleId> {
        self.bindings(subject)
            .flat_map(|b| b.matching_rules())
            .collect()
    }

    /// Subjects in name order.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
