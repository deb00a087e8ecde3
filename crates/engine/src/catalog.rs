//! The rule catalog: every named rule of the current session.
//!
//! Rules are loaded at most once per catalog. A second load request is a
//! no-op that reports `false`, whatever source it names. Once loaded the
//! catalog is immutable.
//!
//! The kind of a rule (visibility, calculation, custom) is derived from its
//! name suffix here, once, instead of being re-parsed on every selection.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use formwire_interchange::{parse_rules, InterchangeError, RuleDefinition, RulesFileType};
use tracing::{debug, info};

/// Name suffix of rules that drive a field's visibility.
pub const VISIBILITY_SUFFIX: &str = "VISIBILITY";
/// Name suffix of rules that compute a field's value.
pub const CALCULATION_SUFFIX: &str = "CALCULATION";

/// Errors while loading rules into a catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Interchange(#[from] InterchangeError),
    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),
}

// ──────────────────────────────────────────────
// Rules
// ──────────────────────────────────────────────

/// What a rule's outcome means to the post-evaluation handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// `<field>VISIBILITY`: the condition result is the field's visibility.
    Visibility { field: String },
    /// `<field>CALCULATION`: the actions write the field's computed value.
    Calculation { field: String },
    /// Any other name. Evaluated, but not interpreted afterwards.
    Custom,
}

impl RuleKind {
    pub fn from_name(name: &str) -> RuleKind {
        if let Some(field) = name.strip_suffix(VISIBILITY_SUFFIX) {
            if !field.is_empty() {
                return RuleKind::Visibility {
                    field: field.to_string(),
                };
            }
        }
        if let Some(field) = name.strip_suffix(CALCULATION_SUFFIX) {
            if !field.is_empty() {
                return RuleKind::Calculation {
                    field: field.to_string(),
                };
            }
        }
        RuleKind::Custom
    }

    /// Field targeted by a visibility or calculation rule.
    pub fn target_field(&self) -> Option<&str> {
        match self {
            RuleKind::Visibility { field } | RuleKind::Calculation { field } => Some(field),
            RuleKind::Custom => None,
        }
    }
}

/// A loaded rule. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub description: Option<String>,
    pub priority: i32,
    pub condition: String,
    pub actions: Vec<String>,
    pub kind: RuleKind,
}

impl Rule {
    pub fn from_definition(def: RuleDefinition) -> Rule {
        let kind = RuleKind::from_name(&def.name);
        Rule {
            name: def.name,
            description: def.description,
            priority: def.priority,
            condition: def.condition,
            actions: def.actions,
            kind,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Position of a rule in its catalog.
///
/// Catalogs keep rules sorted by `(priority, name)`, so ordered sets of ids
/// iterate in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(usize);

// ──────────────────────────────────────────────
// Catalog
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RuleCatalog {
    rules: Option<Vec<Arc<Rule>>>,
    by_name: HashMap<String, RuleId>,
}

impl RuleCatalog {
    /// An unloaded catalog. Lookups on it return nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.rules.is_some()
    }

    /// Load parsed definitions. Returns `Ok(false)` without touching the
    /// catalog if rules were already loaded.
    pub fn load(&mut self, definitions: Vec<RuleDefinition>) -> Result<bool, CatalogError> {
        if self.is_loaded() {
            debug!("rule catalog already loaded; ignoring load request");
            return Ok(false);
        }

        let mut rules: Vec<Rule> = definitions.into_iter().map(Rule::from_definition).collect();
        rules.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));

        let mut by_name = HashMap::with_capacity(rules.len());
        for (index, rule) in rules.iter().enumerate() {
            if by_name.insert(rule.name.clone(), RuleId(index)).is_some() {
                return Err(CatalogError::DuplicateRule(rule.name.clone()));
            }
        }

        info!(rules = rules.len(), "rule catalog loaded");
        self.rules = Some(rules.into_iter().map(Arc::new).collect());
        self.by_name = by_name;
        Ok(true)
    }

    /// Parse and load a rule document. The text is not even parsed when the
    /// catalog is already loaded.
    pub fn load_str(&mut self, text: &str, file_type: RulesFileType) -> Result<bool, CatalogError> {
        if self.is_loaded() {
            debug!("rule catalog already loaded; ignoring load request");
            return Ok(false);
        }
        let definitions = parse_rules(text, file_type)?;
        self.load(definitions)
    }

    pub fn len(&self) -> usize {
        self.rules.as_ref().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules.as_ref().and_then(|r| r.get(id.0))
    }

    pub fn id_of(&self, name: &str) -> Option<RuleId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<Rule>> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// All rules in firing order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter().flat_map(|r| r.iter())
    }

    /// Every rule whose name starts with `prefix`. This is a prefix match
    /// on purpose: it picks up both the VISIBILITY and the CALCULATION rule
    /// of a field in one pass.
    pub fn matching_prefix(&self, prefix: &str) -> BTreeSet<RuleId> {
        self.rules
            .iter()
            .flat_map(|r| r.iter().enumerate())
            .filter(|(_, rule)| rule.name.starts_with(prefix))
            .map(|(index, _)| RuleId(index))
            .collect()
    }

    /// The `<field>CALCULATION` rule, if loaded.
    pub fn calculation_rule(&self, field: &str) -> Option<RuleId> {
        self.id_of(&format!("{}{}", field, CALCULATION_SUFFIX))
    }

    /// Whether a `<field>VISIBILITY` rule exists. Fields with one start
    /// hidden until the rule says otherwise.
    pub fn has_visibility_rule(&self, field: &str) -> bool {
        self.by_name
            .contains_key(&format!("{}{}", field, VISIBILITY_SUFFIX))
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
