//! Firing a selected rule subset against the fact store.
//!
//! For each rule the lifecycle is:
//! 1. `before_evaluate` on every listener; any `false` vetoes the rule
//! 2. the condition is evaluated; when it holds, the actions execute
//! 3. `on_success`, or `on_failure` if the evaluator raised an error
//! 4. `after_evaluate(result)` for every evaluated rule, whatever the outcome
//!
//! A failing rule counts as not matched. Errors are logged and reported
//! to listeners; they never escape [`RuleEngine::fire`].
//!
//! Rules fire in the order given. Selections come from ordered sets, but
//! callers must not rely on cross-rule ordering unless the rules are
//! independent.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::catalog::Rule;
use crate::evaluator::{EvaluationError, Evaluator};
use crate::facts::FactStore;
use crate::listeners::{ListenerId, ListenerSet};

/// Lifecycle hooks around the evaluation of one rule.
pub trait RuleListener {
    /// Return `false` to skip the rule for this fire.
    fn before_evaluate(&mut self, _rule: &Rule, _facts: &FactStore) -> bool {
        true
    }

    /// The condition (and the actions, when the condition held) ran
    /// without error.
    fn on_success(&mut self, _rule: &Rule, _facts: &FactStore) {}

    /// The evaluator raised an error for this rule.
    fn on_failure(&mut self, _rule: &Rule, _facts: &FactStore, _error: &EvaluationError) {}

    /// Called for every evaluated rule. `result` is `false` for failed rules.
    fn after_evaluate(&mut self, _rule: &Rule, _facts: &mut FactStore, _result: bool) {}
}

/// Summary of one fire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Rules whose condition was evaluated.
    pub evaluated: Vec<String>,
    /// Rules whose condition held and whose actions succeeded.
    pub matched: Vec<String>,
    /// Rules the evaluator failed on.
    pub failed: Vec<String>,
    /// Rules vetoed by a listener.
    pub vetoed: Vec<String>,
}

impl FireReport {
    pub fn is_empty(&self) -> bool {
        self.evaluated.is_empty() && self.vetoed.is_empty()
    }
}

enum Outcome {
    Matched,
    NotMatched,
    Failed(EvaluationError),
}

pub struct RuleEngine {
    evaluator: Box<dyn Evaluator>,
    listeners: ListenerSet<dyn RuleListener>,
}

impl RuleEngine {
    pub fn new(evaluator: Box<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            listeners: ListenerSet::default(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn RuleListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Fire `rules` against `facts`. `tracker` sees the same lifecycle as
    /// the registered listeners, after them.
    pub fn fire(
        &mut self,
        rules: &[Arc<Rule>],
        facts: &mut FactStore,
        tracker: &mut dyn RuleListener,
    ) -> FireReport {
        let mut report = FireReport::default();

        for rule in rules {
            let mut allowed = true;
            for listener in self.listeners.iter_mut() {
                allowed &= listener.before_evaluate(rule, facts);
            }
            allowed &= tracker.before_evaluate(rule, facts);
            if !allowed {
                debug!(rule = %rule.name, "rule evaluation vetoed");
                report.vetoed.push(rule.name.clone());
                continue;
            }

            report.evaluated.push(rule.name.clone());
            let result = match self.evaluate_rule(rule, facts) {
                Outcome::Matched => {
                    self.notify_success(rule, facts, tracker);
                    report.matched.push(rule.name.clone());
                    true
                }
                Outcome::NotMatched => {
                    self.notify_success(rule, facts, tracker);
                    false
                }
                Outcome::Failed(err) => {
                    if err.is_compile() {
                        warn!(rule = %rule.name, error = %err, "rule failed to compile");
                    } else {
                        error!(rule = %rule.name, error = %err, "rule evaluation failed");
                    }
                    for listener in self.listeners.iter_mut() {
                        listener.on_failure(rule, facts, &err);
                    }
                    tracker.on_failure(rule, facts, &err);
                    report.failed.push(rule.name.clone());
                    false
                }
            };

            debug!(rule = %rule.name, result, "rule evaluated");
            for listener in self.listeners.iter_mut() {
                listener.after_evaluate(rule, facts, result);
            }
            tracker.after_evaluate(rule, facts, result);
        }

        report
    }

    fn evaluate_rule(&self, rule: &Rule, facts: &mut FactStore) -> Outcome {
        match self.evaluator.evaluate(rule, facts) {
            Ok(true) => match self.evaluator.execute(rule, facts) {
                Ok(()) => Outcome::Matched,
                Err(err) => Outcome::Failed(err),
            },
            Ok(false) => Outcome::NotMatched,
            Err(err) => Outcome::Failed(err),
        }
    }

    fn notify_success(&mut self, rule: &Rule, facts: &FactStore, tracker: &mut dyn RuleListener) {
        for listener in self.listeners.iter_mut() {
            listener.on_success(rule, facts);
        }
        tracker.on_success(rule, facts);
    }
}

/// A listener that does nothing; for firing without a tracker.
#[derive(Debug, Default)]
pub struct NoopListener;

impl RuleListener for NoopListener {}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RuleKind;
    use crate::evaluator::NativeEvaluator;
    use crate::types::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn rule(name: &str, condition: &str, actions: &[&str]) -> Arc<Rule> {
        Arc::new(Rule {
            name: name.to_string(),
            description: None,
            priority: 1,
            condition: condition.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            kind: RuleKind::from_name(name),
        })
    }

    /// Records every hook call as `hook:rule`.
    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        veto: Option<String>,
    }

    impl RuleListener for Recorder {
        fn before_evaluate(&mut self, rule: &Rule, _facts: &FactStore) -> bool {
            self.log.borrow_mut().push(format!("before:{}", rule.name));
            self.veto.as_deref() != Some(rule.name.as_str())
        }
        fn on_success(&mut self, rule: &Rule, _facts: &FactStore) {
            self.log.borrow_mut().push(format!("success:{}", rule.name));
        }
        fn on_failure(&mut self, rule: &Rule, _facts: &FactStore, error: &EvaluationError) {
            let kind = if error.is_compile() { "compile" } else { "runtime" };
            self.log
                .borrow_mut()
                .push(format!("failure:{}:{}", rule.name, kind));
        }
        fn after_evaluate(&mut self, rule: &Rule, _facts: &mut FactStore, result: bool) {
            self.log
                .borrow_mut()
                .push(format!("after:{}:{}", rule.name, result));
        }
    }

    fn engine_with_recorder(veto: Option<&str>) -> (RuleEngine, Rc<RefCell<Vec<String>>>) {
        let evaluator = NativeEvaluator::new()
            .with_condition("adult", |facts| {
                facts
                    .get("age")
                    .and_then(Value::as_number)
                    .is_some_and(|a| a >= rust_decimal::Decimal::from(18))
            })
            .with_action("mark", |facts| {
                facts.put("marked", Value::from(true));
                Ok(())
            })
            .with_action("explode", |_| {
                Err(EvaluationError::Runtime("exploded".to_string()))
            });
        let mut engine = RuleEngine::new(Box::new(evaluator));
        let log = Rc::new(RefCell::new(Vec::new()));
        engine.add_listener(Box::new(Recorder {
            log: Rc::clone(&log),
            veto: veto.map(|v| v.to_string()),
        }));
        (engine, log)
    }

    #[test]
    fn hooks_fire_in_lifecycle_order() {
        let (mut engine, log) = engine_with_recorder(None);
        let mut facts = FactStore::new();
        facts.put("age", Value::from(20));

        let report = engine.fire(
            &[rule("ageVISIBILITY", "adult", &["mark"])],
            &mut facts,
            &mut NoopListener,
        );

        assert_eq!(
            *log.borrow(),
            vec![
                "before:ageVISIBILITY",
                "success:ageVISIBILITY",
                "after:ageVISIBILITY:true"
            ]
        );
        assert_eq!(report.matched, vec!["ageVISIBILITY"]);
        assert_eq!(facts.get("marked"), Some(&Value::from(true)));
    }

    #[test]
    fn false_condition_skips_actions() {
        let (mut engine, log) = engine_with_recorder(None);
        let mut facts = FactStore::new();
        facts.put("age", Value::from(5));

        let report = engine.fire(&[rule("r", "adult", &["mark"])], &mut facts, &mut NoopListener);

        assert!(report.matched.is_empty());
        assert_eq!(report.evaluated, vec!["r"]);
        assert!(!facts.contains("marked"));
        assert_eq!(log.borrow().last().unwrap(), "after:r:false");
    }

    #[test]
    fn compile_failure_is_local_and_not_matched() {
        let (mut engine, log) = engine_with_recorder(None);
        let mut facts = FactStore::new();

        let report = engine.fire(
            &[rule("bad", "age >>> 1", &[]), rule("good", "true", &[])],
            &mut facts,
            &mut NoopListener,
        );

        assert_eq!(report.failed, vec!["bad"]);
        assert_eq!(report.matched, vec!["good"]);
        assert!(log.borrow().contains(&"failure:bad:compile".to_string()));
        assert!(log.borrow().contains(&"after:bad:false".to_string()));
    }

    #[test]
    fn action_failure_reports_runtime_error() {
        let (mut engine, log) = engine_with_recorder(None);
        let report = engine.fire(
            &[rule("r", "true", &["explode"])],
            &mut FactStore::new(),
            &mut NoopListener,
        );
        assert_eq!(report.failed, vec!["r"]);
        assert!(log.borrow().contains(&"failure:r:runtime".to_string()));
        assert!(log.borrow().contains(&"after:r:false".to_string()));
    }

    #[test]
    fn veto_skips_evaluation() {
        let (mut engine, log) = engine_with_recorder(Some("r"));
        let mut facts = FactStore::new();
        let report = engine.fire(&[rule("r", "true", &["mark"])], &mut facts, &mut NoopListener);

        assert_eq!(report.vetoed, vec!["r"]);
        assert!(report.evaluated.is_empty());
        assert_eq!(*log.borrow(), vec!["before:r"]);
        assert!(!facts.contains("marked"));
    }

    #[test]
    fn removed_listener_is_not_called() {
        let mut engine = RuleEngine::new(Box::new(NativeEvaluator::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = engine.add_listener(Box::new(Recorder {
            log: Rc::clone(&log),
            veto: None,
        }));
        assert!(engine.remove_listener(id));
        engine.fire(&[rule("r", "true", &[])], &mut FactStore::new(), &mut NoopListener);
        assert!(log.borrow().is_empty());
    }
}
