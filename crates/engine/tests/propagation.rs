//! End-to-end propagation through a form engine.
//!
//! The fixture is a small health form:
//! - `weight` and `height` feed the calculated `bmi`
//! - `bmiRisk` watches `bmi` and is shown only when `bmi > 25`
//! - `consent` is a boolean subject of `smoker`

use std::cell::RefCell;
use std::rc::Rc;

use formwire_engine::{
    DispatchOutcome, EngineConfig, EvaluationError, FactStore, FormEngine, NativeEvaluator, Rule,
    RuleListener, Value,
};
use formwire_interchange::{parse_form, RulesFileType};
use rust_decimal::Decimal;

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

const FORM: &str = r#"{
    "form": "Health",
    "steps": [
        {
            "title": "Measurements",
            "fields": [
                {"name": "weight", "type": "edit_text", "data_type": "number", "calculations": ["bmi"]},
                {"name": "height", "type": "edit_text", "data_type": "number", "calculations": ["bmi"]},
                {"name": "bmi", "type": "notification", "data_type": "number"},
                {"name": "bmiRisk", "type": "text", "subjects": "bmi:number"}
            ]
        },
        {
            "title": "Habits",
            "fields": [
                {"name": "consent", "type": "checkbox", "data_type": "bool"},
                {"name": "smoker", "type": "checkbox", "subjects": ["consent:bool"]}
            ]
        }
    ]
}"#;

const RULES: &str = r#"
name: bmiCALCULATION
condition: "true"
actions:
  - "bmi = weight / (height * height)"
---
name: bmiRiskVISIBILITY
condition: "bmi > 25"
actions: []
---
name: smokerVISIBILITY
condition: "consent == true"
actions: []
"#;

fn number(facts: &FactStore, name: &str) -> Decimal {
    facts
        .get(name)
        .and_then(Value::as_number)
        .unwrap_or_default()
}

fn evaluator() -> NativeEvaluator {
    NativeEvaluator::new()
        .with_condition("bmi > 25", |facts| number(facts, "bmi") > Decimal::from(25))
        .with_condition("consent == true", |facts| {
            facts.get("consent").and_then(Value::as_bool) == Some(true)
        })
        .with_action("bmi = weight / (height * height)", |facts| {
            let height = number(facts, "height");
            let bmi = number(facts, "weight")
                .checked_div(height * height)
                .ok_or_else(|| EvaluationError::Runtime("height is zero".to_string()))?;
            facts.put("bmi", Value::Number(bmi));
            Ok(())
        })
}

fn health_engine() -> FormEngine {
    let mut engine = FormEngine::new(Box::new(evaluator()), EngineConfig::default());
    engine.load_rules_str(RULES, RulesFileType::Yaml).unwrap();
    let form = parse_form(FORM).unwrap();
    for field in form.fields() {
        engine.register_field(field);
    }
    engine
}

/// Counts evaluations of one rule.
struct FireCounter {
    rule: &'static str,
    count: Rc<RefCell<usize>>,
}

impl RuleListener for FireCounter {
    fn before_evaluate(&mut self, rule: &Rule, _facts: &FactStore) -> bool {
        if rule.name == self.rule {
            *self.count.borrow_mut() += 1;
        }
        true
    }
}

// ──────────────────────────────────────────────
// Scenarios
// ──────────────────────────────────────────────

#[test]
fn weight_change_recomputes_bmi_and_notifies_listeners() {
    let mut engine = health_engine();
    assert_eq!(engine.facts().get("bmi"), Some(&Value::from(0)));

    let received = Rc::new(RefCell::new(Vec::new()));
    {
        let received = Rc::clone(&received);
        engine.add_calculation_listener(move |field: &str, value: &Value| {
            received.borrow_mut().push((field.to_string(), value.clone()))
        });
    }

    engine.on_field_changed("height", Value::from(2), None, true);
    assert!(received.borrow().is_empty(), "bmi stays 0 while weight is unset");

    let outcome = engine.on_field_changed("weight", Value::from(70), None, true);
    let report = outcome.fired().expect("weight drives rules");
    assert!(report.evaluated.contains(&"bmiCALCULATION".to_string()));
    // bmiRisk watches bmi: its rules join the same pass.
    assert!(report.evaluated.contains(&"bmiRiskVISIBILITY".to_string()));

    let expected = Value::Number(Decimal::new(175, 1));
    assert_eq!(*received.borrow(), vec![("bmi".to_string(), expected.clone())]);
    assert_eq!(engine.facts().get("bmi"), Some(&expected));
    assert_eq!(engine.field("bmi").unwrap().value, expected);
}

#[test]
fn calculated_value_drives_watcher_visibility() {
    let mut engine = health_engine();
    assert!(!engine.field("bmiRisk").unwrap().visible);

    engine.on_field_changed("height", Value::from(2), None, true);
    engine.on_field_changed("weight", Value::from(120), None, true);
    assert!(engine.field("bmiRisk").unwrap().visible);

    engine.on_field_changed("weight", Value::from(60), None, true);
    assert!(!engine.field("bmiRisk").unwrap().visible);
}

#[test]
fn same_value_twice_fires_once() {
    let mut engine = health_engine();
    let count = Rc::new(RefCell::new(0));
    engine.add_rule_listener(FireCounter {
        rule: "bmiCALCULATION",
        count: Rc::clone(&count),
    });

    engine.on_field_changed("height", Value::from(2), None, true);
    *count.borrow_mut() = 0;

    engine.on_field_changed("weight", Value::from(70), None, true);
    // 70.0 is the same number as 70.
    let again = engine.on_field_changed("weight", Value::Number(Decimal::new(700, 1)), None, true);

    assert_eq!(again, DispatchOutcome::Unchanged);
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn removed_calculation_listener_stops_receiving() {
    let mut engine = health_engine();
    let calls = Rc::new(RefCell::new(0));
    let id = {
        let calls = Rc::clone(&calls);
        engine.add_calculation_listener(move |_: &str, _: &Value| *calls.borrow_mut() += 1)
    };

    engine.on_field_changed("height", Value::from(2), None, true);
    engine.on_field_changed("weight", Value::from(70), None, true);
    assert!(engine.remove_calculation_listener(id));
    engine.on_field_changed("weight", Value::from(80), None, true);

    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn boolean_subject_seeded_false() {
    let engine = health_engine();
    assert_eq!(engine.facts().get("consent"), Some(&Value::from(false)));
}

#[test]
fn failing_rule_is_not_matched_and_others_still_run() {
    let mut engine = health_engine();
    // height unset: the calculation divides by zero.
    let outcome = engine.on_field_changed("weight", Value::from(70), None, true);
    let report = outcome.fired().unwrap();

    assert_eq!(report.failed, vec!["bmiCALCULATION"]);
    assert!(report.evaluated.contains(&"bmiRiskVISIBILITY".to_string()));
    assert_eq!(engine.facts().get("bmi"), Some(&Value::from(0)));
}

#[test]
fn prefill_routes_through_dispatch() {
    let mut engine = health_engine();
    engine.prefill(vec![
        ("consent".to_string(), Value::from(true)),
        ("height".to_string(), Value::from(2)),
        ("weight".to_string(), Value::from(110)),
    ]);

    assert!(engine.field("smoker").unwrap().visible);
    assert!(engine.field("bmiRisk").unwrap().visible);
    assert_eq!(engine.snapshot()["bmi"]["value"], serde_json::json!(27.5));
}

#[test]
fn rules_load_only_once() {
    let mut engine = health_engine();
    let loaded = engine
        .load_rules_str("name: otherVISIBILITY\ncondition: \"true\"\n", RulesFileType::Yaml)
        .unwrap();
    assert!(!loaded);
    assert_eq!(engine.catalog().len(), 3);
}

#[test]
fn unloaded_rules_still_track_values() {
    let mut engine = FormEngine::new(Box::new(evaluator()), EngineConfig::default());
    for field in parse_form(FORM).unwrap().fields() {
        engine.register_field(field);
    }

    let outcome = engine.on_field_changed("weight", Value::from(70), None, true);
    assert!(outcome.fired().unwrap().is_empty());
    assert_eq!(engine.facts().get("weight"), Some(&Value::from(70)));
    // Without rules nothing starts hidden.
    assert!(engine.field("bmiRisk").unwrap().visible);
}
