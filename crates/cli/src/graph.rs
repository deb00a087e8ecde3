use std::collections::BTreeMap;

use formwire_engine::RuleCatalog;

use crate::session::{load_or_exit, Session};
use crate::{FormArgs, OutputFormat};

pub(crate) fn cmd_graph(
    files: &FormArgs,
    config: formwire_engine::EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let Session { prepared, engine } = load_or_exit(files, config, output, quiet);
    let catalog = engine.catalog();
    let registry = engine.registry();

    // subject -> dependent -> rule names
    let mut subjects: BTreeMap<&str, BTreeMap<&str, Vec<String>>> = BTreeMap::new();
    for subject in registry.subjects() {
        let dependents = subjects.entry(subject).or_default();
        for binding in registry.bindings(subject) {
            dependents.insert(binding.dependent(), rule_names(catalog, binding.matching_rules()));
        }
    }

    // field -> calculation -> CALCULATION rule, if any
    let calculations: BTreeMap<&str, BTreeMap<&str, Option<String>>> = engine
        .fields()
        .filter(|f| !f.calculations.is_empty())
        .map(|f| {
            let targets = f
                .calculations
                .iter()
                .map(|c| {
                    let rule = catalog
                        .calculation_rule(c)
                        .and_then(|id| catalog.get(id))
                        .map(|r| r.name.clone());
                    (c.as_str(), rule)
                })
                .collect();
            (f.name.as_str(), targets)
        })
        .collect();

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "form": prepared.form.form,
                "fields": engine.fields().count(),
                "rules": catalog.len(),
                "subjects": subjects,
                "calculations": calculations,
            });
            let text = serde_json::to_string_pretty(&json)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", text);
        }
        OutputFormat::Text => {
            println!(
                "Form: {} ({} fields, {} rules)",
                prepared.form.form,
                engine.fields().count(),
                catalog.len()
            );
            if subjects.is_empty() && calculations.is_empty() {
                println!("No dependencies declared.");
                return;
            }
            for (subject, dependents) in &subjects {
                println!("{}", subject);
                for (dependent, rules) in dependents {
                    if rules.is_empty() {
                        println!("  -> {} (no rules)", dependent);
                    } else {
                        println!("  -> {}: {}", dependent, rules.join(", "));
                    }
                }
            }
            for (field, targets) in &calculations {
                for (calc, rule) in targets {
                    match rule {
                        Some(rule) => println!("{} => {} [{}]", field, calc, rule),
                        None => println!("{} => {} [no rule]", field, calc),
                    }
                }
            }
        }
    }
}

fn rule_names(
    catalog: &RuleCatalog,
    ids: impl Iterator<Item = formwire_engine::RuleId>,
) -> Vec<String> {
    ids.filter_map(|id| catalog.get(id))
        .map(|r| r.name.clone())
        .collect()
}
