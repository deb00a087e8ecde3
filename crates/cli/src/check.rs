use std::process;

use formwire_engine::{DataType, EngineConfig};
use serde::Serialize;

use crate::session::{load_or_exit, Session};
use crate::{FormArgs, OutputFormat};

#[derive(Debug, Serialize)]
struct Problem {
    kind: &'static str,
    message: String,
}

pub(crate) fn cmd_check(files: &FormArgs, config: EngineConfig, output: OutputFormat, quiet: bool) {
    let Session { prepared, engine } = load_or_exit(files, config, output, quiet);
    let form = &prepared.form;
    let catalog = engine.catalog();
    let mut problems = Vec::new();

    for rule in catalog.rules() {
        if let Some(target) = rule.kind.target_field() {
            if form.field(target).is_none() {
                problems.push(Problem {
                    kind: "undeclared_rule_target",
                    message: format!("rule '{}' targets undeclared field '{}'", rule.name, target),
                });
            }
        }
    }

    for field in form.fields() {
        for subject in &field.subjects {
            if form.field(&subject.field).is_none() {
                problems.push(Problem {
                    kind: "undeclared_subject",
                    message: format!(
                        "field '{}' watches undeclared field '{}'",
                        field.name, subject.field
                    ),
                });
            }
            if let Some(type_name) = &subject.data_type {
                if DataType::parse(type_name).is_none() {
                    problems.push(Problem {
                        kind: "unknown_data_type",
                        message: format!(
                            "field '{}' declares subject '{}' with unknown type '{}'",
                            field.name, subject.field, type_name
                        ),
                    });
                }
            }
        }
        for calc in &field.calculations {
            if catalog.calculation_rule(calc).is_none() {
                problems.push(Problem {
                    kind: "missing_calculation_rule",
                    message: format!(
                        "field '{}' feeds '{}' but no rule '{}CALCULATION' exists",
                        field.name, calc, calc
                    ),
                });
            }
        }
    }

    if !quiet {
        match output {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "form": form.form,
                    "problems": problems,
                });
                let text = serde_json::to_string_pretty(&json)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
                println!("{}", text);
            }
            OutputFormat::Text => {
                if problems.is_empty() {
                    println!("No problems found in '{}'.", form.form);
                } else {
                    for problem in &problems {
                        println!("{}: {}", problem.kind, problem.message);
                    }
                    println!();
                    println!("{} problem(s) found.", problems.len());
                }
            }
        }
    }

    if !problems.is_empty() {
        process::exit(1);
    }
}
