use std::process;

use formwire_engine::{EngineConfig, RuleSelector};

use crate::session::{load_or_exit, Session};
use crate::{report_error, FormArgs, OutputFormat};

pub(crate) fn cmd_select(
    files: &FormArgs,
    field: &str,
    config: EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let hops = config.calculation_hops;
    let Session { engine, .. } = load_or_exit(files, config, output, quiet);

    let Some(record) = engine.field(field) else {
        report_error(&format!("unknown field '{}'", field), output, quiet);
        process::exit(1);
    };

    let rules: Vec<String> = RuleSelector::new(engine.catalog(), engine.registry())
        .with_calculation_hops(hops)
        .select_rules(field, &record.calculations)
        .iter()
        .map(|r| r.name.clone())
        .collect();

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({ "field": field, "rules": rules });
            let text = serde_json::to_string_pretty(&json)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", text);
        }
        OutputFormat::Text => {
            if rules.is_empty() {
                println!("No rules selected for '{}'.", field);
            }
            for rule in &rules {
                println!("{}", rule);
            }
        }
    }
}
