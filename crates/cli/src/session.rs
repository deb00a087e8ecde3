//! Loading a form and its rules into an engine for inspection.

use std::path::{Path, PathBuf};
use std::process;

use formwire_engine::{
    DirectorySource, EngineConfig, FormBootstrap, FormEngine, NativeEvaluator, Prepared,
    SerialQueue,
};
use tracing::info;

use crate::{report_error, FormArgs, OutputFormat};

/// A bootstrapped form plus an engine built from it.
///
/// Inspection never fires rules, so the engine gets an empty evaluator.
pub(crate) struct Session {
    pub(crate) prepared: Prepared,
    pub(crate) engine: FormEngine,
}

/// Bootstrap `files` or exit 1 with a reported error.
pub(crate) fn load_or_exit(
    files: &FormArgs,
    config: EngineConfig,
    output: OutputFormat,
    quiet: bool,
) -> Session {
    match load(files, config) {
        Ok(session) => session,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn load(files: &FormArgs, config: EngineConfig) -> Result<Session, String> {
    let root = files
        .form
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let form_file = files
        .form
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| format!("not a form file: {}", files.form.display()))?;

    let rules_file = files.rules.as_deref().map(absolute).transpose()?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("failed to create tokio runtime: {}", e))?;

    let prepared = rt.block_on(async {
        let mut bootstrap =
            FormBootstrap::new(DirectorySource::new(root, form_file), SerialQueue::new())
                .with_file_type(config.rules_file_type);
        if let Some(rules_file) = rules_file {
            bootstrap = bootstrap.with_rules_file(rules_file);
        }
        bootstrap.prepare().await.map_err(|e| e.to_string())
    })?;

    let engine = FormEngine::build(&prepared, Box::new(NativeEvaluator::new()), config)
        .map_err(|e| format!("cannot load rules: {}", e))?;
    info!(
        form = %prepared.form.form,
        fields = engine.fields().count(),
        rules = engine.catalog().len(),
        "form loaded"
    );
    Ok(Session { prepared, engine })
}

/// Rule names are resolved under the form's directory; an absolute path
/// keeps `--rules` relative to the working directory instead.
fn absolute(path: &Path) -> Result<String, String> {
    std::path::absolute(path)
        .map(|p| p.display().to_string())
        .map_err(|e| format!("cannot resolve {}: {}", path.display(), e))
}
