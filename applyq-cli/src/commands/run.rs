use crate::{
    commands::{bind, load_project},
    config::BackendConfig,
    output::{self, Operation, Step},
    project::ProjectContext,
};
use applyq_core::{engine::memory::InMemoryQuery, protocol::value::Value};
use eyre::{Result, WrapErr, eyre};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub fn run(path: Option<String>, output_file: Option<String>, compact: bool) -> Result<()> {
    let project = load_project(path)?;
    let op = Operation::new("Running", &project.config.project.name);

    let rows = match execute(&project) {
        Ok(rows) => rows,
        Err(e) => {
            op.failure();
            return Err(e);
        }
    };

    let rendered = if compact {
        serde_json::to_string(&rows)?
    } else {
        serde_json::to_string_pretty(&rows)?
    };
    match output_file {
        Some(file) => {
            let file = PathBuf::from(file);
            fs::write(&file, rendered)
                .wrap_err_with(|| format!("Failed to write {}", file.display()))?;
            output::info(&format!("Wrote {} rows to {}", rows.len(), file.display()));
        }
        None => println!("{rendered}"),
    }

    op.success();
    Ok(())
}

/// Binds the project's pipeline over its rows and evaluates it in memory.
pub fn execute(project: &ProjectContext) -> Result<Vec<Value>> {
    if let BackendConfig::Translated { provider, .. } = &project.config.backend {
        return Err(eyre!(
            "backend '{provider}' renders plans instead of executing them; use `applyq explain`"
        ));
    }

    let mut load_step = Step::with_messages("Loading project", "Project loaded");
    load_step.start();
    let model = project.load_model()?;
    let options = project.load_options()?;
    let records = project.load_rows()?;
    load_step.done_with_info(&format!("{} rows", records.len()));

    let mut bind_step = Step::with_messages("Binding pipeline", "Pipeline bound");
    bind_step.start();
    let bound = bind(project, &model, &options, InMemoryQuery::from_records(records))?;
    Step::verbose_substep(&format!("result shape: {}", bound.describe_shape()));
    bind_step.done_with_info(&format!("{} stages", options.apply.len()));

    let mut eval_step = Step::with_messages("Evaluating rows", "Rows evaluated");
    eval_step.start_with_spinner();
    let rows = match bound.query.execute_values() {
        Ok(rows) => rows,
        Err(e) => {
            eval_step.fail();
            return Err(e).wrap_err("Failed to evaluate the pipeline");
        }
    };
    debug!(rows = rows.len(), "pipeline evaluated");
    eval_step.done_with_info(&format!("{} rows", rows.len()));

    Ok(rows)
}
