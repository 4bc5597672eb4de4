//! Check command - validates the project configuration, schema and pipeline
//! without evaluating any row.

use crate::{
    commands::{explain, load_project},
    output::{self, Operation, Step},
    project::ProjectContext,
};
use eyre::Result;

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub stages: usize,
    pub shape: String,
    /// Number of rows in the rows file, when it exists
    pub rows: Option<usize>,
}

pub fn run(path: Option<String>) -> Result<()> {
    let project = load_project(path)?;
    let op = Operation::new("Checking", &project.config.project.name);

    match check(&project) {
        Ok(report) => {
            Operation::print_details(&[
                ("stages", report.stages.to_string()),
                ("result shape", report.shape),
            ]);
            op.success();
            Ok(())
        }
        Err(e) => {
            op.failure();
            Err(e)
        }
    }
}

pub fn check(project: &ProjectContext) -> Result<CheckReport> {
    let options = project.load_options()?;
    let explanation = explain::explain(project, None)?;

    let rows = if project.rows_path().exists() {
        let mut rows_step = Step::with_messages("Reading rows", "Rows parsed");
        rows_step.start();
        let rows = project.load_rows()?;
        rows_step.done_with_info(&format!("{} rows", rows.len()));
        Some(rows.len())
    } else {
        output::warning(&format!(
            "rows file {} does not exist",
            project.rows_path().display()
        ));
        None
    };

    Ok(CheckReport {
        stages: options.apply.len(),
        shape: explanation.shape,
        rows,
    })
}
