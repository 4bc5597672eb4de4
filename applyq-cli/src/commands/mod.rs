use crate::project::ProjectContext;
use applyq_core::{
    applyc::{
        compiler::{BoundQuery, QueryOptions, apply_query_options},
        schema::Model,
    },
    engine::queryable::Queryable,
};
use eyre::{Result, WrapErr};
use std::path::PathBuf;

pub mod check;
pub mod explain;
pub mod run;

/// Loads the project from `path` (the applyq.toml directory) or from the
/// current directory upwards.
pub fn load_project(path: Option<String>) -> Result<ProjectContext> {
    match path {
        Some(dir) => ProjectContext::find_and_load(Some(&PathBuf::from(dir))),
        None => ProjectContext::find_and_load(None),
    }
}

/// Binds the project's query options against `query`.
pub fn bind<Q: Queryable>(
    project: &ProjectContext,
    model: &Model,
    options: &QueryOptions,
    query: Q,
) -> Result<BoundQuery<Q>> {
    apply_query_options(
        query,
        model,
        &project.config.project.root_type,
        options,
        &project.config.settings,
    )
    .wrap_err_with(|| {
        format!(
            "Failed to bind {}",
            project.pipeline_path().display()
        )
    })
}
