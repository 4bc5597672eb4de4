use crate::{
    commands::{bind, load_project},
    config::BackendConfig,
    output::{Operation, Step},
    project::ProjectContext,
};
use applyq_core::{
    applyc::{compiler::BoundQuery, schema::Model},
    engine::{memory::InMemoryQuery, translate::TranslatedQuery},
};
use eyre::Result;

/// What a pipeline binds to, without evaluating it.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub backend: String,
    pub shape: String,
    /// `(name, type)` of every field a result row declares
    pub fields: Vec<(String, String)>,
    pub plan: String,
}

pub fn run(path: Option<String>, provider: Option<String>) -> Result<()> {
    let project = load_project(path)?;
    let op = Operation::new("Explaining", &project.config.project.name);

    let explanation = match explain(&project, provider.as_deref()) {
        Ok(explanation) => explanation,
        Err(e) => {
            op.failure();
            return Err(e);
        }
    };

    print!("{}", explanation.plan);
    Operation::print_details(&[
        ("backend", explanation.backend.clone()),
        ("shape", explanation.shape.clone()),
        (
            "fields",
            explanation
                .fields
                .iter()
                .map(|(name, ty)| format!("{name}: {ty}"))
                .collect::<Vec<_>>()
                .join(", "),
        ),
    ]);
    op.success();
    Ok(())
}

/// Binds against the configured backend, or a translated one named `provider`.
pub fn explain(project: &ProjectContext, provider: Option<&str>) -> Result<Explanation> {
    let backend = match provider {
        Some(provider) => BackendConfig::Translated {
            provider: provider.to_string(),
            supports_apply: true,
        },
        None => project.config.backend.clone(),
    };

    let mut load_step = Step::with_messages("Loading project", "Project loaded");
    load_step.start();
    let model = project.load_model()?;
    let options = project.load_options()?;
    load_step.done();

    let mut bind_step = Step::with_messages("Binding pipeline", "Pipeline bound");
    bind_step.start();
    let (shape, fields, plan) = match &backend {
        BackendConfig::InMemory => {
            let bound = bind(project, &model, &options, InMemoryQuery::new(Vec::new()))?;
            let plan = bound.query.plan().to_string();
            describe(&bound, &model, plan)
        }
        BackendConfig::Translated {
            provider,
            supports_apply,
        } => {
            let mut query = TranslatedQuery::new(provider.as_str());
            if !supports_apply {
                query = query.without_apply();
            }
            let bound = bind(project, &model, &options, query)?;
            let plan = bound.query.render();
            describe(&bound, &model, plan)
        }
    };
    bind_step.done();

    Ok(Explanation {
        backend: backend.label().to_string(),
        shape,
        fields,
        plan,
    })
}

fn describe<Q>(
    bound: &BoundQuery<Q>,
    model: &Model,
    plan: String,
) -> (String, Vec<(String, String)>, String) {
    let fields = bound
        .declared_fields(model)
        .into_iter()
        .map(|field| (field.name, field.ty.to_string()))
        .collect();
    (bound.describe_shape(), fields, plan)
}
