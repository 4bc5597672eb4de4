use crate::{
    applyc::{
        analyzer::{
            aliases::{resolve_parameter_aliases, substitute},
            validation::{validate_expression, validate_pipeline},
        },
        ast::{ComputeExpression, ScalarNode, TransformationNode},
        compiler::pipeline::{ApplyBinder, BoundQuery, ensure_apply_supported},
        schema::Model,
        settings::ApplySettings,
    },
    engine::queryable::Queryable,
    protocol::error::Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expression: ScalarNode,
    #[serde(default)]
    pub descending: bool,
}

impl OrderByItem {
    pub fn ascending(expression: ScalarNode) -> Self {
        Self {
            expression,
            descending: false,
        }
    }

    pub fn descending(expression: ScalarNode) -> Self {
        Self {
            expression,
            descending: true,
        }
    }
}

/// The query options of one request. `apply` runs first; the others follow
/// against whatever shape it leaves behind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub apply: Vec<TransformationNode>,
    #[serde(default)]
    pub compute: Vec<ComputeExpression>,
    #[serde(default)]
    pub filter: Option<ScalarNode>,
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub top: Option<usize>,
    /// Values for `@name` references inside filters.
    #[serde(default)]
    pub parameter_aliases: HashMap<String, ScalarNode>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply(mut self, apply: Vec<TransformationNode>) -> Self {
        self.apply = apply;
        self
    }

    pub fn with_compute(mut self, compute: Vec<ComputeExpression>) -> Self {
        self.compute = compute;
        self
    }

    pub fn with_filter(mut self, filter: ScalarNode) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<OrderByItem>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    pub fn with_parameter_alias(mut self, name: impl Into<String>, value: ScalarNode) -> Self {
        self.parameter_aliases.insert(name.into(), value);
        self
    }
}

/// Applies `options` to `query` in the order apply, compute, filter,
/// orderby, skip, top and finally the page limit.
#[instrument(level = "debug", skip_all, fields(root = root_type, stages = options.apply.len()))]
pub fn apply_query_options<Q: Queryable>(
    query: Q,
    model: &Model,
    root_type: &str,
    options: &QueryOptions,
    settings: &ApplySettings,
) -> Result<BoundQuery<Q>> {
    ensure_apply_supported(&query, &options.apply)?;

    let apply = resolve_parameter_aliases(&options.apply, &options.parameter_aliases);
    let filter = options
        .filter
        .as_ref()
        .map(|filter| substitute(filter, &options.parameter_aliases));

    validate_pipeline(&apply, &settings.validation)?;
    if !options.compute.is_empty() {
        validate_pipeline(
            &[TransformationNode::Compute {
                items: options.compute.clone(),
            }],
            &settings.validation,
        )?;
    }
    if let Some(filter) = &filter {
        validate_expression(filter, &settings.validation)?;
    }
    for item in &options.order_by {
        validate_expression(&item.expression, &settings.validation)?;
    }

    let mut pipeline = ApplyBinder::new(model, settings, root_type).start(query)?;
    for transformation in &apply {
        pipeline = pipeline.apply(transformation)?;
    }
    pipeline = pipeline.finish_apply()?;

    if !options.compute.is_empty() {
        pipeline = pipeline.compute(&options.compute)?;
    }
    if let Some(filter) = &filter {
        pipeline = pipeline.filter(filter)?;
    }
    pipeline = pipeline.order_by(&options.order_by)?;
    if let Some(skip) = options.skip {
        pipeline = pipeline.skip(skip);
    }
    if let Some(top) = options.top {
        pipeline = pipeline.take(top);
    }
    if let Some(limit) = settings.page_limit {
        debug!(limit, "applying page limit");
        pipeline = pipeline.take(limit);
    }
    Ok(pipeline.into_bound())
}
