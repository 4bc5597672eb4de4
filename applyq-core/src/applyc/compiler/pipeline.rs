use crate::{
    applyc::{
        ast::{ExpandClause, ScalarNode, TransformationNode},
        compiler::{
            binder::ExpressionCompiler,
            options::OrderByItem,
            shape::{FieldDecl, RowShape, ShapeArena, ShapeId},
        },
        schema::{FieldType, Model},
        settings::ApplySettings,
    },
    engine::{
        plan::{NamedExpr, Projection, SortKey},
        queryable::Queryable,
    },
    protocol::error::{ApplyError, Result},
};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Binds apply pipelines rooted at one entity type.
#[derive(Debug, Clone, Copy)]
pub struct ApplyBinder<'a> {
    model: &'a Model,
    settings: &'a ApplySettings,
    root_type: &'a str,
}

impl<'a> ApplyBinder<'a> {
    pub fn new(model: &'a Model, settings: &'a ApplySettings, root_type: &'a str) -> Self {
        Self {
            model,
            settings,
            root_type,
        }
    }

    /// Starts a run over `query`, whose rows are entities of the root type.
    pub fn start<Q: Queryable>(&self, query: Q) -> Result<Pipeline<'a, Q>> {
        if self.model.structured_type(self.root_type).is_none() {
            return Err(ApplyError::InvalidPipelineState(format!(
                "unknown root type `{}`",
                self.root_type
            )));
        }
        let compiler = ExpressionCompiler::new(self.model, self.settings, query.backend());
        let mut arena = ShapeArena::new();
        let root = arena.alloc(RowShape::Entity {
            type_name: self.root_type.to_string(),
        });
        Ok(Pipeline {
            model: self.model,
            settings: self.settings,
            compiler,
            arena,
            root,
            row: root,
            query,
            shape_changed: false,
            aggregated: false,
            expand: None,
            consumed: HashSet::new(),
        })
    }

    /// Applies every transformation in order, then the fallback expansion.
    #[instrument(level = "debug", skip_all, fields(root = self.root_type, stages = transformations.len()))]
    pub fn bind<Q: Queryable>(
        &self,
        query: Q,
        transformations: &[TransformationNode],
    ) -> Result<BoundQuery<Q>> {
        ensure_apply_supported(&query, transformations)?;
        let mut pipeline = self.start(query)?;
        for transformation in transformations {
            pipeline = pipeline.apply(transformation)?;
        }
        Ok(pipeline.finish_apply()?.into_bound())
    }
}

/// Fails with `BackendUnsupported` when `query` cannot run a non-empty
/// apply pipeline.
pub fn ensure_apply_supported<Q: Queryable>(
    query: &Q,
    transformations: &[TransformationNode],
) -> Result<()> {
    if transformations.is_empty() || query.capabilities().supports_apply {
        return Ok(());
    }
    Err(ApplyError::BackendUnsupported {
        backend: query.backend().name().to_string(),
        feature: "$apply".to_string(),
    })
}

/// State of one binding run, threaded through every stage.
pub struct Pipeline<'a, Q> {
    pub(super) model: &'a Model,
    pub(super) settings: &'a ApplySettings,
    pub(super) compiler: ExpressionCompiler<'a>,
    pub(super) arena: ShapeArena,
    pub(super) root: ShapeId,
    pub(super) row: ShapeId,
    pub(super) query: Q,
    pub(super) shape_changed: bool,
    pub(super) aggregated: bool,
    pub(super) expand: Option<ExpandClause>,
    /// Navigations already answered by an entity-set aggregation.
    pub(super) consumed: HashSet<String>,
}

impl<'a, Q: Queryable> Pipeline<'a, Q> {
    pub fn row(&self) -> ShapeId {
        self.row
    }

    pub fn arena(&self) -> &ShapeArena {
        &self.arena
    }

    pub fn shape_changed(&self) -> bool {
        self.shape_changed
    }

    pub fn apply(self, transformation: &TransformationNode) -> Result<Self> {
        debug!(stage = %transformation.kind(), shape = %self.arena.describe(self.row), "applying stage");
        match transformation {
            TransformationNode::Filter { predicate } => self.filter(predicate),
            TransformationNode::Compute { items } => self.compute(items),
            TransformationNode::GroupBy { keys, aggregate } => self.aggregate(keys, aggregate),
            TransformationNode::Aggregate { expressions } => self.aggregate(&[], expressions),
            TransformationNode::Expand { clause } => self.expand(clause),
        }
    }

    pub fn filter(mut self, predicate: &ScalarNode) -> Result<Self> {
        let (query, row) =
            self.compiler
                .flatten_if_needed(self.query, &mut self.arena, self.row, &[predicate])?;
        let (expr, ty) = self.compiler.compile(predicate, &self.arena, row)?;
        if !matches!(ty, FieldType::Boolean | FieldType::Dynamic) {
            return Err(ApplyError::InvalidPipelineState(format!(
                "filter expression is of type {ty}, expected Boolean"
            )));
        }
        self.query = query.filter(expr);
        self.row = row;
        Ok(self)
    }

    pub fn order_by(mut self, items: &[OrderByItem]) -> Result<Self> {
        if items.is_empty() {
            return Ok(self);
        }
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let (expr, _) = self.compiler.compile(&item.expression, &self.arena, self.row)?;
            keys.push(SortKey {
                expr,
                descending: item.descending,
            });
        }
        self.query = self.query.order_by(keys);
        Ok(self)
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.query = self.query.skip(count);
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.query = self.query.take(count);
        self
    }

    /// Projects the named properties into an instance-less wrapper.
    pub fn select(mut self, fields: &[String]) -> Result<Self> {
        let mut named = Vec::with_capacity(fields.len());
        let mut declared = Vec::with_capacity(fields.len());
        for field in fields {
            let node = ScalarNode::property(field.as_str());
            let (expr, ty) = self.compiler.compile(&node, &self.arena, self.row)?;
            named.push(NamedExpr::new(field.clone(), expr, ty.clone()));
            declared.push(FieldDecl::new(field.clone(), ty));
        }
        self.query = self.query.select(Projection::Select { fields: named });
        self.row = self.arena.alloc(RowShape::Wrapper {
            instance: None,
            extras: declared,
        });
        Ok(self)
    }

    /// Drops the flattening wrapper when it is the outermost shape.
    pub(super) fn unflatten(mut self) -> Self {
        if let RowShape::Flattened { source, .. } = self.arena.get(self.row) {
            self.row = *source;
            self.query = self.query.select(Projection::Unflatten);
        }
        self
    }

    pub fn into_bound(self) -> BoundQuery<Q> {
        BoundQuery {
            query: self.query,
            arena: self.arena,
            shape: self.row,
            expand: self.expand,
            shape_changed: self.shape_changed,
        }
    }
}

/// A fully bound query together with the shape of the rows it yields.
#[derive(Debug, Clone)]
pub struct BoundQuery<Q> {
    pub query: Q,
    pub arena: ShapeArena,
    pub shape: ShapeId,
    pub expand: Option<ExpandClause>,
    pub shape_changed: bool,
}

impl<Q> BoundQuery<Q> {
    pub fn declared_fields(&self, model: &Model) -> Vec<FieldDecl> {
        self.arena.declared_fields(self.shape, model)
    }

    pub fn describe_shape(&self) -> String {
        self.arena.describe(self.shape)
    }
}
