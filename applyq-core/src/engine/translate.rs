use crate::engine::{
    expr::Expr,
    plan::{Grouping, Projection, QueryPlan, SortKey},
    queryable::{BackendKind, Capabilities, Queryable},
};

/// Stand-in for a remote store: collects the plan and renders it for the
/// provider instead of enumerating rows.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    plan: QueryPlan,
    capabilities: Capabilities,
}

impl TranslatedQuery {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            plan: QueryPlan::new(BackendKind::Translated {
                provider: provider.into(),
            }),
            capabilities: Capabilities::default(),
        }
    }

    /// A provider that cannot translate aggregation pipelines.
    pub fn without_apply(mut self) -> Self {
        self.capabilities.supports_apply = false;
        self
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn render(&self) -> String {
        self.plan.to_string()
    }

    fn map_plan(self, f: impl FnOnce(QueryPlan) -> QueryPlan) -> Self {
        Self {
            plan: f(self.plan),
            capabilities: self.capabilities,
        }
    }
}

impl Queryable for TranslatedQuery {
    fn backend(&self) -> &BackendKind {
        self.plan.backend()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn filter(self, predicate: Expr) -> Self {
        self.map_plan(|plan| plan.filter(predicate))
    }

    fn select(self, projection: Projection) -> Self {
        self.map_plan(|plan| plan.select(projection))
    }

    fn group_by(self, grouping: Grouping) -> Self {
        self.map_plan(|plan| plan.group_by(grouping))
    }

    fn order_by(self, keys: Vec<SortKey>) -> Self {
        self.map_plan(|plan| plan.order_by(keys))
    }

    fn skip(self, count: usize) -> Self {
        self.map_plan(|plan| plan.skip(count))
    }

    fn take(self, count: usize) -> Self {
        self.map_plan(|plan| plan.take(count))
    }
}
