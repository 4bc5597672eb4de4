use crate::{
    applyc::{
        ast::{ExpandClause, ExpandItem},
        compiler::{
            pipeline::{ApplyBinder, Pipeline},
            shape::RowShape,
        },
        schema::PropertyKind,
    },
    engine::{
        expr::Expr,
        plan::{CompiledExpand, Projection, QueryPlan},
        queryable::Queryable,
    },
    protocol::error::{ApplyError, Result},
};
use tracing::{debug, warn};

/// Appends `incoming`'s items to the accumulated clause. Items are not
/// deduplicated.
pub fn merge_expand(existing: Option<ExpandClause>, incoming: &ExpandClause) -> ExpandClause {
    let mut merged = existing.unwrap_or_default();
    merged.items.extend(incoming.items.iter().cloned());
    merged
}

impl<Q: Queryable> Pipeline<'_, Q> {
    pub fn expand(mut self, clause: &ExpandClause) -> Result<Self> {
        if self.aggregated {
            return Err(ApplyError::InvalidPipelineState(
                "expand cannot follow an aggregation".to_string(),
            ));
        }
        self.expand = Some(merge_expand(self.expand.take(), clause));
        Ok(self)
    }

    /// Closes the apply part of the run. With the shape untouched the
    /// accumulated expand clause becomes an ordinary expansion; otherwise every
    /// item must have been answered by an entity-set aggregation.
    pub fn finish_apply(self) -> Result<Self> {
        let mut pipeline = self.unflatten();
        let Some(clause) = pipeline.expand.clone() else {
            return Ok(pipeline);
        };

        if pipeline.shape_changed {
            for item in &clause.items {
                if pipeline.consumed.contains(&item.navigation) {
                    continue;
                }
                let (_, collection) = pipeline.navigation_target(&item.navigation)?;
                if !collection {
                    return Err(ApplyError::InvalidPipelineState(format!(
                        "cannot expand single-valued `{}` after the result shape has changed",
                        item.navigation
                    )));
                }
                warn!(navigation = %item.navigation, "expand dropped after the result shape changed");
            }
            return Ok(pipeline);
        }

        debug!(items = clause.items.len(), "expanding related entities");
        let mut items = Vec::with_capacity(clause.items.len());
        for item in &clause.items {
            items.push(pipeline.compile_expand_item(item)?);
        }
        pipeline.query = pipeline.query.select(Projection::Expand { items });
        Ok(pipeline)
    }

    /// Target type and multiplicity of a navigation on the root entity.
    fn navigation_target(&self, navigation: &str) -> Result<(String, bool)> {
        let type_name = match self.arena.get(self.root) {
            RowShape::Entity { type_name } => type_name.as_str(),
            _ => {
                return Err(ApplyError::InvalidPipelineState(
                    "expansion requires an entity root".to_string(),
                ));
            }
        };
        let property = self
            .model
            .resolve_property(type_name, navigation)
            .ok_or_else(|| ApplyError::unknown_property(navigation, type_name))?;
        match &property.kind {
            PropertyKind::Navigation { target, collection } => Ok((target.clone(), *collection)),
            _ => Err(ApplyError::InvalidPipelineState(format!(
                "`{navigation}` is not a navigation property"
            ))),
        }
    }

    /// Nested options apply in the order apply, compute, filter, select.
    fn compile_expand_item(&self, item: &ExpandItem) -> Result<CompiledExpand> {
        let (target, collection) = self.navigation_target(&item.navigation)?;
        if self.arena.entity_of(self.row, Expr::It).is_none() {
            return Err(ApplyError::InvalidPipelineState(format!(
                "cannot expand `{}` without an entity row",
                item.navigation
            )));
        }
        if !item.has_nested_options() {
            return Ok(CompiledExpand {
                navigation: item.navigation.clone(),
                collection,
                plan: None,
            });
        }

        let binder = ApplyBinder::new(self.model, self.settings, &target);
        let mut nested = binder.start(QueryPlan::new(self.query.backend().clone()))?;
        for transformation in &item.apply {
            nested = nested.apply(transformation)?;
        }
        nested = nested.finish_apply()?;
        if !item.compute.is_empty() {
            nested = nested.compute(&item.compute)?;
        }
        if let Some(filter) = &item.filter {
            nested = nested.filter(filter)?;
        }
        if !item.select.is_empty() {
            nested = nested.select(&item.select)?;
        }
        Ok(CompiledExpand {
            navigation: item.navigation.clone(),
            collection,
            plan: Some(nested.into_bound().query),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_concatenates_items() {
        let first = ExpandClause::new(vec![ExpandItem::new("Orders")]);
        let second = ExpandClause::new(vec![ExpandItem::new("Orders"), ExpandItem::new("Category")]);
        let merged = merge_expand(Some(first), &second);
        assert_eq!(merged.items.len(), 3);
        assert_eq!(merged.items[2].navigation, "Category");
        assert_eq!(merge_expand(None, &second).items.len(), 2);
    }
}
