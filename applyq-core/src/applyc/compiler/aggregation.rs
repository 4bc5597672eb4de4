use crate::{
    applyc::{
        ast::{AggregateExpression, AggregationMethod, ScalarNode, TransformationNode},
        compiler::{
            pipeline::{ApplyBinder, Pipeline},
            shape::{FieldDecl, RowShape},
        },
        schema::FieldType,
    },
    engine::{
        plan::{CompiledAggregate, Grouping, NamedExpr, QueryPlan, Reduction},
        queryable::Queryable,
        reduce::reduction_type,
    },
    protocol::error::{ApplyError, Result},
};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::debug;

impl<Q: Queryable> Pipeline<'_, Q> {
    /// Partitions rows by `keys` and reduces each partition to one
    /// `{ keys, aggregates }` row. With no keys the whole input is one
    /// partition.
    pub fn aggregate(
        mut self,
        keys: &[ScalarNode],
        aggregates: &[AggregateExpression],
    ) -> Result<Self> {
        let mut names = HashSet::new();
        let mut key_exprs = Vec::with_capacity(keys.len());
        let mut key_decls = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(path) = key.full_path().filter(|path| !path.is_empty()) else {
                return Err(ApplyError::InvalidPipelineState(format!(
                    "group key must be a property path, found {}",
                    key.kind_name()
                )));
            };
            let (expr, ty) = self.compiler.compile(key, &self.arena, self.row)?;
            claim(&mut names, &path)?;
            key_exprs.push(NamedExpr::new(
                path.clone(),
                self.compiler.wrap_convert(expr, &ty),
                ty.clone(),
            ));
            key_decls.push(FieldDecl::new(path, ty));
        }

        // entity-set aggregates over one navigation merge into a single nested pipeline
        let mut entity_sets: IndexMap<&str, Vec<AggregateExpression>> = IndexMap::new();
        for aggregate in aggregates {
            if let AggregateExpression::EntitySet {
                navigation,
                children,
            } = aggregate
            {
                entity_sets
                    .entry(navigation.as_str())
                    .or_default()
                    .extend(children.iter().cloned());
            }
        }

        let mut compiled = Vec::with_capacity(aggregates.len());
        let mut declared = Vec::with_capacity(aggregates.len());
        for aggregate in aggregates {
            match aggregate {
                AggregateExpression::Property {
                    expression,
                    method,
                    alias,
                } => {
                    let (input, input_type) =
                        self.compiler.compile(expression, &self.arena, self.row)?;
                    let reduction = self.reduction(method, &input_type)?;
                    claim(&mut names, alias)?;
                    declared.push(FieldDecl::new(
                        alias.clone(),
                        reduction_type(&reduction, &input_type),
                    ));
                    compiled.push(CompiledAggregate::Reduce {
                        alias: alias.clone(),
                        input,
                        reduction,
                        input_type,
                    });
                }
                AggregateExpression::Count { alias } => {
                    claim(&mut names, alias)?;
                    declared.push(FieldDecl::new(alias.clone(), FieldType::I64));
                    compiled.push(CompiledAggregate::Count {
                        alias: alias.clone(),
                    });
                }
                AggregateExpression::EntitySet { navigation, .. } => {
                    let Some(children) = entity_sets.shift_remove(navigation.as_str()) else {
                        continue;
                    };
                    claim(&mut names, navigation)?;
                    compiled.push(self.entity_set(navigation, children)?);
                    declared.push(FieldDecl::new(
                        navigation.clone(),
                        FieldType::Array(Box::new(FieldType::Dynamic)),
                    ));
                }
            }
        }

        self.query = self.query.group_by(Grouping {
            keys: key_exprs,
            aggregates: compiled,
        });
        self.row = self.arena.alloc(RowShape::Grouped {
            keys: key_decls,
            aggregates: declared,
        });
        self.shape_changed = true;
        self.aggregated = true;
        Ok(self)
    }

    fn reduction(&self, method: &AggregationMethod, input_type: &FieldType) -> Result<Reduction> {
        let numeric = input_type.is_numeric() || *input_type == FieldType::Dynamic;
        Ok(match method {
            AggregationMethod::Sum | AggregationMethod::Average if !numeric => {
                return Err(ApplyError::InvalidPipelineState(format!(
                    "`{method}` needs a numeric input, found {input_type}"
                )));
            }
            AggregationMethod::Sum => Reduction::Sum,
            AggregationMethod::Average => Reduction::Average,
            AggregationMethod::Min => Reduction::Min,
            AggregationMethod::Max => Reduction::Max,
            AggregationMethod::CountDistinct => Reduction::CountDistinct,
            AggregationMethod::Custom(name) => self
                .settings
                .extensions
                .aggregation(name, input_type)
                .cloned()
                .map(Reduction::Custom)
                .ok_or_else(|| ApplyError::unsupported(name.as_str()))?,
        })
    }

    /// Binds `children` recursively against the related collection, behind any
    /// filters an earlier `expand` of the same navigation asked for.
    fn entity_set(
        &mut self,
        navigation: &str,
        children: Vec<AggregateExpression>,
    ) -> Result<CompiledAggregate> {
        let node = ScalarNode::NavigationAccess {
            source: Box::new(ScalarNode::RangeVariable),
            navigation: navigation.to_string(),
        };
        let (collection, ty) = self.compiler.compile(&node, &self.arena, self.row)?;
        let FieldType::Collection(target) = ty else {
            return Err(ApplyError::InvalidPipelineState(format!(
                "`{navigation}` is not a collection-valued navigation"
            )));
        };

        let mut chain: Vec<TransformationNode> = self
            .expand
            .iter()
            .flat_map(|clause| clause.items.iter())
            .filter(|item| item.navigation == navigation)
            .filter_map(|item| item.filter.clone())
            .map(|predicate| TransformationNode::Filter { predicate })
            .collect();
        debug!(navigation, pushed_down = chain.len(), "binding entity-set aggregation");
        chain.push(TransformationNode::Aggregate {
            expressions: children,
        });

        let nested = ApplyBinder::new(self.model, self.settings, &target)
            .bind(QueryPlan::new(self.query.backend().clone()), &chain)?;
        self.consumed.insert(navigation.to_string());
        Ok(CompiledAggregate::EntitySet {
            alias: navigation.to_string(),
            collection,
            plan: nested.query,
        })
    }
}

/// Output names become nested objects along `/`, so a name may neither repeat
/// nor sit on the path of another.
fn claim(names: &mut HashSet<String>, name: &str) -> Result<()> {
    if let Some(existing) = names.iter().find(|existing| {
        existing.as_str() == name || is_path_prefix(existing, name) || is_path_prefix(name, existing)
    }) {
        return Err(ApplyError::InvalidPipelineState(if existing == name {
            format!("`{name}` is declared twice in one aggregation")
        } else {
            format!("`{name}` overlaps `{existing}` in one aggregation")
        }));
    }
    names.insert(name.to_string());
    Ok(())
}

fn is_path_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}
