use crate::{
    applyc::schema::FieldType,
    engine::{
        eval::{evaluate, evaluate_predicate},
        expr::Expr,
        plan::{
            CompiledAggregate, CompiledExpand, Grouping, NamedExpr, Projection, QueryOp, QueryPlan,
            SortKey,
        },
        queryable::{BackendKind, Queryable},
        reduce::{reduce, reduction_type},
    },
    protocol::{
        error::{ApplyError, Result},
        row::{ExtraFieldContainer, Record, Row},
        value::Value,
    },
};
use indexmap::IndexMap;
use std::{cmp::Ordering, sync::Arc};
use tracing::trace;

/// Executes a compiled plan over rows held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryQuery {
    source: Arc<Vec<Row>>,
    plan: QueryPlan,
}

impl InMemoryQuery {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            source: Arc::new(rows),
            plan: QueryPlan::new(BackendKind::InMemory),
        }
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self::new(records.into_iter().map(Row::Entity).collect())
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Enumerates the source through every deferred operation.
    pub fn execute(&self) -> Result<Vec<Row>> {
        execute_plan(&self.plan, self.source.iter().cloned())
    }

    /// Executes and renders every row as an object value.
    pub fn execute_values(&self) -> Result<Vec<Value>> {
        Ok(self.execute()?.iter().map(Row::to_value).collect())
    }

    fn map_plan(self, f: impl FnOnce(QueryPlan) -> QueryPlan) -> Self {
        Self {
            source: self.source,
            plan: f(self.plan),
        }
    }
}

impl Queryable for InMemoryQuery {
    fn backend(&self) -> &BackendKind {
        self.plan.backend()
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

type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// Runs `plan` over `rows`. Streaming operations stay lazy; grouping and
/// ordering materialize their input.
pub fn execute_plan<'a>(
    plan: &'a QueryPlan,
    rows: impl Iterator<Item = Row> + 'a,
) -> Result<Vec<Row>> {
    let mut iter: RowIter<'a> = Box::new(rows.map(Ok));
    for op in plan.ops() {
        iter = match op {
            QueryOp::Filter(predicate) => Box::new(iter.filter_map(move |row| match row {
                Ok(row) => match evaluate_predicate(predicate, &row) {
                    Ok(true) => Some(Ok(row)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(e)),
            })),
            QueryOp::Select(projection) => {
                Box::new(iter.map(move |row| row.and_then(|row| project(projection, row))))
            }
            QueryOp::GroupBy(grouping) => {
                let grouped = group(grouping, iter)?;
                Box::new(grouped.into_iter().map(Ok))
            }
            QueryOp::OrderBy(keys) => {
                let sorted = sort(keys, iter)?;
                Box::new(sorted.into_iter().map(Ok))
            }
            QueryOp::Skip(count) => Box::new(iter.skip(*count)),
            QueryOp::Take(count) => Box::new(iter.take(*count)),
        };
    }
    iter.collect()
}

fn evaluate_fields(fields: &[NamedExpr], row: &Row) -> Result<ExtraFieldContainer> {
    let mut container = ExtraFieldContainer::new();
    for field in fields {
        container.push(field.name.clone(), evaluate(&field.expr, row)?, field.ty.clone());
    }
    Ok(container)
}

fn project(projection: &Projection, row: Row) -> Result<Row> {
    match projection {
        Projection::Compute { extras } => {
            let extras = evaluate_fields(extras, &row)?;
            Ok(Row::Wrapper {
                instance: Some(Box::new(row)),
                extras,
            })
        }
        Projection::Flatten { properties } => {
            let flattened = evaluate_fields(properties, &row)?;
            Ok(Row::Flattened {
                source: Box::new(row),
                flattened,
            })
        }
        Projection::Unflatten => Ok(row.unflattened()),
        Projection::Select { fields } => Ok(Row::Wrapper {
            instance: None,
            extras: evaluate_fields(fields, &row)?,
        }),
        Projection::Expand { items } => expand(items, row),
    }
}

fn expand(items: &[CompiledExpand], row: Row) -> Result<Row> {
    let Row::Entity(mut record) = row else {
        return Err(ApplyError::Evaluation(
            "expansion requires entity rows".to_string(),
        ));
    };
    for item in items {
        let Some(plan) = &item.plan else {
            continue;
        };
        let related = record.get(&item.navigation).cloned().unwrap_or_default();
        let expanded = match related {
            Value::Array(members) => {
                let rows = entity_rows(members, &item.navigation)?;
                Value::Array(
                    execute_plan(plan, rows.into_iter())?
                        .iter()
                        .map(Row::to_value)
                        .collect(),
                )
            }
            Value::Object(member) => execute_plan(plan, std::iter::once(Row::Entity(member)))?
                .first()
                .map(Row::to_value)
                .unwrap_or_default(),
            Value::Empty => Value::Empty,
            other => {
                return Err(ApplyError::Evaluation(format!(
                    "navigation `{}` holds a {} value",
                    item.navigation,
                    other.to_variant_string()
                )));
            }
        };
        record.insert(item.navigation.clone(), expanded);
    }
    Ok(Row::Entity(record))
}

fn entity_rows(members: Vec<Value>, navigation: &str) -> Result<Vec<Row>> {
    members
        .into_iter()
        .filter(|member| !member.is_empty())
        .map(|member| match member {
            Value::Object(record) => Ok(Row::Entity(record)),
            other => Err(ApplyError::Evaluation(format!(
                "collection `{navigation}` contains a {} value",
                other.to_variant_string()
            ))),
        })
        .collect()
}

fn group(grouping: &Grouping, rows: RowIter<'_>) -> Result<Vec<Row>> {
    let mut partitions: IndexMap<Vec<Value>, Vec<Row>> = IndexMap::new();
    for row in rows {
        let row = row?;
        let key = grouping
            .keys
            .iter()
            .map(|key| evaluate(&key.expr, &row))
            .collect::<Result<Vec<_>>>()?;
        partitions.entry(key).or_default().push(row);
    }
    trace!(partitions = partitions.len(), "grouped rows");

    partitions
        .into_iter()
        .map(|(key, members)| {
            let keys = ExtraFieldContainer::from_declared(
                grouping
                    .keys
                    .iter()
                    .zip(key)
                    .map(|(decl, value)| (decl.name.clone(), value, decl.ty.clone())),
            );
            let mut aggregates = ExtraFieldContainer::new();
            for aggregate in &grouping.aggregates {
                let (value, ty) = aggregate_partition(aggregate, &members)?;
                aggregates.push(aggregate.alias(), value, ty);
            }
            Ok(Row::Grouped { keys, aggregates })
        })
        .collect()
}

fn aggregate_partition(
    aggregate: &CompiledAggregate,
    members: &[Row],
) -> Result<(Value, FieldType)> {
    match aggregate {
        CompiledAggregate::Count { .. } => Ok((Value::I64(members.len() as i64), FieldType::I64)),
        CompiledAggregate::Reduce {
            input,
            reduction,
            input_type,
            ..
        } => {
            let values = members
                .iter()
                .map(|row| evaluate(input, row))
                .collect::<Result<Vec<_>>>()?;
            let result = reduce(reduction, values, input_type)?;
            Ok((result, reduction_type(reduction, input_type)))
        }
        CompiledAggregate::EntitySet {
            alias,
            collection,
            plan,
        } => {
            let mut related = Vec::new();
            for row in members {
                match evaluate(collection, row)? {
                    Value::Array(items) => related.extend(entity_rows(items, alias)?),
                    Value::Empty => {}
                    other => {
                        return Err(ApplyError::Evaluation(format!(
                            "navigation `{alias}` holds a {} value",
                            other.to_variant_string()
                        )));
                    }
                }
            }
            let nested = execute_plan(plan, related.into_iter())?;
            Ok((
                Value::Array(nested.iter().map(Row::to_value).collect()),
                FieldType::Array(Box::new(FieldType::Dynamic)),
            ))
        }
    }
}

fn sort(keys: &[SortKey], rows: RowIter<'_>) -> Result<Vec<Row>> {
    let mut keyed = rows
        .map(|row| {
            let row = row?;
            let values = keys
                .iter()
                .map(|key| evaluate(&key.expr, &row))
                .collect::<Result<Vec<_>>>()?;
            Ok((values, row))
        })
        .collect::<Result<Vec<_>>>()?;
    // stable: ties keep their input order
    keyed.sort_by(|(a, _), (b, _)| {
        keys.iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(key, (a, b))| {
                let ordering = a.cmp(b);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}
