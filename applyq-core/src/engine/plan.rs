use crate::{
    applyc::{extensions::CustomReducer, schema::FieldType},
    engine::{
        expr::Expr,
        queryable::{BackendKind, Queryable},
    },
};
use std::fmt::{self, Display};

#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpr {
    pub name: String,
    pub expr: Expr,
    pub ty: FieldType,
}

impl NamedExpr {
    pub fn new(name: impl Into<String>, expr: Expr, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            expr,
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `{ instance: $it, extras }`
    Compute { extras: Vec<NamedExpr> },
    /// `{ source: $it, flattened }`
    Flatten { properties: Vec<NamedExpr> },
    /// Drops flattening wrappers again.
    Unflatten,
    /// `{ extras }` with no instance.
    Select { fields: Vec<NamedExpr> },
    /// Replaces navigation members of each entity with their (optionally
    /// transformed) related values.
    Expand { items: Vec<CompiledExpand> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpand {
    pub navigation: String,
    pub collection: bool,
    pub plan: Option<QueryPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
    Sum,
    Min,
    Max,
    Average,
    CountDistinct,
    Custom(CustomReducer),
}

impl Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Sum => write!(f, "Sum"),
            Reduction::Min => write!(f, "Min"),
            Reduction::Max => write!(f, "Max"),
            Reduction::Average => write!(f, "Average"),
            Reduction::CountDistinct => write!(f, "CountDistinct"),
            Reduction::Custom(reducer) => write!(f, "{}", reducer.method),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledAggregate {
    Reduce {
        alias: String,
        input: Expr,
        reduction: Reduction,
        input_type: FieldType,
    },
    Count {
        alias: String,
    },
    /// Runs `plan` over the related collection gathered from every member of the group.
    EntitySet {
        alias: String,
        collection: Expr,
        plan: QueryPlan,
    },
}

impl CompiledAggregate {
    pub fn alias(&self) -> &str {
        match self {
            CompiledAggregate::Reduce { alias, .. }
            | CompiledAggregate::Count { alias }
            | CompiledAggregate::EntitySet { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    pub keys: Vec<NamedExpr>,
    pub aggregates: Vec<CompiledAggregate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    Filter(Expr),
    Select(Projection),
    GroupBy(Grouping),
    OrderBy(Vec<SortKey>),
    Skip(usize),
    Take(usize),
}

/// An ordered list of deferred operations for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    backend: BackendKind,
    ops: Vec<QueryOp>,
}

impl QueryPlan {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[QueryOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn push(mut self, op: QueryOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Every compiled expression of the plan, nested plans included.
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        for op in &self.ops {
            match op {
                QueryOp::Filter(expr) => out.push(expr),
                QueryOp::Select(projection) => match projection {
                    Projection::Compute { extras: fields }
                    | Projection::Flatten { properties: fields }
                    | Projection::Select { fields } => out.extend(fields.iter().map(|f| &f.expr)),
                    Projection::Unflatten => {}
                    Projection::Expand { items } => {
                        for item in items {
                            if let Some(plan) = &item.plan {
                                out.extend(plan.expressions());
                            }
                        }
                    }
                },
                QueryOp::GroupBy(grouping) => {
                    out.extend(grouping.keys.iter().map(|k| &k.expr));
                    for aggregate in &grouping.aggregates {
                        match aggregate {
                            CompiledAggregate::Reduce { input, .. } => out.push(input),
                            CompiledAggregate::Count { .. } => {}
                            CompiledAggregate::EntitySet {
                                collection, plan, ..
                            } => {
                                out.push(collection);
                                out.extend(plan.expressions());
                            }
                        }
                    }
                }
                QueryOp::OrderBy(keys) => out.extend(keys.iter().map(|k| &k.expr)),
                QueryOp::Skip(_) | QueryOp::Take(_) => {}
            }
        }
        out
    }

    pub fn contains_boxing(&self) -> bool {
        self.expressions().into_iter().any(Expr::contains_boxing)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "    ".repeat(indent);
        for op in &self.ops {
            match op {
                QueryOp::Filter(expr) => writeln!(f, "{pad}.Where($it => {expr})")?,
                QueryOp::Select(Projection::Compute { extras }) => {
                    writeln!(f, "{pad}.Select($it => new ComputeWrapper {{ Instance = $it{} }})", fields(extras))?
                }
                QueryOp::Select(Projection::Flatten { properties }) => writeln!(
                    f,
                    "{pad}.Select($it => new FlatteningWrapper {{ Source = $it{} }})",
                    fields(properties)
                )?,
                QueryOp::Select(Projection::Unflatten) => writeln!(f, "{pad}.Select($it => $it.Source)")?,
                QueryOp::Select(Projection::Select { fields: selected }) => {
                    writeln!(f, "{pad}.Select($it => new Wrapper {{ {} }})", fields(selected).trim_start_matches(", "))?
                }
                QueryOp::Select(Projection::Expand { items }) => {
                    for item in items {
                        match &item.plan {
                            None => writeln!(f, "{pad}.Include($it => $it.{})", item.navigation)?,
                            Some(plan) => {
                                writeln!(f, "{pad}.Include($it => $it.{}", item.navigation)?;
                                plan.render(f, indent + 1)?;
                                writeln!(f, "{pad})")?;
                            }
                        }
                    }
                }
                QueryOp::GroupBy(grouping) => {
                    writeln!(
                        f,
                        "{pad}.GroupBy($it => new GroupByWrapper {{ {} }})",
                        fields(&grouping.keys).trim_start_matches(", ")
                    )?;
                    writeln!(f, "{pad}.Select($g => new AggregationWrapper {{")?;
                    for aggregate in &grouping.aggregates {
                        match aggregate {
                            CompiledAggregate::Reduce {
                                alias,
                                input,
                                reduction,
                                ..
                            } => writeln!(f, "{pad}    {alias} = $g.{reduction}($it => {input}),")?,
                            CompiledAggregate::Count { alias } => {
                                writeln!(f, "{pad}    {alias} = $g.Count(),")?
                            }
                            CompiledAggregate::EntitySet {
                                alias,
                                collection,
                                plan,
                            } => {
                                writeln!(f, "{pad}    {alias} = $g.SelectMany($it => {collection})")?;
                                plan.render(f, indent + 2)?;
                                writeln!(f, "{pad}    ,")?;
                            }
                        }
                    }
                    writeln!(f, "{pad}}})")?;
                }
                QueryOp::OrderBy(keys) => {
                    for (i, key) in keys.iter().enumerate() {
                        let method = match (i, key.descending) {
                            (0, false) => "OrderBy",
                            (0, true) => "OrderByDescending",
                            (_, false) => "ThenBy",
                            (_, true) => "ThenByDescending",
                        };
                        writeln!(f, "{pad}.{method}($it => {})", key.expr)?;
                    }
                }
                QueryOp::Skip(count) => writeln!(f, "{pad}.Skip({count})")?,
                QueryOp::Take(count) => writeln!(f, "{pad}.Take({count})")?,
            }
        }
        Ok(())
    }
}

fn fields(fields: &[NamedExpr]) -> String {
    fields
        .iter()
        .map(|field| format!(", {} = {}", field.name, field.expr))
        .collect()
}

impl Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "source<{}>", self.backend)?;
        self.render(f, 1)
    }
}

impl Queryable for QueryPlan {
    fn backend(&self) -> &BackendKind {
        &self.backend
    }

    fn filter(self, predicate: Expr) -> Self {
        self.push(QueryOp::Filter(predicate))
    }

    fn select(self, projection: Projection) -> Self {
        self.push(QueryOp::Select(projection))
    }

    fn group_by(self, grouping: Grouping) -> Self {
        self.push(QueryOp::GroupBy(grouping))
    }

    fn order_by(self, keys: Vec<SortKey>) -> Self {
        self.push(QueryOp::OrderBy(keys))
    }

    fn skip(self, count: usize) -> Self {
        self.push(QueryOp::Skip(count))
    }

    fn take(self, count: usize) -> Self {
        self.push(QueryOp::Take(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::value::Value;

    #[test]
    fn test_operations_are_recorded_in_order() {
        let plan = QueryPlan::new(BackendKind::InMemory)
            .filter(Expr::Constant(Value::Boolean(true)))
            .skip(2)
            .take(5);
        assert_eq!(plan.ops().len(), 3);
        assert!(matches!(plan.ops()[1], QueryOp::Skip(2)));
        assert!(matches!(plan.ops()[2], QueryOp::Take(5)));
    }

    #[test]
    fn test_render_lists_each_operation() {
        let plan = QueryPlan::new(BackendKind::InMemory)
            .filter(Expr::Constant(Value::Boolean(true)))
            .take(5);
        let rendered = plan.to_string();
        assert!(rendered.starts_with("source<in-memory>"));
        assert!(rendered.contains(".Where($it => true)"));
        assert!(rendered.contains(".Take(5)"));
    }

    #[test]
    fn test_contains_boxing_looks_into_projections() {
        let plan = QueryPlan::new(BackendKind::InMemory).select(Projection::Compute {
            extras: vec![NamedExpr::new(
                "X",
                Expr::Boxed(Box::new(Expr::Constant(Value::I32(1)))),
                FieldType::I32,
            )],
        });
        assert!(plan.contains_boxing());
    }
}
