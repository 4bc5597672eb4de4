use crate::{
    applyc::{ast::BinaryOperator, schema::FieldType},
    engine::{
        expr::{ContainerSlot, Expr},
        memory::InMemoryQuery,
        plan::{
            CompiledAggregate, CompiledExpand, Grouping, NamedExpr, Projection, QueryPlan,
            Reduction, SortKey,
        },
        queryable::{BackendKind, Queryable},
    },
    protocol::{
        error::ApplyError,
        row::{Record, Row},
        value::Value,
    },
};

fn record(fields: Vec<(&str, Value)>) -> Record {
    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn member(name: &str) -> Expr {
    Expr::Member {
        target: Box::new(Expr::It),
        name: name.to_string(),
        null_propagation: false,
    }
}

fn products() -> InMemoryQuery {
    InMemoryQuery::from_records(vec![
        record(vec![("Name", "A".into()), ("Price", Value::I32(10))]),
        record(vec![("Name", "B".into()), ("Price", Value::I32(20))]),
        record(vec![("Name", "A".into()), ("Price", Value::I32(5))]),
    ])
}

fn object(value: &Value) -> &Record {
    value.as_object().unwrap()
}

// ============================================================================
// Filter / Sort / Paging
// ============================================================================

#[test]
fn test_filter_keeps_matching_rows() {
    let query = products().filter(Expr::Binary {
        op: BinaryOperator::Gt,
        left: Box::new(member("Price")),
        right: Box::new(Expr::Constant(Value::I32(6))),
    });
    let rows = query.execute().unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_filter_drops_null_predicates() {
    let query = products().filter(Expr::Constant(Value::Empty));
    assert!(query.execute().unwrap().is_empty());
}

#[test]
fn test_non_boolean_predicate_fails_on_execute() {
    let query = products().filter(member("Name"));
    assert!(matches!(query.execute(), Err(ApplyError::Evaluation(_))));
}

#[test]
fn test_order_skip_take() {
    let query = products()
        .order_by(vec![SortKey {
            expr: member("Price"),
            descending: true,
        }])
        .skip(1)
        .take(1);
    let values = query.execute_values().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(object(&values[0])["Price"], Value::I32(10));
}

#[test]
fn test_order_is_stable_on_ties() {
    let query = products().order_by(vec![SortKey {
        expr: member("Name"),
        descending: false,
    }]);
    let values = query.execute_values().unwrap();
    let prices: Vec<_> = values.iter().map(|v| object(v)["Price"].clone()).collect();
    assert_eq!(prices, vec![Value::I32(10), Value::I32(5), Value::I32(20)]);
}

// ============================================================================
// Projections
// ============================================================================

#[test]
fn test_compute_wraps_instance() {
    let query = products().select(Projection::Compute {
        extras: vec![NamedExpr::new(
            "Double",
            Expr::Boxed(Box::new(Expr::Binary {
                op: BinaryOperator::Mul,
                left: Box::new(member("Price")),
                right: Box::new(Expr::Constant(Value::I32(2))),
            })),
            FieldType::I32,
        )],
    });
    let rows = query.execute().unwrap();
    assert!(matches!(&rows[0], Row::Wrapper { instance: Some(_), .. }));
    let value = rows[0].to_value();
    assert_eq!(object(&value)["Name"], Value::from("A"));
    assert_eq!(object(&value)["Double"], Value::I32(20));
}

#[test]
fn test_computed_field_is_readable_by_later_filter() {
    let query = products()
        .select(Projection::Compute {
            extras: vec![NamedExpr::new(
                "Double",
                Expr::Binary {
                    op: BinaryOperator::Mul,
                    left: Box::new(Expr::Member {
                        target: Box::new(Expr::Instance(Box::new(Expr::It))),
                        name: "Price".to_string(),
                        null_propagation: false,
                    }),
                    right: Box::new(Expr::Constant(Value::I32(2))),
                },
                FieldType::I32,
            )],
        })
        .filter(Expr::Binary {
            op: BinaryOperator::Ge,
            left: Box::new(Expr::Container {
                target: Box::new(Expr::It),
                slot: ContainerSlot::Extras,
                name: "Double".to_string(),
            }),
            right: Box::new(Expr::Constant(Value::I32(20))),
        });
    assert_eq!(query.execute().unwrap().len(), 2);
}

#[test]
fn test_flatten_then_unflatten_restores_source() {
    let query = products()
        .select(Projection::Flatten {
            properties: vec![NamedExpr::new("Property0", member("Price"), FieldType::I32)],
        })
        .select(Projection::Unflatten);
    let rows = query.execute().unwrap();
    assert!(rows.iter().all(|row| matches!(row, Row::Entity(_))));
}

// ============================================================================
// Grouping
// ============================================================================

fn sum_price() -> CompiledAggregate {
    CompiledAggregate::Reduce {
        alias: "Total".to_string(),
        input: member("Price"),
        reduction: Reduction::Sum,
        input_type: FieldType::I32,
    }
}

#[test]
fn test_group_by_name_sums_each_partition() {
    let query = products().group_by(Grouping {
        keys: vec![NamedExpr::new("Name", member("Name"), FieldType::String)],
        aggregates: vec![sum_price(), CompiledAggregate::Count {
            alias: "Count".to_string(),
        }],
    });
    let values = query.execute_values().unwrap();
    assert_eq!(values.len(), 2);
    let a = object(&values[0]);
    assert_eq!(a["Name"], Value::from("A"));
    assert_eq!(a["Total"], Value::I64(15));
    assert_eq!(a["Count"], Value::I64(2));
    let b = object(&values[1]);
    assert_eq!(b["Total"], Value::I64(20));
}

#[test]
fn test_aggregate_without_keys_yields_one_row() {
    let query = products().group_by(Grouping {
        keys: vec![],
        aggregates: vec![sum_price()],
    });
    let values = query.execute_values().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(object(&values[0])["Total"], Value::I64(35));
}

#[test]
fn test_aggregate_over_empty_input_yields_no_rows() {
    let query = InMemoryQuery::new(vec![]).group_by(Grouping {
        keys: vec![],
        aggregates: vec![sum_price()],
    });
    assert!(query.execute().unwrap().is_empty());
}

#[test]
fn test_group_keys_with_paths_are_nested() {
    let query = InMemoryQuery::from_records(vec![record(vec![(
        "Category",
        Value::Object(record(vec![("Name", "Tools".into())])),
    )])])
    .group_by(Grouping {
        keys: vec![NamedExpr::new(
            "Category/Name",
            Expr::Member {
                target: Box::new(member("Category")),
                name: "Name".to_string(),
                null_propagation: true,
            },
            FieldType::String,
        )],
        aggregates: vec![],
    });
    let values = query.execute_values().unwrap();
    let category = object(&values[0])["Category"].as_object().unwrap();
    assert_eq!(category["Name"], Value::from("Tools"));
}

#[test]
fn test_entity_set_aggregate_runs_nested_plan() {
    let orders = |amounts: &[i32]| {
        Value::Array(
            amounts
                .iter()
                .map(|a| Value::Object(record(vec![("Amount", Value::I32(*a))])))
                .collect(),
        )
    };
    let nested = QueryPlan::new(BackendKind::InMemory).group_by(Grouping {
        keys: vec![],
        aggregates: vec![CompiledAggregate::Reduce {
            alias: "Total".to_string(),
            input: member("Amount"),
            reduction: Reduction::Sum,
            input_type: FieldType::I32,
        }],
    });
    let query = InMemoryQuery::from_records(vec![
        record(vec![("Orders", orders(&[25, 75]))]),
        record(vec![("Orders", orders(&[25, 75]))]),
    ])
    .group_by(Grouping {
        keys: vec![],
        aggregates: vec![CompiledAggregate::EntitySet {
            alias: "Orders".to_string(),
            collection: member("Orders"),
            plan: nested,
        }],
    });
    let values = query.execute_values().unwrap();
    let Value::Array(nested_rows) = &object(&values[0])["Orders"] else {
        panic!("expected an array");
    };
    assert_eq!(object(&nested_rows[0])["Total"], Value::I64(200));
}

// ============================================================================
// Expand
// ============================================================================

#[test]
fn test_expand_applies_nested_plan_per_entity() {
    let nested = QueryPlan::new(BackendKind::InMemory).filter(Expr::Binary {
        op: BinaryOperator::Gt,
        left: Box::new(member("Amount")),
        right: Box::new(Expr::Constant(Value::I32(30))),
    });
    let query = InMemoryQuery::from_records(vec![record(vec![(
        "Orders",
        Value::Array(vec![
            Value::Object(record(vec![("Amount", Value::I32(25))])),
            Value::Object(record(vec![("Amount", Value::I32(75))])),
        ]),
    )])])
    .select(Projection::Expand {
        items: vec![CompiledExpand {
            navigation: "Orders".to_string(),
            collection: true,
            plan: Some(nested),
        }],
    });
    let values = query.execute_values().unwrap();
    let Value::Array(orders) = &object(&values[0])["Orders"] else {
        panic!("expected an array");
    };
    assert_eq!(orders.len(), 1);
}

#[test]
fn test_expand_over_wrapper_rows_fails() {
    let query = products()
        .select(Projection::Select { fields: vec![] })
        .select(Projection::Expand {
            items: vec![CompiledExpand {
                navigation: "Orders".to_string(),
                collection: true,
                plan: None,
            }],
        });
    assert!(matches!(query.execute(), Err(ApplyError::Evaluation(_))));
}
