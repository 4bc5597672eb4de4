use super::test_utils::{bind_in_memory, field, model, run, sum};
use crate::{
    applyc::{
        ast::{
            AggregateExpression, BinaryOperator, ComputeExpression, ExpandClause, ExpandItem,
            ScalarNode, TransformationNode,
        },
        settings::ApplySettings,
    },
    protocol::{error::ApplyError, value::Value},
};

const CUSTOMERS: &str = r#"[
    {"Name": "Ada", "Orders": [{"Amount": 25, "Status": "open"}, {"Amount": 75, "Status": "closed"}]},
    {"Name": "Bob", "Orders": [{"Amount": 40, "Status": "open"}]}
]"#;

fn expand(items: Vec<ExpandItem>) -> TransformationNode {
    TransformationNode::Expand {
        clause: ExpandClause::new(items),
    }
}

fn open_orders() -> ScalarNode {
    ScalarNode::binary(
        BinaryOperator::Eq,
        ScalarNode::property("Status"),
        ScalarNode::constant("open"),
    )
}

fn orders(row: &Value) -> &[Value] {
    match field(row, "Orders") {
        Value::Array(items) => items.as_slice(),
        _ => &[],
    }
}

// ============================================================================
// Fallback Expansion
// ============================================================================

#[test]
fn test_expand_with_nested_filter() {
    let rows = run(
        "Customer",
        CUSTOMERS,
        &[expand(vec![ExpandItem::new("Orders").with_filter(open_orders())])],
    )
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(orders(&rows[0]).len(), 1);
    assert_eq!(field(&orders(&rows[0])[0], "Amount"), &Value::I64(25));
    assert_eq!(orders(&rows[1]).len(), 1);
}

#[test]
fn test_expand_with_nested_compute_and_select() {
    let rows = run(
        "Customer",
        CUSTOMERS,
        &[expand(vec![
            ExpandItem::new("Orders")
                .with_compute(ComputeExpression::new(
                    ScalarNode::binary(
                        BinaryOperator::Mul,
                        ScalarNode::property("Amount"),
                        ScalarNode::constant(2),
                    ),
                    "Doubled",
                ))
                .with_select("Amount"),
        ])],
    )
    .unwrap();
    let first = &orders(&rows[0])[0];
    assert_eq!(field(first, "Amount"), &Value::I64(25));
    assert!(field(first, "Status").is_empty());
}

#[test]
fn test_expand_without_nested_options_keeps_navigation() {
    let rows = run("Customer", CUSTOMERS, &[expand(vec![ExpandItem::new("Orders")])]).unwrap();
    assert_eq!(orders(&rows[0]).len(), 2);
}

#[test]
fn test_two_expands_merge() {
    let model = model();
    let settings = ApplySettings::default();
    let bound = bind_in_memory(
        &model,
        &settings,
        "Customer",
        CUSTOMERS,
        &[
            expand(vec![ExpandItem::new("Orders").with_filter(open_orders())]),
            expand(vec![ExpandItem::new("Orders")]),
        ],
    )
    .unwrap();
    assert_eq!(bound.expand.as_ref().map(|clause| clause.items.len()), Some(2));
    assert!(!bound.shape_changed);
    assert!(bound.query.plan().to_string().contains(".Include($it => $it.Orders"));
}

#[test]
fn test_expand_unknown_navigation() {
    let err = run("Customer", CUSTOMERS, &[expand(vec![ExpandItem::new("Invoices")])]).unwrap_err();
    assert!(matches!(err, ApplyError::UnknownProperty { name, .. } if name == "Invoices"));
}

// ============================================================================
// Expansion After A Shape Change
// ============================================================================

#[test]
fn test_expand_after_aggregate_fails() {
    let err = run(
        "Customer",
        CUSTOMERS,
        &[
            TransformationNode::Aggregate {
                expressions: vec![AggregateExpression::count("N")],
            },
            expand(vec![ExpandItem::new("Orders")]),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, ApplyError::InvalidPipelineState(msg) if msg.contains("aggregation")));
}

#[test]
fn test_single_valued_expand_after_compute_fails() {
    let err = run(
        "Product",
        r#"[{"ID": 1, "Name": "A", "Price": 1, "Category": {"Name": "Tools"}}]"#,
        &[
            expand(vec![ExpandItem::new("Category")]),
            TransformationNode::Compute {
                items: vec![ComputeExpression::new(ScalarNode::constant(1), "One")],
            },
        ],
    )
    .unwrap_err();
    assert!(matches!(err, ApplyError::InvalidPipelineState(msg) if msg.contains("Category")));
}

#[test]
fn test_collection_expand_after_compute_is_dropped() {
    let model = model();
    let settings = ApplySettings::default();
    let bound = bind_in_memory(
        &model,
        &settings,
        "Customer",
        CUSTOMERS,
        &[
            expand(vec![ExpandItem::new("Orders").with_filter(open_orders())]),
            TransformationNode::Compute {
                items: vec![ComputeExpression::new(ScalarNode::constant(1), "One")],
            },
        ],
    )
    .unwrap();
    assert!(!bound.query.plan().to_string().contains("Include"));
    let rows = bound.query.execute_values().unwrap();
    // the nested filter never ran
    assert_eq!(orders(&rows[0]).len(), 2);
}

#[test]
fn test_expand_consumed_by_entity_set_aggregation() {
    let rows = run(
        "Customer",
        CUSTOMERS,
        &[
            expand(vec![ExpandItem::new("Orders").with_filter(open_orders())]),
            TransformationNode::Aggregate {
                expressions: vec![AggregateExpression::entity_set(
                    "Orders",
                    vec![sum("Amount", "Total")],
                )],
            },
        ],
    )
    .unwrap();
    assert_eq!(field(&orders(&rows[0])[0], "Total"), &Value::I64(65));
}
