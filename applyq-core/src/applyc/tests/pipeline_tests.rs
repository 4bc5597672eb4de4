use super::test_utils::{bind_in_memory, field, filter, model, run};
use crate::{
    applyc::{
        ast::{
            AggregateExpression, BinaryOperator, ComputeExpression, ScalarNode, TransformationNode,
        },
        compiler::ApplyBinder,
        schema::FieldType,
        settings::{ApplySettings, NullPropagation},
    },
    engine::{queryable::Queryable, translate::TranslatedQuery},
    protocol::{error::ApplyError, value::Value},
};

const PRODUCTS: &str = r#"[
    {"ID": 1, "Name": "Widget", "Price": 10, "Category": {"Name": "Tools"}, "Dynamic": {"Color": "red"}},
    {"ID": 2, "Name": "Gadget", "Price": 25, "Category": {"Name": "Toys"}, "Dynamic": {"Color": "blue"}},
    {"ID": 3, "Name": "Doohickey", "Price": 40, "Category": null}
]"#;

fn gt(left: ScalarNode, right: ScalarNode) -> ScalarNode {
    ScalarNode::binary(BinaryOperator::Gt, left, right)
}

fn eq(left: ScalarNode, right: ScalarNode) -> ScalarNode {
    ScalarNode::binary(BinaryOperator::Eq, left, right)
}

fn names(rows: &[Value]) -> Vec<String> {
    rows.iter()
        .map(|row| field(row, "Name").inner_str().into_owned())
        .collect()
}

// ============================================================================
// Filter
// ============================================================================

#[test]
fn test_filter_keeps_rows_and_shape() {
    let rows = run(
        "Product",
        PRODUCTS,
        &[filter(gt(ScalarNode::property("Price"), ScalarNode::constant(20)))],
    )
    .unwrap();
    assert_eq!(names(&rows), vec!["Gadget", "Doohickey"]);
    assert_eq!(field(&rows[0], "ID"), &Value::I64(2));
}

#[test]
fn test_filter_leaves_shape_unchanged() {
    let model = model();
    let settings = ApplySettings::default();
    let bound = bind_in_memory(
        &model,
        &settings,
        "Product",
        PRODUCTS,
        &[filter(gt(ScalarNode::property("Price"), ScalarNode::constant(20)))],
    )
    .unwrap();
    assert!(!bound.shape_changed);
    assert_eq!(bound.describe_shape(), "Product");
}

#[test]
fn test_filter_rejects_non_boolean_predicate() {
    let err = run("Product", PRODUCTS, &[filter(ScalarNode::property("Price"))]).unwrap_err();
    assert!(matches!(err, ApplyError::InvalidPipelineState(_)));
}

#[test]
fn test_filter_unknown_root_type() {
    let err = run("Widget", PRODUCTS, &[]).unwrap_err();
    assert!(matches!(err, ApplyError::InvalidPipelineState(msg) if msg.contains("Widget")));
}

// ============================================================================
// Compute
// ============================================================================

#[test]
fn test_compute_then_filter_reads_alias() {
    let rows = run(
        "Product",
        PRODUCTS,
        &[
            TransformationNode::Compute {
                items: vec![ComputeExpression::new(
                    ScalarNode::binary(
                        BinaryOperator::Mul,
                        ScalarNode::property("Price"),
                        ScalarNode::constant(2),
                    ),
                    "DoublePrice",
                )],
            },
            filter(gt(ScalarNode::property("DoublePrice"), ScalarNode::constant(30))),
        ],
    )
    .unwrap();
    assert_eq!(names(&rows), vec!["Gadget", "Doohickey"]);
    assert_eq!(field(&rows[0], "DoublePrice"), &Value::I64(50));
}

#[test]
fn test_compute_keeps_existing_fields() {
    let model = model();
    let settings = ApplySettings::default();
    let bound = bind_in_memory(
        &model,
        &settings,
        "Product",
        PRODUCTS,
        &[TransformationNode::Compute {
            items: vec![ComputeExpression::new(
                ScalarNode::call("toupper", vec![ScalarNode::property("Name")]),
                "Loud",
            )],
        }],
    )
    .unwrap();
    assert!(bound.shape_changed);

    let declared = bound.declared_fields(&model);
    let declared_names: Vec<&str> = declared.iter().map(|f| f.name.as_str()).collect();
    assert!(declared_names.contains(&"Name"));
    assert!(declared_names.contains(&"Price"));
    assert!(declared_names.contains(&"Loud"));

    let rows = bound.query.execute_values().unwrap();
    assert_eq!(field(&rows[0], "Loud"), &Value::from("WIDGET"));
    assert_eq!(field(&rows[0], "Price"), &Value::I64(10));
}

#[test]
fn test_compute_alias_cannot_replace_field() {
    let err = run(
        "Product",
        PRODUCTS,
        &[TransformationNode::Compute {
            items: vec![ComputeExpression::new(ScalarNode::constant(1.5), "Price")],
        }],
    )
    .unwrap_err();
    assert!(matches!(err, ApplyError::InvalidPipelineState(msg) if msg.contains("`Price`")));

    // an alias from an earlier compute is a field too
    let err = run(
        "Product",
        PRODUCTS,
        &[
            TransformationNode::Compute {
                items: vec![ComputeExpression::new(ScalarNode::constant(1), "One")],
            },
            TransformationNode::Compute {
                items: vec![ComputeExpression::new(ScalarNode::constant("x"), "One")],
            },
        ],
    )
    .unwrap_err();
    assert!(matches!(err, ApplyError::InvalidPipelineState(_)));
}

#[test]
fn test_compute_duplicate_alias() {
    let err = run(
        "Product",
        PRODUCTS,
        &[TransformationNode::Compute {
            items: vec![
                ComputeExpression::new(ScalarNode::constant(1), "X"),
                ComputeExpression::new(ScalarNode::constant(2), "X"),
            ],
        }],
    )
    .unwrap_err();
    assert!(matches!(err, ApplyError::InvalidPipelineState(msg) if msg.contains("duplicate")));
}

// ============================================================================
// Flattening
// ============================================================================

#[test]
fn test_filter_across_navigation_flattens_once() {
    let model = model();
    let settings = ApplySettings::default();
    let category_name = ScalarNode::navigation("Category").then_property("Name");
    let bound = bind_in_memory(
        &model,
        &settings,
        "Product",
        PRODUCTS,
        &[
            filter(eq(category_name.clone(), ScalarNode::constant("Toys"))),
            filter(ScalarNode::binary(
                BinaryOperator::Ne,
                category_name,
                ScalarNode::constant("Tools"),
            )),
        ],
    )
    .unwrap();

    let rendered = bound.query.plan().to_string();
    assert_eq!(rendered.matches("FlatteningWrapper").count(), 1);
    assert!(rendered.contains("$it.Source"));

    let rows = bound.query.execute_values().unwrap();
    assert_eq!(names(&rows), vec!["Gadget"]);
    // flattening is invisible in the result
    assert!(field(&rows[0], "Property0").is_empty());
}

#[test]
fn test_compute_over_complex_property() {
    let rows = run(
        "Product",
        r#"[{"ID": 1, "Name": "A", "Price": 1, "Address": {"City": "Oslo"}}]"#,
        &[TransformationNode::Compute {
            items: vec![ComputeExpression::new(
                ScalarNode::complex("Address").then_property("City"),
                "City",
            )],
        }],
    )
    .unwrap();
    assert_eq!(field(&rows[0], "City"), &Value::from("Oslo"));
    assert_eq!(field(&rows[0], "Name"), &Value::from("A"));
}

// ============================================================================
// Null Propagation
// ============================================================================

#[test]
fn test_navigation_through_null_with_propagation() {
    let rows = run(
        "Product",
        PRODUCTS,
        &[TransformationNode::Compute {
            items: vec![ComputeExpression::new(
                ScalarNode::navigation("Category").then_property("Name"),
                "CategoryName",
            )],
        }],
    )
    .unwrap();
    assert_eq!(field(&rows[2], "CategoryName"), &Value::Empty);
}

#[test]
fn test_navigation_through_null_without_propagation_fails_at_execute() {
    let model = model();
    let settings = ApplySettings::default().with_null_propagation(NullPropagation::Disabled);
    let bound = bind_in_memory(
        &model,
        &settings,
        "Product",
        PRODUCTS,
        &[filter(eq(
            ScalarNode::navigation("Category").then_property("Name"),
            ScalarNode::constant("Toys"),
        ))],
    )
    .unwrap();
    let err = bound.query.execute_values().unwrap_err();
    assert!(matches!(err, ApplyError::Evaluation(_)));
    assert!(!err.is_compile_time());
}

// ============================================================================
// Open Properties
// ============================================================================

#[test]
fn test_open_property_filter() {
    let rows = run(
        "Product",
        PRODUCTS,
        &[filter(eq(ScalarNode::open("Color"), ScalarNode::constant("blue")))],
    )
    .unwrap();
    assert_eq!(names(&rows), vec!["Gadget"]);
}

#[test]
fn test_open_property_missing_container_with_propagation() {
    let rows = run(
        "Product",
        PRODUCTS,
        &[TransformationNode::Compute {
            items: vec![ComputeExpression::new(ScalarNode::open("Color"), "Color")],
        }],
    )
    .unwrap();
    assert_eq!(field(&rows[0], "Color"), &Value::from("red"));
    assert_eq!(field(&rows[2], "Color"), &Value::Empty);
}

#[test]
fn test_open_property_missing_container_without_propagation() {
    let model = model();
    let settings = ApplySettings::default().with_null_propagation(NullPropagation::Disabled);
    let bound = bind_in_memory(
        &model,
        &settings,
        "Product",
        PRODUCTS,
        &[TransformationNode::Compute {
            items: vec![ComputeExpression::new(ScalarNode::open("Color"), "Color")],
        }],
    )
    .unwrap();
    assert!(matches!(
        bound.query.execute_values().unwrap_err(),
        ApplyError::Evaluation(_)
    ));
}

#[test]
fn test_open_property_on_closed_type() {
    let err = run(
        "Category",
        r#"[{"Name": "Tools"}]"#,
        &[filter(eq(ScalarNode::open("Color"), ScalarNode::constant("red")))],
    )
    .unwrap_err();
    assert!(matches!(err, ApplyError::UnknownProperty { name, .. } if name == "Color"));
}

// ============================================================================
// Backends
// ============================================================================

#[test]
fn test_translated_plan_has_no_boxing() {
    let model = model();
    let settings = ApplySettings::default();
    let pipeline = [TransformationNode::Compute {
        items: vec![ComputeExpression::new(ScalarNode::property("Price"), "P")],
    }];

    let translated = ApplyBinder::new(&model, &settings, "Product")
        .bind(TranslatedQuery::new("sql"), &pipeline)
        .unwrap();
    assert!(!translated.query.plan().contains_boxing());
    assert_eq!(translated.query.backend().name(), "sql");

    let in_memory = bind_in_memory(&model, &settings, "Product", PRODUCTS, &pipeline).unwrap();
    assert!(in_memory.query.plan().contains_boxing());
}

#[test]
fn test_translated_defaults_to_no_null_propagation() {
    let model = model();
    let settings = ApplySettings::default();
    let bound = ApplyBinder::new(&model, &settings, "Product")
        .bind(
            TranslatedQuery::new("sql"),
            &[filter(eq(ScalarNode::open("Color"), ScalarNode::constant("red")))],
        )
        .unwrap();
    let rendered = bound.query.render();
    assert!(rendered.contains("Dynamic"));
    assert!(!rendered.contains("?."));
}

#[test]
fn test_bind_rejects_backend_without_apply() {
    let model = model();
    let settings = ApplySettings::default();
    let binder = ApplyBinder::new(&model, &settings, "Product");
    let err = binder
        .bind(
            TranslatedQuery::new("legacy").without_apply(),
            &[TransformationNode::Aggregate {
                expressions: vec![AggregateExpression::count("C")],
            }],
        )
        .unwrap_err();
    assert!(matches!(
        &err,
        ApplyError::BackendUnsupported { backend, .. } if backend == "legacy"
    ));
    assert!(err.is_compile_time());

    // nothing to apply is fine on any backend
    assert!(
        binder
            .bind(TranslatedQuery::new("legacy").without_apply(), &[])
            .is_ok()
    );
}

#[test]
fn test_binding_is_deterministic() {
    let model = model();
    let settings = ApplySettings::default();
    let pipeline = [
        filter(eq(
            ScalarNode::navigation("Category").then_property("Name"),
            ScalarNode::constant("Toys"),
        )),
        TransformationNode::Compute {
            items: vec![ComputeExpression::new(
                ScalarNode::convert(ScalarNode::property("Price"), FieldType::F64),
                "PriceF",
            )],
        },
    ];
    let first = ApplyBinder::new(&model, &settings, "Product")
        .bind(TranslatedQuery::new("sql"), &pipeline)
        .unwrap();
    let second = ApplyBinder::new(&model, &settings, "Product")
        .bind(TranslatedQuery::new("sql"), &pipeline)
        .unwrap();
    assert_eq!(first.query.plan(), second.query.plan());
    assert_eq!(first.query.render(), second.query.render());
}
