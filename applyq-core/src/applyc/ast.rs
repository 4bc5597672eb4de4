//! Transformation AST consumed by the binder.
//!
//! The parser that produces these nodes lives outside this crate; the types derive
//! `Deserialize` so a pipeline can also be loaded from JSON.

use crate::{applyc::schema::FieldType, protocol::value::Value};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationKind {
    Filter,
    GroupBy,
    Aggregate,
    Compute,
    Expand,
}

impl Display for TransformationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformationKind::Filter => write!(f, "filter"),
            TransformationKind::GroupBy => write!(f, "groupby"),
            TransformationKind::Aggregate => write!(f, "aggregate"),
            TransformationKind::Compute => write!(f, "compute"),
            TransformationKind::Expand => write!(f, "expand"),
        }
    }
}

/// One stage of an apply pipeline. Stages run in the order given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformationNode {
    Filter {
        predicate: ScalarNode,
    },
    #[serde(rename = "groupby")]
    GroupBy {
        keys: Vec<ScalarNode>,
        #[serde(default)]
        aggregate: Vec<AggregateExpression>,
    },
    Aggregate {
        expressions: Vec<AggregateExpression>,
    },
    Compute {
        items: Vec<ComputeExpression>,
    },
    Expand {
        #[serde(flatten)]
        clause: ExpandClause,
    },
}

impl TransformationNode {
    pub fn kind(&self) -> TransformationKind {
        match self {
            TransformationNode::Filter { .. } => TransformationKind::Filter,
            TransformationNode::GroupBy { .. } => TransformationKind::GroupBy,
            TransformationNode::Aggregate { .. } => TransformationKind::Aggregate,
            TransformationNode::Compute { .. } => TransformationKind::Compute,
            TransformationNode::Expand { .. } => TransformationKind::Expand,
        }
    }

    /// Every scalar expression directly owned by this stage (nested expand
    /// options and entity-set children excluded).
    pub fn expressions(&self) -> Vec<&ScalarNode> {
        match self {
            TransformationNode::Filter { predicate } => vec![predicate],
            TransformationNode::GroupBy { keys, aggregate } => keys
                .iter()
                .chain(aggregate.iter().filter_map(AggregateExpression::expression))
                .collect(),
            TransformationNode::Aggregate { expressions } => expressions
                .iter()
                .filter_map(AggregateExpression::expression)
                .collect(),
            TransformationNode::Compute { items } => items.iter().map(|i| &i.expression).collect(),
            TransformationNode::Expand { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeExpression {
    pub expression: ScalarNode,
    pub alias: String,
}

impl ComputeExpression {
    pub fn new(expression: ScalarNode, alias: impl Into<String>) -> Self {
        Self {
            expression,
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Sum,
    Min,
    Max,
    Average,
    CountDistinct,
    Custom(String),
}

impl Display for AggregationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationMethod::Sum => write!(f, "sum"),
            AggregationMethod::Min => write!(f, "min"),
            AggregationMethod::Max => write!(f, "max"),
            AggregationMethod::Average => write!(f, "average"),
            AggregationMethod::CountDistinct => write!(f, "countdistinct"),
            AggregationMethod::Custom(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregate", rename_all = "snake_case")]
pub enum AggregateExpression {
    /// `expression with method as alias`
    Property {
        expression: ScalarNode,
        method: AggregationMethod,
        alias: String,
    },
    /// `$count as alias`
    Count { alias: String },
    /// `Navigation(children...)`, aggregated per group over the related collection.
    EntitySet {
        navigation: String,
        children: Vec<AggregateExpression>,
    },
}

impl AggregateExpression {
    pub fn property(
        expression: ScalarNode,
        method: AggregationMethod,
        alias: impl Into<String>,
    ) -> Self {
        AggregateExpression::Property {
            expression,
            method,
            alias: alias.into(),
        }
    }

    pub fn count(alias: impl Into<String>) -> Self {
        AggregateExpression::Count {
            alias: alias.into(),
        }
    }

    pub fn entity_set(navigation: impl Into<String>, children: Vec<AggregateExpression>) -> Self {
        AggregateExpression::EntitySet {
            navigation: navigation.into(),
            children,
        }
    }

    fn expression(&self) -> Option<&ScalarNode> {
        match self {
            AggregateExpression::Property { expression, .. } => Some(expression),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandClause {
    pub items: Vec<ExpandItem>,
}

impl ExpandClause {
    pub fn new(items: Vec<ExpandItem>) -> Self {
        Self { items }
    }
}

/// One selected navigation with its nested options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandItem {
    pub navigation: String,
    #[serde(default)]
    pub filter: Option<ScalarNode>,
    #[serde(default)]
    pub compute: Vec<ComputeExpression>,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub apply: Vec<TransformationNode>,
}

impl ExpandItem {
    pub fn new(navigation: impl Into<String>) -> Self {
        Self {
            navigation: navigation.into(),
            filter: None,
            compute: Vec::new(),
            select: Vec::new(),
            apply: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: ScalarNode) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_compute(mut self, compute: ComputeExpression) -> Self {
        self.compute.push(compute);
        self
    }

    pub fn with_select(mut self, field: impl Into<String>) -> Self {
        self.select.push(field.into());
        self
    }

    pub fn with_apply(mut self, transformation: TransformationNode) -> Self {
        self.apply.push(transformation);
        self
    }

    pub fn has_nested_options(&self) -> bool {
        self.filter.is_some()
            || !self.compute.is_empty()
            || !self.select.is_empty()
            || !self.apply.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOperator {
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOperator {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            BinaryOperator::Or => "||",
            BinaryOperator::And => "&&",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
        };
        write!(f, "{op}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnaryOperator {
    Not,
    Negate,
}

/// A scalar expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ScalarNode {
    /// `$it`, the current row.
    RangeVariable,
    PropertyAccess {
        source: Box<ScalarNode>,
        property: String,
    },
    ComplexAccess {
        source: Box<ScalarNode>,
        property: String,
    },
    NavigationAccess {
        source: Box<ScalarNode>,
        navigation: String,
    },
    OpenPropertyAccess {
        source: Box<ScalarNode>,
        name: String,
    },
    BinaryOperator {
        op: BinaryOperator,
        left: Box<ScalarNode>,
        right: Box<ScalarNode>,
    },
    UnaryOperator {
        op: UnaryOperator,
        operand: Box<ScalarNode>,
    },
    FunctionCall {
        name: String,
        #[serde(default)]
        arguments: Vec<ScalarNode>,
    },
    Constant {
        value: Value,
    },
    Convert {
        source: Box<ScalarNode>,
        target: FieldType,
    },
    ParameterAlias {
        name: String,
    },
    Any {
        source: Box<ScalarNode>,
        predicate: Box<ScalarNode>,
    },
    All {
        source: Box<ScalarNode>,
        predicate: Box<ScalarNode>,
    },
}

impl ScalarNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScalarNode::RangeVariable => "RangeVariable",
            ScalarNode::PropertyAccess { .. } => "PropertyAccess",
            ScalarNode::ComplexAccess { .. } => "ComplexAccess",
            ScalarNode::NavigationAccess { .. } => "NavigationAccess",
            ScalarNode::OpenPropertyAccess { .. } => "OpenPropertyAccess",
            ScalarNode::BinaryOperator { .. } => "BinaryOperator",
            ScalarNode::UnaryOperator { .. } => "UnaryOperator",
            ScalarNode::FunctionCall { .. } => "FunctionCall",
            ScalarNode::Constant { .. } => "Constant",
            ScalarNode::Convert { .. } => "Convert",
            ScalarNode::ParameterAlias { .. } => "ParameterAlias",
            ScalarNode::Any { .. } => "Any",
            ScalarNode::All { .. } => "All",
        }
    }

    /// The `/`-joined path of a member access rooted at `$it`, e.g. `Category/Name`.
    /// `None` for anything that is not a plain member chain.
    pub fn full_path(&self) -> Option<String> {
        match self {
            ScalarNode::RangeVariable => Some(String::new()),
            ScalarNode::PropertyAccess { source, property }
            | ScalarNode::ComplexAccess { source, property }
            | ScalarNode::NavigationAccess {
                source,
                navigation: property,
            }
            | ScalarNode::OpenPropertyAccess {
                source,
                name: property,
            } => {
                let prefix = source.full_path()?;
                Some(if prefix.is_empty() {
                    property.clone()
                } else {
                    format!("{prefix}/{property}")
                })
            }
            _ => None,
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&ScalarNode> {
        match self {
            ScalarNode::RangeVariable
            | ScalarNode::Constant { .. }
            | ScalarNode::ParameterAlias { .. } => Vec::new(),
            ScalarNode::PropertyAccess { source, .. }
            | ScalarNode::ComplexAccess { source, .. }
            | ScalarNode::NavigationAccess { source, .. }
            | ScalarNode::OpenPropertyAccess { source, .. }
            | ScalarNode::Convert { source, .. } => vec![source],
            ScalarNode::BinaryOperator { left, right, .. } => vec![left, right],
            ScalarNode::UnaryOperator { operand, .. } => vec![operand],
            ScalarNode::FunctionCall { arguments, .. } => arguments.iter().collect(),
            ScalarNode::Any { source, predicate } | ScalarNode::All { source, predicate } => {
                vec![source, predicate]
            }
        }
    }

    // ------------------------------------------------------------------------
    // builders
    // ------------------------------------------------------------------------

    /// `$it/name`
    pub fn property(name: impl Into<String>) -> Self {
        ScalarNode::PropertyAccess {
            source: Box::new(ScalarNode::RangeVariable),
            property: name.into(),
        }
    }

    /// `$it/name` where `name` is a single-valued navigation.
    pub fn navigation(name: impl Into<String>) -> Self {
        ScalarNode::NavigationAccess {
            source: Box::new(ScalarNode::RangeVariable),
            navigation: name.into(),
        }
    }

    /// `$it/name` where `name` is a complex-typed property.
    pub fn complex(name: impl Into<String>) -> Self {
        ScalarNode::ComplexAccess {
            source: Box::new(ScalarNode::RangeVariable),
            property: name.into(),
        }
    }

    /// `$it/name` where `name` is not declared (dynamic property).
    pub fn open(name: impl Into<String>) -> Self {
        ScalarNode::OpenPropertyAccess {
            source: Box::new(ScalarNode::RangeVariable),
            name: name.into(),
        }
    }

    /// Continues a member chain: `self/name`.
    pub fn then_property(self, name: impl Into<String>) -> Self {
        ScalarNode::PropertyAccess {
            source: Box::new(self),
            property: name.into(),
        }
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        ScalarNode::Constant {
            value: value.into(),
        }
    }

    pub fn null() -> Self {
        ScalarNode::Constant {
            value: Value::Empty,
        }
    }

    pub fn binary(op: BinaryOperator, left: ScalarNode, right: ScalarNode) -> Self {
        ScalarNode::BinaryOperator {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(operand: ScalarNode) -> Self {
        ScalarNode::UnaryOperator {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }
    }

    pub fn call(name: impl Into<String>, arguments: Vec<ScalarNode>) -> Self {
        ScalarNode::FunctionCall {
            name: name.into(),
            arguments,
        }
    }

    pub fn convert(source: ScalarNode, target: FieldType) -> Self {
        ScalarNode::Convert {
            source: Box::new(source),
            target,
        }
    }

    pub fn alias(name: impl Into<String>) -> Self {
        ScalarNode::ParameterAlias { name: name.into() }
    }
}
