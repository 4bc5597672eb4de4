use crate::{
    applyc::{
        ast::{BinaryOperator, UnaryOperator},
        extensions::CustomFunction,
        schema::FieldType,
    },
    engine::functions::BuiltinFunction,
    protocol::value::Value,
};
use std::fmt::Display;

/// Which named-value list of a synthesized row a [`Expr::Container`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerSlot {
    Extras,
    Keys,
    Aggregates,
    Flattened,
}

impl Display for ContainerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerSlot::Extras => write!(f, "Container"),
            ContainerSlot::Keys => write!(f, "GroupByContainer"),
            ContainerSlot::Aggregates => write!(f, "AggregateContainer"),
            ContainerSlot::Flattened => write!(f, "FlattenedContainer"),
        }
    }
}

/// A compiled, backend-neutral expression over one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The row being evaluated.
    It,
    /// `source` of a flattened row.
    Source(Box<Expr>),
    /// `instance` of a wrapper row.
    Instance(Box<Expr>),
    /// A declared member of an entity, complex or navigation value.
    Member {
        target: Box<Expr>,
        name: String,
        null_propagation: bool,
    },
    /// A named value introduced by an earlier stage.
    Container {
        target: Box<Expr>,
        slot: ContainerSlot,
        name: String,
    },
    /// Guarded lookup in an open type's dynamic-property dictionary.
    DynamicLookup {
        target: Box<Expr>,
        container: String,
        key: String,
        null_propagation: bool,
    },
    Constant(Value),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Call {
        function: BuiltinFunction,
        arguments: Vec<Expr>,
        null_propagation: bool,
    },
    Custom {
        function: CustomFunction,
        arguments: Vec<Expr>,
    },
    Convert {
        source: Box<Expr>,
        target: FieldType,
    },
    /// Scalar boxed to an untyped slot before being stored in a container.
    Boxed(Box<Expr>),
}

impl Expr {
    pub fn contains_boxing(&self) -> bool {
        match self {
            Expr::Boxed(_) => true,
            Expr::It | Expr::Constant(_) => false,
            Expr::Source(inner) | Expr::Instance(inner) => inner.contains_boxing(),
            Expr::Member { target, .. }
            | Expr::Container { target, .. }
            | Expr::DynamicLookup { target, .. } => target.contains_boxing(),
            Expr::Binary { left, right, .. } => left.contains_boxing() || right.contains_boxing(),
            Expr::Unary { operand, .. } => operand.contains_boxing(),
            Expr::Call { arguments, .. } | Expr::Custom { arguments, .. } => {
                arguments.iter().any(Expr::contains_boxing)
            }
            Expr::Convert { source, .. } => source.contains_boxing(),
        }
    }
}

fn write_arguments(f: &mut std::fmt::Formatter<'_>, arguments: &[Expr]) -> std::fmt::Result {
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{argument}")?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::It => write!(f, "$it"),
            Expr::Source(inner) => write!(f, "{inner}.Source"),
            Expr::Instance(inner) => write!(f, "{inner}.Instance"),
            Expr::Member {
                target,
                name,
                null_propagation: true,
            } => write!(f, "{target}?.{name}"),
            Expr::Member { target, name, .. } => write!(f, "{target}.{name}"),
            Expr::Container { target, slot, name } => write!(f, "{target}.{slot}[\"{name}\"]"),
            Expr::DynamicLookup {
                target,
                container,
                key,
                null_propagation: true,
            } => write!(
                f,
                "({target}.{container} != null && {target}.{container}.ContainsKey(\"{key}\") ? {target}.{container}[\"{key}\"] : null)"
            ),
            Expr::DynamicLookup {
                target,
                container,
                key,
                ..
            } => write!(
                f,
                "({target}.{container}.ContainsKey(\"{key}\") ? {target}.{container}[\"{key}\"] : null)"
            ),
            Expr::Constant(value) => write!(f, "{value}"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Unary {
                op: UnaryOperator::Not,
                operand,
            } => write!(f, "!{operand}"),
            Expr::Unary {
                op: UnaryOperator::Negate,
                operand,
            } => write!(f, "-{operand}"),
            Expr::Call {
                function,
                arguments,
                ..
            } => {
                write!(f, "{function}(")?;
                write_arguments(f, arguments)?;
                write!(f, ")")
            }
            Expr::Custom {
                function,
                arguments,
            } => {
                write!(f, "{}(", function.name)?;
                write_arguments(f, arguments)?;
                write!(f, ")")
            }
            Expr::Convert { source, target } => write!(f, "Convert({source}, {target})"),
            Expr::Boxed(inner) => write!(f, "(object){inner}"),
        }
    }
}
