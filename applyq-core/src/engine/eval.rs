use crate::{
    applyc::ast::{BinaryOperator, UnaryOperator},
    engine::expr::{ContainerSlot, Expr},
    protocol::{
        error::{ApplyError, Result},
        row::{ExtraFieldContainer, Row},
        value::Value,
    },
};
use std::{borrow::Cow, cmp::Ordering};

/// Intermediate result: either a whole row or a value read from one.
enum Operand<'r> {
    Row(&'r Row),
    Value(Cow<'r, Value>),
}

impl<'r> Operand<'r> {
    fn into_value(self) -> Value {
        match self {
            Operand::Row(row) => row.to_value(),
            Operand::Value(value) => value.into_owned(),
        }
    }
}

/// Evaluates `expr` against one row.
pub fn evaluate(expr: &Expr, row: &Row) -> Result<Value> {
    Ok(eval_operand(expr, row)?.into_value())
}

/// Evaluates a predicate: only `true` keeps the row; `false` and null drop it.
pub fn evaluate_predicate(expr: &Expr, row: &Row) -> Result<bool> {
    match evaluate(expr, row)? {
        Value::Boolean(b) => Ok(b),
        Value::Empty => Ok(false),
        other => Err(ApplyError::Evaluation(format!(
            "predicate evaluated to {} instead of Boolean",
            other.to_variant_string()
        ))),
    }
}

fn eval_operand<'r>(expr: &Expr, row: &'r Row) -> Result<Operand<'r>> {
    match expr {
        Expr::It => Ok(Operand::Row(row)),
        Expr::Source(inner) => match eval_operand(inner, row)? {
            Operand::Row(Row::Flattened { source, .. }) => Ok(Operand::Row(source.as_ref())),
            other => Err(shape_mismatch("a flattened row", &other)),
        },
        Expr::Instance(inner) => match eval_operand(inner, row)? {
            Operand::Row(Row::Wrapper {
                instance: Some(instance),
                ..
            }) => Ok(Operand::Row(instance.as_ref())),
            other => Err(shape_mismatch("a wrapper row with an instance", &other)),
        },
        Expr::Member {
            target,
            name,
            null_propagation,
        } => {
            let target = eval_operand(target, row)?;
            read_member(target, name, *null_propagation)
        }
        Expr::Container { target, slot, name } => match eval_operand(target, row)? {
            Operand::Row(target) => {
                let container = container_of(target, *slot).ok_or_else(|| {
                    ApplyError::Evaluation(format!("row has no {slot} to read `{name}` from"))
                })?;
                container
                    .value(name)
                    .map(|v| Operand::Value(Cow::Borrowed(v)))
                    .ok_or_else(|| {
                        ApplyError::Evaluation(format!("`{name}` is missing from the {slot}"))
                    })
            }
            other => Err(shape_mismatch("a synthesized row", &other)),
        },
        Expr::DynamicLookup {
            target,
            container,
            key,
            null_propagation,
        } => {
            let target = eval_operand(target, row)?;
            let dictionary = match read_member(target, container, *null_propagation)? {
                Operand::Value(v) => v,
                Operand::Row(r) => Cow::Owned(r.to_value()),
            };
            match dictionary.as_ref() {
                Value::Object(entries) => Ok(Operand::Value(Cow::Owned(
                    entries.get(key).cloned().unwrap_or_default(),
                ))),
                Value::Empty if *null_propagation => Ok(Operand::Value(Cow::Owned(Value::Empty))),
                Value::Empty => Err(ApplyError::Evaluation(format!(
                    "dynamic property container `{container}` is null while reading `{key}`"
                ))),
                other => Err(ApplyError::Evaluation(format!(
                    "dynamic property container `{container}` is a {} value",
                    other.to_variant_string()
                ))),
            }
        }
        Expr::Constant(value) => Ok(Operand::Value(Cow::Owned(value.clone()))),
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, row)?;
            let right = evaluate(right, row)?;
            Ok(owned(binary(*op, &left, &right)?))
        }
        Expr::Unary { op, operand } => {
            let operand = evaluate(operand, row)?;
            let value = match op {
                UnaryOperator::Not => match operand {
                    Value::Boolean(b) => Value::Boolean(!b),
                    Value::Empty => Value::Empty,
                    other => {
                        return Err(ApplyError::Evaluation(format!(
                            "cannot apply `not` to {}",
                            other.to_variant_string()
                        )));
                    }
                },
                UnaryOperator::Negate => operand.negate()?,
            };
            Ok(owned(value))
        }
        Expr::Call {
            function,
            arguments,
            null_propagation,
        } => {
            let arguments = evaluate_all(arguments, row)?;
            if arguments.iter().any(Value::is_empty) {
                if *null_propagation {
                    return Ok(owned(Value::Empty));
                }
                return Err(ApplyError::Evaluation(format!(
                    "null argument passed to `{function}`"
                )));
            }
            Ok(owned(function.invoke(&arguments)?))
        }
        Expr::Custom {
            function,
            arguments,
        } => {
            let arguments = evaluate_all(arguments, row)?;
            Ok(owned((function.implementation)(&arguments)?))
        }
        Expr::Convert { source, target } => Ok(owned(evaluate(source, row)?.convert(target)?)),
        Expr::Boxed(inner) => eval_operand(inner, row),
    }
}

fn owned<'r>(value: Value) -> Operand<'r> {
    Operand::Value(Cow::Owned(value))
}

fn evaluate_all(exprs: &[Expr], row: &Row) -> Result<Vec<Value>> {
    exprs.iter().map(|expr| evaluate(expr, row)).collect()
}

fn read_member<'r>(target: Operand<'r>, name: &str, null_propagation: bool) -> Result<Operand<'r>> {
    match target {
        Operand::Row(Row::Entity(record)) => Ok(Operand::Value(match record.get(name) {
            Some(value) => Cow::Borrowed(value),
            None => Cow::Owned(Value::Empty),
        })),
        Operand::Row(other) => Err(shape_mismatch("an entity row", &Operand::Row(other))),
        Operand::Value(value) => match value {
            Cow::Borrowed(Value::Object(obj)) => Ok(Operand::Value(match obj.get(name) {
                Some(value) => Cow::Borrowed(value),
                None => Cow::Owned(Value::Empty),
            })),
            Cow::Owned(Value::Object(mut obj)) => Ok(Operand::Value(Cow::Owned(
                obj.swap_remove(name).unwrap_or_default(),
            ))),
            value if value.is_empty() => {
                if null_propagation {
                    Ok(Operand::Value(Cow::Owned(Value::Empty)))
                } else {
                    Err(ApplyError::Evaluation(format!(
                        "null reference while reading member `{name}`"
                    )))
                }
            }
            other => Err(ApplyError::Evaluation(format!(
                "cannot read member `{name}` of a {} value",
                other.to_variant_string()
            ))),
        },
    }
}

fn container_of(row: &Row, slot: ContainerSlot) -> Option<&ExtraFieldContainer> {
    match (row, slot) {
        (Row::Wrapper { extras, .. }, ContainerSlot::Extras) => Some(extras),
        (Row::Grouped { keys, .. }, ContainerSlot::Keys) => Some(keys),
        (Row::Grouped { aggregates, .. }, ContainerSlot::Aggregates) => Some(aggregates),
        (Row::Flattened { flattened, .. }, ContainerSlot::Flattened) => Some(flattened),
        _ => None,
    }
}

fn shape_mismatch(expected: &str, found: &Operand<'_>) -> ApplyError {
    let found = match found {
        Operand::Row(Row::Entity(_)) => "an entity row",
        Operand::Row(Row::Wrapper { .. }) => "a wrapper row",
        Operand::Row(Row::Grouped { .. }) => "a grouped row",
        Operand::Row(Row::Flattened { .. }) => "a flattened row",
        Operand::Value(v) => v.to_variant_string(),
    };
    ApplyError::Evaluation(format!("expected {expected}, found {found}"))
}

/// Binary operator semantics shared by every in-process evaluation.
///
/// Comparisons involving null are false except `eq`/`ne` against null;
/// `and`/`or` use three-valued logic.
pub fn binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    let value = match op {
        BinaryOperator::And => match (left.as_bool(), right.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
            (Some(true), Some(true)) => Value::Boolean(true),
            _ if left.is_empty() || right.is_empty() => Value::Empty,
            _ => return Err(logical_operands(op, left, right)),
        },
        BinaryOperator::Or => match (left.as_bool(), right.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
            (Some(false), Some(false)) => Value::Boolean(false),
            _ if left.is_empty() || right.is_empty() => Value::Empty,
            _ => return Err(logical_operands(op, left, right)),
        },
        BinaryOperator::Eq => Value::Boolean(left == right),
        BinaryOperator::Ne => Value::Boolean(left != right),
        BinaryOperator::Gt | BinaryOperator::Ge | BinaryOperator::Lt | BinaryOperator::Le => {
            if left.is_empty() || right.is_empty() {
                return Ok(Value::Boolean(false));
            }
            let ordering = left.compare(right).ok_or_else(|| {
                ApplyError::Evaluation(format!(
                    "cannot compare {} with {}",
                    left.to_variant_string(),
                    right.to_variant_string()
                ))
            })?;
            Value::Boolean(match op {
                BinaryOperator::Gt => ordering == Ordering::Greater,
                BinaryOperator::Ge => ordering != Ordering::Less,
                BinaryOperator::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
        BinaryOperator::Add => left.checked_add(right)?,
        BinaryOperator::Sub => left.checked_sub(right)?,
        BinaryOperator::Mul => left.checked_mul(right)?,
        BinaryOperator::Div => left.checked_div(right)?,
        BinaryOperator::Mod => left.checked_rem(right)?,
    };
    Ok(value)
}

fn logical_operands(op: BinaryOperator, left: &Value, right: &Value) -> ApplyError {
    ApplyError::Evaluation(format!(
        "`{op}` expects Boolean operands, found {} and {}",
        left.to_variant_string(),
        right.to_variant_string()
    ))
}
