use crate::{
    applyc::schema::FieldType,
    engine::plan::Reduction,
    protocol::{
        error::{ApplyError, Result},
        value::Value,
    },
};
use indexmap::IndexSet;

/// Reduces one partition's input values.
///
/// Nulls are skipped by every built-in method except `countdistinct`, which
/// counts null as one distinct value. `declared` is the compiled input type and
/// decides the zero of an empty `sum`.
pub fn reduce(reduction: &Reduction, values: Vec<Value>, declared: &FieldType) -> Result<Value> {
    match reduction {
        Reduction::CountDistinct => {
            let distinct: IndexSet<Value> = values.into_iter().collect();
            Ok(Value::I64(distinct.len() as i64))
        }
        Reduction::Custom(reducer) => (reducer.implementation)(&values),
        Reduction::Sum => sum(non_null(values), declared),
        Reduction::Average => average(non_null(values)),
        Reduction::Min => Ok(non_null(values).min().unwrap_or_default()),
        Reduction::Max => Ok(non_null(values).max().unwrap_or_default()),
    }
}

/// Result type of a built-in reduction over `input`.
pub fn reduction_type(reduction: &Reduction, input: &FieldType) -> FieldType {
    match reduction {
        Reduction::Sum if input.is_float() => FieldType::F64,
        Reduction::Sum if *input == FieldType::Dynamic => FieldType::Dynamic,
        Reduction::Sum => FieldType::I64,
        Reduction::Average => FieldType::F64,
        Reduction::Min | Reduction::Max => input.clone(),
        Reduction::CountDistinct => FieldType::I64,
        Reduction::Custom(reducer) => reducer.result_type.clone(),
    }
}

fn non_null(values: Vec<Value>) -> impl Iterator<Item = Value> {
    values.into_iter().filter(|v| !v.is_empty())
}

fn sum(values: impl Iterator<Item = Value>, declared: &FieldType) -> Result<Value> {
    let zero = if declared.is_float() {
        Value::F64(0.0)
    } else {
        Value::I64(0)
    };
    values.into_iter().try_fold(zero, |acc, value| {
        if !value.is_numeric() {
            return Err(not_numeric("sum", &value));
        }
        let acc = match (&acc, &value) {
            (Value::I64(_), v) if matches!(v, Value::F32(_) | Value::F64(_)) => {
                Value::F64(acc.to_f64().unwrap_or_default())
            }
            _ => acc,
        };
        let widened = match value {
            Value::I32(v) => Value::I64(v as i64),
            Value::F32(v) => Value::F64(v as f64),
            other => other,
        };
        acc.checked_add(&widened)
    })
}

fn average(values: impl Iterator<Item = Value>) -> Result<Value> {
    let mut total = 0.0;
    let mut count = 0usize;
    for value in values {
        total += value.to_f64().ok_or_else(|| not_numeric("average", &value))?;
        count += 1;
    }
    if count == 0 {
        return Ok(Value::Empty);
    }
    Ok(Value::F64(total / count as f64))
}

fn not_numeric(method: &str, value: &Value) -> ApplyError {
    ApplyError::Evaluation(format!(
        "`{method}` over a {} value",
        value.to_variant_string()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_of_integers_is_i64() {
        let result = reduce(
            &Reduction::Sum,
            vec![Value::I32(25), Value::I32(75), Value::Empty],
            &FieldType::I32,
        )
        .unwrap();
        assert!(matches!(result, Value::I64(100)));
    }

    #[test]
    fn test_sum_of_floats_is_f64() {
        let result = reduce(
            &Reduction::Sum,
            vec![Value::F32(1.5), Value::F64(2.0)],
            &FieldType::F64,
        )
        .unwrap();
        assert!(matches!(result, Value::F64(v) if (v - 3.5).abs() < 1e-9));
    }

    #[test]
    fn test_sum_of_nothing_is_zero() {
        assert!(matches!(
            reduce(&Reduction::Sum, vec![], &FieldType::I32).unwrap(),
            Value::I64(0)
        ));
        assert!(matches!(
            reduce(&Reduction::Sum, vec![Value::Empty], &FieldType::F64).unwrap(),
            Value::F64(_)
        ));
    }

    #[test]
    fn test_sum_overflow_is_error() {
        let err = reduce(
            &Reduction::Sum,
            vec![Value::I64(i64::MAX), Value::I64(1)],
            &FieldType::Dynamic,
        )
        .unwrap_err();
        assert_eq!(err.code(), "EVALUATION_ERROR");
    }

    #[test]
    fn test_sum_of_dynamic_input_follows_values() {
        assert_eq!(
            reduction_type(&Reduction::Sum, &FieldType::Dynamic),
            FieldType::Dynamic
        );
        let result = reduce(
            &Reduction::Sum,
            vec![Value::F64(1.5), Value::F64(2.25)],
            &FieldType::Dynamic,
        )
        .unwrap();
        assert!(matches!(result, Value::F64(v) if (v - 3.75).abs() < 1e-9));
    }

    #[test]
    fn test_min_max_over_mixed_kinds() {
        let values = vec![Value::from("b"), Value::I32(7), Value::Boolean(true)];
        assert_eq!(
            reduce(&Reduction::Min, values.clone(), &FieldType::Dynamic).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            reduce(&Reduction::Max, values, &FieldType::Dynamic).unwrap(),
            Value::from("b")
        );
    }

    #[test]
    fn test_average_and_empty_average() {
        let result = reduce(
            &Reduction::Average,
            vec![Value::I32(1), Value::I32(2), Value::Empty],
            &FieldType::I32,
        )
        .unwrap();
        assert_eq!(result, Value::F64(1.5));
        assert!(reduce(&Reduction::Average, vec![], &FieldType::I32)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_min_max_keep_input_type() {
        let values = vec![Value::I32(3), Value::Empty, Value::I32(1)];
        assert!(matches!(
            reduce(&Reduction::Min, values.clone(), &FieldType::I32).unwrap(),
            Value::I32(1)
        ));
        assert!(matches!(
            reduce(&Reduction::Max, values, &FieldType::I32).unwrap(),
            Value::I32(3)
        ));
        assert!(reduce(&Reduction::Max, vec![Value::Empty], &FieldType::I32)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_count_distinct_counts_null_once() {
        let values = vec![
            Value::I32(1),
            Value::I64(1),
            Value::Empty,
            Value::Empty,
            Value::from("a"),
        ];
        assert_eq!(
            reduce(&Reduction::CountDistinct, values, &FieldType::Dynamic).unwrap(),
            Value::I64(3)
        );
    }

    #[test]
    fn test_reduction_types() {
        assert_eq!(reduction_type(&Reduction::Sum, &FieldType::I32), FieldType::I64);
        assert_eq!(reduction_type(&Reduction::Sum, &FieldType::F32), FieldType::F64);
        assert_eq!(reduction_type(&Reduction::Average, &FieldType::I32), FieldType::F64);
        assert_eq!(reduction_type(&Reduction::Min, &FieldType::String), FieldType::String);
        assert_eq!(
            reduction_type(&Reduction::CountDistinct, &FieldType::String),
            FieldType::I64
        );
    }
}
