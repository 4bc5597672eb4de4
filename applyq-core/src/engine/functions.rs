use crate::{
    applyc::schema::FieldType,
    protocol::{
        error::{ApplyError, Result},
        value::Value,
    },
};
use chrono::{Datelike, Timelike};
use std::fmt::Display;

/// Scalar functions every backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Contains,
    StartsWith,
    EndsWith,
    Length,
    IndexOf,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Round,
    Floor,
    Ceiling,
}

impl BuiltinFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_ascii_lowercase().as_str() {
            "contains" => BuiltinFunction::Contains,
            "startswith" => BuiltinFunction::StartsWith,
            "endswith" => BuiltinFunction::EndsWith,
            "length" => BuiltinFunction::Length,
            "indexof" => BuiltinFunction::IndexOf,
            "substring" => BuiltinFunction::Substring,
            "tolower" => BuiltinFunction::ToLower,
            "toupper" => BuiltinFunction::ToUpper,
            "trim" => BuiltinFunction::Trim,
            "concat" => BuiltinFunction::Concat,
            "year" => BuiltinFunction::Year,
            "month" => BuiltinFunction::Month,
            "day" => BuiltinFunction::Day,
            "hour" => BuiltinFunction::Hour,
            "minute" => BuiltinFunction::Minute,
            "second" => BuiltinFunction::Second,
            "round" => BuiltinFunction::Round,
            "floor" => BuiltinFunction::Floor,
            "ceiling" => BuiltinFunction::Ceiling,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFunction::Contains => "contains",
            BuiltinFunction::StartsWith => "startswith",
            BuiltinFunction::EndsWith => "endswith",
            BuiltinFunction::Length => "length",
            BuiltinFunction::IndexOf => "indexof",
            BuiltinFunction::Substring => "substring",
            BuiltinFunction::ToLower => "tolower",
            BuiltinFunction::ToUpper => "toupper",
            BuiltinFunction::Trim => "trim",
            BuiltinFunction::Concat => "concat",
            BuiltinFunction::Year => "year",
            BuiltinFunction::Month => "month",
            BuiltinFunction::Day => "day",
            BuiltinFunction::Hour => "hour",
            BuiltinFunction::Minute => "minute",
            BuiltinFunction::Second => "second",
            BuiltinFunction::Round => "round",
            BuiltinFunction::Floor => "floor",
            BuiltinFunction::Ceiling => "ceiling",
        }
    }

    pub fn accepts_arity(&self, arity: usize) -> bool {
        match self {
            BuiltinFunction::Contains
            | BuiltinFunction::StartsWith
            | BuiltinFunction::EndsWith
            | BuiltinFunction::IndexOf
            | BuiltinFunction::Concat => arity == 2,
            BuiltinFunction::Substring => arity == 2 || arity == 3,
            _ => arity == 1,
        }
    }

    pub fn return_type(&self, arguments: &[FieldType]) -> FieldType {
        match self {
            BuiltinFunction::Contains | BuiltinFunction::StartsWith | BuiltinFunction::EndsWith => {
                FieldType::Boolean
            }
            BuiltinFunction::Length
            | BuiltinFunction::IndexOf
            | BuiltinFunction::Year
            | BuiltinFunction::Month
            | BuiltinFunction::Day
            | BuiltinFunction::Hour
            | BuiltinFunction::Minute
            | BuiltinFunction::Second => FieldType::I32,
            BuiltinFunction::Substring
            | BuiltinFunction::ToLower
            | BuiltinFunction::ToUpper
            | BuiltinFunction::Trim
            | BuiltinFunction::Concat => FieldType::String,
            BuiltinFunction::Round | BuiltinFunction::Floor | BuiltinFunction::Ceiling => {
                match arguments.first() {
                    Some(ty) if ty.is_numeric() => ty.clone(),
                    _ => FieldType::F64,
                }
            }
        }
    }

    /// Evaluates the function over non-null arguments.
    pub fn invoke(&self, arguments: &[Value]) -> Result<Value> {
        let value = match self {
            BuiltinFunction::Contains => {
                let (s, needle) = (self.string(arguments, 0)?, self.string(arguments, 1)?);
                Value::Boolean(s.contains(needle))
            }
            BuiltinFunction::StartsWith => {
                let (s, prefix) = (self.string(arguments, 0)?, self.string(arguments, 1)?);
                Value::Boolean(s.starts_with(prefix))
            }
            BuiltinFunction::EndsWith => {
                let (s, suffix) = (self.string(arguments, 0)?, self.string(arguments, 1)?);
                Value::Boolean(s.ends_with(suffix))
            }
            BuiltinFunction::Length => Value::I32(self.string(arguments, 0)?.chars().count() as i32),
            BuiltinFunction::IndexOf => {
                let (s, needle) = (self.string(arguments, 0)?, self.string(arguments, 1)?);
                let index = s
                    .find(needle)
                    .map(|byte| s[..byte].chars().count() as i32)
                    .unwrap_or(-1);
                Value::I32(index)
            }
            BuiltinFunction::Substring => {
                let s = self.string(arguments, 0)?;
                let start = self.integer(arguments, 1)?.max(0) as usize;
                let chars = s.chars().skip(start);
                let taken: String = match arguments.get(2) {
                    Some(_) => chars.take(self.integer(arguments, 2)?.max(0) as usize).collect(),
                    None => chars.collect(),
                };
                Value::String(taken)
            }
            BuiltinFunction::ToLower => Value::String(self.string(arguments, 0)?.to_lowercase()),
            BuiltinFunction::ToUpper => Value::String(self.string(arguments, 0)?.to_uppercase()),
            BuiltinFunction::Trim => Value::String(self.string(arguments, 0)?.trim().to_string()),
            BuiltinFunction::Concat => {
                let part = |index: usize| {
                    arguments
                        .get(index)
                        .map(|v| v.inner_str().into_owned())
                        .ok_or_else(|| self.bad_argument(index, None))
                };
                Value::String(format!("{}{}", part(0)?, part(1)?))
            }
            BuiltinFunction::Year => Value::I32(self.date(arguments)?.year()),
            BuiltinFunction::Month => Value::I32(self.date(arguments)?.month() as i32),
            BuiltinFunction::Day => Value::I32(self.date(arguments)?.day() as i32),
            BuiltinFunction::Hour => Value::I32(self.date(arguments)?.hour() as i32),
            BuiltinFunction::Minute => Value::I32(self.date(arguments)?.minute() as i32),
            BuiltinFunction::Second => Value::I32(self.date(arguments)?.second() as i32),
            BuiltinFunction::Round => self.rounding(arguments, f64::round_ties_even)?,
            BuiltinFunction::Floor => self.rounding(arguments, f64::floor)?,
            BuiltinFunction::Ceiling => self.rounding(arguments, f64::ceil)?,
        };
        Ok(value)
    }

    fn string<'v>(&self, arguments: &'v [Value], index: usize) -> Result<&'v str> {
        match arguments.get(index) {
            Some(Value::String(s)) => Ok(s),
            other => Err(self.bad_argument(index, other)),
        }
    }

    fn integer(&self, arguments: &[Value], index: usize) -> Result<i64> {
        arguments
            .get(index)
            .and_then(Value::to_i64)
            .ok_or_else(|| self.bad_argument(index, arguments.get(index)))
    }

    fn date(&self, arguments: &[Value]) -> Result<chrono::DateTime<chrono::Utc>> {
        match arguments.first() {
            Some(Value::Date(d)) => Ok(*d),
            other => Err(self.bad_argument(0, other)),
        }
    }

    fn rounding(&self, arguments: &[Value], op: fn(f64) -> f64) -> Result<Value> {
        match arguments.first() {
            Some(v @ (Value::I32(_) | Value::I64(_))) => Ok(v.clone()),
            Some(Value::F32(f)) => Ok(Value::F32(op(*f as f64) as f32)),
            Some(Value::F64(f)) => Ok(Value::F64(op(*f))),
            other => Err(self.bad_argument(0, other)),
        }
    }

    fn bad_argument(&self, index: usize, value: Option<&Value>) -> ApplyError {
        ApplyError::Evaluation(format!(
            "argument {index} of `{}` has unexpected type {}",
            self.name(),
            value.map(Value::to_variant_string).unwrap_or("missing")
        ))
    }
}

impl Display for BuiltinFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(BuiltinFunction::from_name("ToLower"), Some(BuiltinFunction::ToLower));
        assert_eq!(BuiltinFunction::from_name("median"), None);
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            BuiltinFunction::Contains.invoke(&[s("Milk"), s("il")]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            BuiltinFunction::IndexOf.invoke(&[s("héllo"), s("llo")]).unwrap(),
            Value::I32(2)
        );
        assert_eq!(
            BuiltinFunction::Substring
                .invoke(&[s("abcdef"), Value::I32(1), Value::I32(3)])
                .unwrap(),
            s("bcd")
        );
        assert_eq!(
            BuiltinFunction::Concat.invoke(&[s("a"), Value::I32(1)]).unwrap(),
            s("a1")
        );
        assert!(BuiltinFunction::ToUpper.invoke(&[Value::I32(1)]).is_err());
    }

    #[test]
    fn test_round_uses_bankers_rounding() {
        assert_eq!(
            BuiltinFunction::Round.invoke(&[Value::F64(2.5)]).unwrap(),
            Value::F64(2.0)
        );
        assert_eq!(
            BuiltinFunction::Ceiling.invoke(&[Value::F64(2.1)]).unwrap(),
            Value::F64(3.0)
        );
        assert_eq!(
            BuiltinFunction::Floor.invoke(&[Value::I32(7)]).unwrap(),
            Value::I32(7)
        );
    }

    #[test]
    fn test_date_parts() {
        let date = Value::from("2024-03-05").convert(&FieldType::Date).unwrap();
        assert_eq!(BuiltinFunction::Year.invoke(&[date.clone()]).unwrap(), Value::I32(2024));
        assert_eq!(BuiltinFunction::Month.invoke(&[date]).unwrap(), Value::I32(3));
    }

    #[test]
    fn test_arity_and_return_types() {
        assert!(BuiltinFunction::Substring.accepts_arity(3));
        assert!(!BuiltinFunction::Length.accepts_arity(2));
        assert_eq!(
            BuiltinFunction::Round.return_type(&[FieldType::F32]),
            FieldType::F32
        );
        assert_eq!(
            BuiltinFunction::Length.return_type(&[FieldType::String]),
            FieldType::I32
        );
    }
}
