use crate::{
    applyc::schema::FieldType,
    protocol::error::{ApplyError, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, SeqAccess, Visitor},
};
use std::{
    borrow::Cow,
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// A dynamic value flowing through a compiled pipeline.
///
/// Entity fields, computed extras, group keys and aggregate results are all `Value`s.
/// Numeric variants compare and hash across integer/float boundaries so that
/// grouping by `1` and `1.0` lands in the same partition.
#[derive(Clone, Debug, Default)]
pub enum Value {
    String(String),
    Boolean(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    #[default]
    Empty,
}

impl Value {
    pub fn inner_str(&self) -> Cow<'_, str> {
        match self {
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::I32(i) => Cow::Owned(i.to_string()),
            Value::I64(i) => Cow::Owned(i.to_string()),
            Value::F32(f) => Cow::Owned(f.to_string()),
            Value::F64(f) => Cow::Owned(f.to_string()),
            Value::Date(d) => Cow::Owned(d.to_rfc3339()),
            Value::Empty => Cow::Borrowed(""),
            Value::Array(_) | Value::Object(_) => Cow::Owned(self.to_string()),
        }
    }

    pub fn to_variant_string(&self) -> &'static str {
        match self {
            Value::String(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::I32(_) => "I32",
            Value::I64(_) => "I64",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Date(_) => "Date",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Empty => "Empty",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Empty => 0,
            Value::Boolean(_) => 1,
            Value::I32(_) | Value::I64(_) | Value::F32(_) | Value::F64(_) => 2,
            Value::String(_) => 3,
            Value::Date(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::I32(_) | Value::I64(_) | Value::F32(_) | Value::F64(_)
        )
    }

    #[inline]
    fn is_integer(&self) -> bool {
        matches!(self, Value::I32(_) | Value::I64(_))
    }

    #[inline]
    fn is_float(&self) -> bool {
        matches!(self, Value::F32(_) | Value::F64(_))
    }

    /// Convert any numeric Value to f64 for type promotion
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::I32(v) => Some(*v as f64),
            Value::I64(v) => Some(*v as f64),
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert any integer Value to i64
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The declared type a value of this variant carries. Containers and nulls are
    /// reported as `Dynamic` since their element type is not known from the value alone.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::String(_) => FieldType::String,
            Value::Boolean(_) => FieldType::Boolean,
            Value::I32(_) => FieldType::I32,
            Value::I64(_) => FieldType::I64,
            Value::F32(_) => FieldType::F32,
            Value::F64(_) => FieldType::F64,
            Value::Date(_) => FieldType::Date,
            Value::Array(_) | Value::Object(_) | Value::Empty => FieldType::Dynamic,
        }
    }

    /// Partial ordering used by comparison operators. `None` means the two
    /// variants are not comparable and the caller should surface an error.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(s), Value::String(o)) => Some(s.cmp(o)),
            (Value::Boolean(s), Value::Boolean(o)) => Some(s.cmp(o)),
            (Value::Date(s), Value::Date(o)) => Some(s.cmp(o)),
            (s, o) if s.is_integer() && o.is_integer() => {
                Some(s.to_i64()?.cmp(&o.to_i64()?))
            }
            (s, o) if s.is_numeric() && o.is_numeric() => {
                s.to_f64()?.partial_cmp(&o.to_f64()?)
            }
            _ => None,
        }
    }

    /// Casts the value to `target`, as a `cast`/convert node does.
    /// Nulls stay null; impossible conversions are evaluation errors.
    pub fn convert(&self, target: &FieldType) -> Result<Value> {
        let fail = || {
            ApplyError::Evaluation(format!(
                "cannot convert {} value `{}` to {target}",
                self.to_variant_string(),
                self.inner_str()
            ))
        };

        let converted = match (self, target) {
            (Value::Empty, _) | (_, FieldType::Dynamic) => self.clone(),
            (Value::String(s), FieldType::String) => Value::String(s.clone()),
            (v, FieldType::String) => Value::String(v.inner_str().into_owned()),

            (Value::Boolean(b), FieldType::Boolean) => Value::Boolean(*b),
            (Value::String(s), FieldType::Boolean) => match s.to_ascii_lowercase().as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => return Err(fail()),
            },

            (Value::String(s), FieldType::I32) => {
                Value::I32(s.trim().parse().map_err(|_| fail())?)
            }
            (Value::String(s), FieldType::I64) => {
                Value::I64(s.trim().parse().map_err(|_| fail())?)
            }
            (Value::String(s), FieldType::F32) => {
                Value::F32(s.trim().parse().map_err(|_| fail())?)
            }
            (Value::String(s), FieldType::F64) => {
                Value::F64(s.trim().parse().map_err(|_| fail())?)
            }
            (v, FieldType::I32) if v.is_integer() => {
                Value::I32(i32::try_from(v.to_i64().ok_or_else(fail)?).map_err(|_| fail())?)
            }
            (v, FieldType::I64) if v.is_integer() => Value::I64(v.to_i64().ok_or_else(fail)?),
            (v, FieldType::I32) if v.is_float() => Value::I32(v.to_f64().ok_or_else(fail)? as i32),
            (v, FieldType::I64) if v.is_float() => Value::I64(v.to_f64().ok_or_else(fail)? as i64),
            (v, FieldType::F32) if v.is_numeric() => Value::F32(v.to_f64().ok_or_else(fail)? as f32),
            (v, FieldType::F64) if v.is_numeric() => Value::F64(v.to_f64().ok_or_else(fail)?),

            (Value::Date(d), FieldType::Date) => Value::Date(*d),
            (Value::String(s), FieldType::Date) => Value::Date(parse_date(s).ok_or_else(fail)?),

            (Value::Array(items), FieldType::Array(inner)) => Value::Array(
                items
                    .iter()
                    .map(|item| item.convert(inner))
                    .collect::<Result<Vec<_>>>()?,
            ),
            (Value::Object(obj), FieldType::Structured(_)) => Value::Object(obj.clone()),
            (Value::Array(items), FieldType::Collection(_)) => Value::Array(items.clone()),
            _ => return Err(fail()),
        };
        Ok(converted)
    }

    /// Integer arithmetic stays integral (I32 op I32 -> I32, otherwise I64),
    /// any float operand promotes to F64 (F32 op F32 stays F32), and any
    /// operand that is `Empty` yields `Empty`.
    fn arithmetic(
        &self,
        other: &Value,
        op: &'static str,
        int_op: fn(i64, i64) -> Result<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        match (self, other) {
            (Value::Empty, _) | (_, Value::Empty) => Ok(Value::Empty),
            (Value::I32(a), Value::I32(b)) => {
                let v = int_op(*a as i64, *b as i64)?;
                i32::try_from(v).map(Value::I32).map_err(|_| overflow(op))
            }
            (a, b) if a.is_integer() && b.is_integer() => {
                let (a, b) = (a.to_i64().unwrap_or_default(), b.to_i64().unwrap_or_default());
                int_op(a, b).map(Value::I64)
            }
            (Value::F32(a), Value::F32(b)) => {
                Ok(Value::F32(float_op(*a as f64, *b as f64) as f32))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => Ok(Value::F64(float_op(
                a.to_f64().unwrap_or_default(),
                b.to_f64().unwrap_or_default(),
            ))),
            (a, b) => Err(ApplyError::Evaluation(format!(
                "cannot apply `{op}` to {} and {}",
                a.to_variant_string(),
                b.to_variant_string()
            ))),
        }
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value> {
        self.arithmetic(
            other,
            "add",
            |a, b| a.checked_add(b).ok_or_else(|| overflow("add")),
            |a, b| a + b,
        )
    }

    pub fn checked_sub(&self, other: &Value) -> Result<Value> {
        self.arithmetic(
            other,
            "sub",
            |a, b| a.checked_sub(b).ok_or_else(|| overflow("sub")),
            |a, b| a - b,
        )
    }

    pub fn checked_mul(&self, other: &Value) -> Result<Value> {
        self.arithmetic(
            other,
            "mul",
            |a, b| a.checked_mul(b).ok_or_else(|| overflow("mul")),
            |a, b| a * b,
        )
    }

    /// Integer division truncates toward zero; integer division by zero is an error,
    /// float division by zero follows IEEE semantics.
    pub fn checked_div(&self, other: &Value) -> Result<Value> {
        self.arithmetic(
            other,
            "div",
            |a, b| match b {
                0 => Err(division_by_zero("div")),
                _ => a.checked_div(b).ok_or_else(|| overflow("div")),
            },
            |a, b| a / b,
        )
    }

    pub fn checked_rem(&self, other: &Value) -> Result<Value> {
        self.arithmetic(
            other,
            "mod",
            |a, b| match b {
                0 => Err(division_by_zero("mod")),
                _ => a.checked_rem(b).ok_or_else(|| overflow("mod")),
            },
            |a, b| a % b,
        )
    }

    pub fn negate(&self) -> Result<Value> {
        match self {
            Value::Empty => Ok(Value::Empty),
            Value::I32(v) => v.checked_neg().map(Value::I32).ok_or_else(|| overflow("negate")),
            Value::I64(v) => v.checked_neg().map(Value::I64).ok_or_else(|| overflow("negate")),
            Value::F32(v) => Ok(Value::F32(-v)),
            Value::F64(v) => Ok(Value::F64(-v)),
            other => Err(ApplyError::Evaluation(format!(
                "cannot negate {} value",
                other.to_variant_string()
            ))),
        }
    }
}

fn division_by_zero(op: &str) -> ApplyError {
    ApplyError::Evaluation(format!("integer `{op}` by zero"))
}

fn overflow(op: &str) -> ApplyError {
    ApplyError::Evaluation(format!("integer overflow in `{op}`"))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "'{s}'"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::I32(i) => write!(f, "{i}"),
            Value::I64(i) => write!(f, "{i}L"),
            Value::F32(v) => write!(f, "{v}f"),
            Value::F64(v) => write!(f, "{v}d"),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(obj) => {
                write!(f, "{{")?;
                for (i, (k, v)) in obj.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Empty => write!(f, "null"),
        }
    }
}

/// Total order used for sorting and `min`/`max`. Variants of different kinds
/// order by kind: null, booleans, numbers, strings, dates, arrays, objects.
/// NaN sorts above every other number.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Boolean(s), Value::Boolean(o)) => s.cmp(o),
            (s, o) if s.is_numeric() && o.is_numeric() => numeric_cmp(s, o),
            (Value::String(s), Value::String(o)) => s.cmp(o),
            (Value::Date(s), Value::Date(o)) => s.cmp(o),
            (Value::Array(s), Value::Array(o)) => s.cmp(o),
            (Value::Object(s), Value::Object(o)) => s
                .iter()
                .sorted_by(|a, b| a.0.cmp(b.0))
                .cmp(o.iter().sorted_by(|a, b| a.0.cmp(b.0))),
            (s, o) => s.rank().cmp(&o.rank()),
        }
    }
}

fn numeric_cmp(left: &Value, right: &Value) -> Ordering {
    if let (Some(l), Some(r)) = (left.to_i64(), right.to_i64()) {
        return l.cmp(&r);
    }
    let (l, r) = (left.to_f64().unwrap_or_default(), right.to_f64().unwrap_or_default());
    match (l.is_nan(), r.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Value {}

impl PartialEq<Value> for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(s), Value::String(o)) => s == o,
            (Value::Date(s), Value::Date(o)) => s == o,
            (Value::Boolean(s), Value::Boolean(o)) => s == o,
            (Value::Array(s), Value::Array(o)) => s == o,
            (Value::Object(s), Value::Object(o)) => s == o,
            (Value::Empty, Value::Empty) => true,
            (s, o) if s.is_numeric() && o.is_numeric() => numeric_cmp(s, o) == Ordering::Equal,
            _ => false,
        }
    }
}

/// Numerics hash through their f64 image (with `-0.0` folded onto `0.0`) so the
/// hash agrees with the cross-variant equality above.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Value::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            v @ (Value::I32(_) | Value::I64(_) | Value::F32(_) | Value::F64(_)) => {
                2u8.hash(state);
                let f = v.to_f64().unwrap_or_default();
                let normalized = if f == 0.0 {
                    0.0f64
                } else if f.is_nan() {
                    f64::NAN
                } else {
                    f
                };
                normalized.to_bits().hash(state);
            }
            Value::Date(d) => {
                3u8.hash(state);
                d.hash(state);
            }
            Value::Array(items) => {
                4u8.hash(state);
                items.hash(state);
            }
            // map equality ignores entry order
            Value::Object(obj) => {
                5u8.hash(state);
                obj.len().hash(state);
            }
            Value::Empty => 6u8.hash(state),
        }
    }
}

/// Custom serialisation implementation for Value that removes enum variant names
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::String(s) => s.serialize(serializer),
            Value::Boolean(b) => b.serialize(serializer),
            Value::I32(i) => i.serialize(serializer),
            Value::I64(i) => i.serialize(serializer),
            Value::F32(f) => f.serialize(serializer),
            Value::F64(f) => f.serialize(serializer),
            Value::Date(d) => serializer.collect_str(&d.to_rfc3339()),
            Value::Array(arr) => {
                use serde::ser::SerializeSeq;
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for value in arr {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Value::Object(obj) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(obj.len()))?;
                for (k, v) in obj {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Empty => serializer.serialize_none(),
        }
    }
}

/// Custom deserialisation implementation for Value that parses raw values directly.
/// Integers land in `I64`, fractional numbers in `F64`; strings are never
/// reinterpreted as dates here, a convert node does that.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string, number, boolean, array, object or null")
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::String(value.to_owned()))
            }

            fn visit_string<E>(self, value: String) -> std::result::Result<Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::String(value))
            }

            fn visit_bool<E>(self, value: bool) -> std::result::Result<Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Boolean(value))
            }

            fn visit_i64<E>(self, value: i64) -> std::result::Result<Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::I64(value))
            }

            fn visit_u64<E>(self, value: u64) -> std::result::Result<Value, E>
            where
                E: serde::de::Error,
            {
                Ok(i64::try_from(value)
                    .map(Value::I64)
                    .unwrap_or(Value::F64(value as f64)))
            }

            fn visit_f64<E>(self, value: f64) -> std::result::Result<Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::F64(value))
            }

            fn visit_none<E>(self) -> std::result::Result<Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Empty)
            }

            fn visit_unit<E>(self) -> std::result::Result<Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Empty)
            }

            fn visit_some<D>(self, deserializer: D) -> std::result::Result<Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Value::deserialize(deserializer)
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(value) = seq.next_element()? {
                    values.push(value);
                }
                Ok(Value::Array(values))
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut object = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    object.insert(key, value);
                }
                Ok(Value::Object(object))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(i: i32) -> Self {
        Value::I32(i)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(i: i64) -> Self {
        Value::I64(i)
    }
}

impl From<usize> for Value {
    #[inline]
    fn from(v: usize) -> Self {
        Value::I64(v as i64)
    }
}

impl From<f32> for Value {
    #[inline]
    fn from(f: f32) -> Self {
        Value::F32(f)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(f: f64) -> Self {
        Value::F64(f)
    }
}

impl From<DateTime<Utc>> for Value {
    #[inline]
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    #[inline]
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    #[inline]
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    #[inline]
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    // ============================================================================
    // Equality and Hashing Tests
    // ============================================================================

    #[test]
    fn test_cross_type_numeric_equality() {
        assert_eq!(Value::I32(1), Value::I64(1));
        assert_eq!(Value::I64(1), Value::F64(1.0));
        assert_eq!(Value::F32(2.5), Value::F64(2.5));
        assert_ne!(Value::I32(1), Value::String("1".to_string()));
    }

    #[test]
    fn test_numeric_hash_agrees_with_equality() {
        assert_eq!(hash_of(&Value::I32(1)), hash_of(&Value::F64(1.0)));
        assert_eq!(hash_of(&Value::I64(-7)), hash_of(&Value::F32(-7.0)));
        assert_eq!(hash_of(&Value::F64(0.0)), hash_of(&Value::F64(-0.0)));
    }

    #[test]
    fn test_empty_equality() {
        assert_eq!(Value::Empty, Value::Empty);
        assert_ne!(Value::Empty, Value::I32(0));
    }

    // ============================================================================
    // Arithmetic Tests
    // ============================================================================

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        assert!(matches!(
            Value::I32(2).checked_add(&Value::I32(3)).unwrap(),
            Value::I32(5)
        ));
        assert!(matches!(
            Value::I32(2).checked_mul(&Value::I64(3)).unwrap(),
            Value::I64(6)
        ));
        assert!(matches!(
            Value::I64(7).checked_div(&Value::I64(2)).unwrap(),
            Value::I64(3)
        ));
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_f64() {
        let result = Value::I32(1).checked_add(&Value::F64(0.5)).unwrap();
        assert!(matches!(result, Value::F64(v) if (v - 1.5).abs() < f64::EPSILON));
        let result = Value::F32(1.0).checked_sub(&Value::F64(0.5)).unwrap();
        assert!(matches!(result, Value::F64(_)));
    }

    #[test]
    fn test_arithmetic_with_empty_is_empty() {
        assert!(Value::Empty.checked_add(&Value::I32(1)).unwrap().is_empty());
        assert!(Value::F64(1.0).checked_mul(&Value::Empty).unwrap().is_empty());
    }

    #[test]
    fn test_integer_division_by_zero_is_error() {
        let err = Value::I32(1).checked_div(&Value::I32(0)).unwrap_err();
        assert_eq!(err.code(), "EVALUATION_ERROR");
        assert!(Value::I64(4).checked_rem(&Value::I64(0)).is_err());
    }

    #[test]
    fn test_integer_overflow_is_error() {
        let err = Value::I64(i64::MAX).checked_add(&Value::I64(1)).unwrap_err();
        assert_eq!(err.code(), "EVALUATION_ERROR");
        assert!(Value::I32(i32::MAX).checked_add(&Value::I32(1)).is_err());
        assert!(Value::I64(i64::MIN).checked_sub(&Value::I32(1)).is_err());
        assert!(Value::I64(i64::MAX).checked_mul(&Value::I64(2)).is_err());
        assert!(Value::I64(i64::MIN).checked_div(&Value::I64(-1)).is_err());
        assert!(Value::I32(i32::MIN).negate().is_err());
        assert!(matches!(
            Value::I32(i32::MAX).checked_add(&Value::I64(1)).unwrap(),
            Value::I64(v) if v == i32::MAX as i64 + 1
        ));
    }

    #[test]
    fn test_float_division_by_zero_is_infinite() {
        let result = Value::F64(1.0).checked_div(&Value::F64(0.0)).unwrap();
        assert!(matches!(result, Value::F64(v) if v.is_infinite()));
    }

    #[test]
    fn test_string_arithmetic_is_error() {
        assert!(Value::from("a").checked_add(&Value::from("b")).is_err());
    }

    // ============================================================================
    // Comparison and Conversion Tests
    // ============================================================================

    #[test]
    fn test_compare_incomparable_variants() {
        assert_eq!(Value::I32(1).compare(&Value::F64(2.0)), Some(Ordering::Less));
        assert_eq!(Value::from("a").compare(&Value::I32(1)), None);
    }

    #[test]
    fn test_ordering_ranks_mixed_variants() {
        let mut values = vec![
            Value::from("s2"),
            Value::I32(3),
            Value::Boolean(true),
            Value::Empty,
            Value::from("s1"),
            Value::F64(1.5),
            Value::Boolean(false),
            Value::I64(-4),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Empty,
                Value::Boolean(false),
                Value::Boolean(true),
                Value::I64(-4),
                Value::F64(1.5),
                Value::I32(3),
                Value::from("s1"),
                Value::from("s2"),
            ]
        );
        assert_ne!(Value::from("s1").cmp(&Value::I32(3)), Ordering::Equal);
        assert_ne!(Value::I32(3).cmp(&Value::Boolean(true)), Ordering::Equal);
    }

    #[test]
    fn test_ordering_places_nan_above_numbers() {
        let mut values = vec![Value::F64(f64::NAN), Value::I32(2), Value::F64(-1.0)];
        values.sort();
        assert_eq!(values[0], Value::F64(-1.0));
        assert_eq!(values[1], Value::I32(2));
        assert!(matches!(values[2], Value::F64(v) if v.is_nan()));
        assert_eq!(Value::F64(0.0).cmp(&Value::F64(-0.0)), Ordering::Equal);
    }

    #[test]
    fn test_ordering_of_objects_ignores_key_order() {
        let mut a = IndexMap::new();
        a.insert("x".to_string(), Value::I32(1));
        a.insert("y".to_string(), Value::I32(2));
        let mut b = IndexMap::new();
        b.insert("y".to_string(), Value::I32(2));
        b.insert("x".to_string(), Value::I32(1));
        assert_eq!(Value::Object(a.clone()), Value::Object(b.clone()));
        assert_eq!(Value::Object(a).cmp(&Value::Object(b)), Ordering::Equal);
    }

    #[test]
    fn test_convert_string_to_numbers_and_dates() {
        assert_eq!(Value::from("42").convert(&FieldType::I32).unwrap(), Value::I32(42));
        assert!(matches!(
            Value::from("2024-03-01").convert(&FieldType::Date).unwrap(),
            Value::Date(_)
        ));
        assert!(Value::from("nope").convert(&FieldType::I64).is_err());
        assert!(Value::Empty.convert(&FieldType::I64).unwrap().is_empty());
    }

    // ============================================================================
    // Serialization Tests
    // ============================================================================

    #[test]
    fn test_deserialize_json_shapes() {
        let value: Value =
            sonic_rs::from_str(r#"{"Name":"A","Price":10,"Rate":1.5,"Tags":[true,null]}"#)
                .unwrap();
        let obj = value.as_object().unwrap();
        assert!(matches!(obj["Name"], Value::String(_)));
        assert!(matches!(obj["Price"], Value::I64(10)));
        assert!(matches!(obj["Rate"], Value::F64(_)));
        assert_eq!(
            obj["Tags"],
            Value::Array(vec![Value::Boolean(true), Value::Empty])
        );
    }

    #[test]
    fn test_serialize_preserves_key_order() {
        let mut obj = IndexMap::new();
        obj.insert("b".to_string(), Value::I32(1));
        obj.insert("a".to_string(), Value::Empty);
        let json = sonic_rs::to_string(&Value::Object(obj)).unwrap();
        assert_eq!(json, r#"{"b":1,"a":null}"#);
    }
}
