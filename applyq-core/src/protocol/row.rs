use crate::{applyc::schema::FieldType, protocol::value::Value};
use indexmap::IndexMap;

/// The stored fields of one entity, in declaration order.
pub type Record = IndexMap<String, Value>;

/// One named value held by an [`ExtraFieldContainer`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraField {
    pub name: String,
    pub value: Value,
    pub declared: FieldType,
    next: Option<Box<ExtraField>>,
}

/// Append-only, heterogeneous named-value list.
///
/// Built bottom-up: the most recently declared field is the head of the list.
/// Lookups walk from the head, so a later declaration shadows an earlier one
/// with the same name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraFieldContainer {
    head: Option<Box<ExtraField>>,
    len: usize,
}

impl ExtraFieldContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a container from fields given in declaration order.
    pub fn from_declared<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Value, FieldType)>,
        S: Into<String>,
    {
        let mut container = Self::new();
        for (name, value, declared) in fields {
            container.push(name, value, declared);
        }
        container
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value, declared: FieldType) {
        let next = self.head.take();
        self.head = Some(Box::new(ExtraField {
            name: name.into(),
            value,
            declared,
            next,
        }));
        self.len += 1;
    }

    pub fn get(&self, name: &str) -> Option<&ExtraField> {
        self.iter().find(|field| field.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|field| &field.value)
    }

    /// Iterates newest first.
    pub fn iter(&self) -> ExtraFieldIter<'_> {
        ExtraFieldIter {
            current: self.head.as_deref(),
        }
    }

    pub fn in_declaration_order(&self) -> Vec<&ExtraField> {
        let mut fields: Vec<_> = self.iter().collect();
        fields.reverse();
        fields
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct ExtraFieldIter<'a> {
    current: Option<&'a ExtraField>,
}

impl<'a> Iterator for ExtraFieldIter<'a> {
    type Item = &'a ExtraField;

    fn next(&mut self) -> Option<Self::Item> {
        let field = self.current?;
        self.current = field.next.as_deref();
        Some(field)
    }
}

impl Drop for ExtraFieldContainer {
    // unlink iteratively so long chains don't recurse on drop
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(mut field) = next {
            next = field.next.take();
        }
    }
}

/// A row as it flows between pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// An untouched entity of the source collection.
    Entity(Record),
    /// Output of a compute stage (with `instance`) or of a nested select (without).
    Wrapper {
        instance: Option<Box<Row>>,
        extras: ExtraFieldContainer,
    },
    /// Output of an aggregate/groupby stage. The prior shape is gone.
    Grouped {
        keys: ExtraFieldContainer,
        aggregates: ExtraFieldContainer,
    },
    /// A row carrying pre-read cross-boundary paths next to its source.
    Flattened {
        source: Box<Row>,
        flattened: ExtraFieldContainer,
    },
}

impl Row {
    pub fn entity(record: Record) -> Self {
        Row::Entity(record)
    }

    /// Renders the row as an object. Group keys named by a `/` path are nested,
    /// so `Category/Name` becomes `{"Category": {"Name": ..}}`.
    pub fn to_value(&self) -> Value {
        let mut out = Record::new();
        self.write_fields(&mut out);
        Value::Object(out)
    }

    /// Strips flattening wrappers, returning the row a consumer should see.
    pub fn unflattened(self) -> Row {
        match self {
            Row::Flattened { source, .. } => source.unflattened(),
            Row::Wrapper { instance, extras } => Row::Wrapper {
                instance: instance.map(|i| Box::new(i.unflattened())),
                extras,
            },
            other => other,
        }
    }

    fn write_fields(&self, out: &mut Record) {
        match self {
            Row::Entity(record) => {
                for (k, v) in record {
                    out.insert(k.clone(), v.clone());
                }
            }
            Row::Wrapper { instance, extras } => {
                if let Some(instance) = instance {
                    instance.write_fields(out);
                }
                for field in extras.in_declaration_order() {
                    out.insert(field.name.clone(), field.value.clone());
                }
            }
            Row::Grouped { keys, aggregates } => {
                for field in keys.in_declaration_order() {
                    insert_path(out, &field.name, field.value.clone());
                }
                for field in aggregates.in_declaration_order() {
                    out.insert(field.name.clone(), field.value.clone());
                }
            }
            Row::Flattened { source, .. } => source.write_fields(out),
        }
    }
}

fn insert_path(out: &mut Record, path: &str, value: Value) {
    match path.split_once('/') {
        None => {
            out.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = out
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Record::new()));
            if !matches!(entry, Value::Object(_)) {
                *entry = Value::Object(Record::new());
            }
            if let Value::Object(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

impl From<Record> for Row {
    fn from(record: Record) -> Self {
        Row::Entity(record)
    }
}
