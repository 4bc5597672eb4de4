//! The entity-relationship schema consulted while binding.
//!
//! A [`Model`] is built once by the caller and only read afterwards; the compiler
//! asks it for the declared type of a property and whether a structured type is open.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Declared type of a field, a computed value or an aggregate result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Boolean,
    I32,
    I64,
    F32,
    F64,
    Date,
    Array(Box<FieldType>),
    /// A single entity or complex value of the named structured type.
    Structured(String),
    /// A related collection of the named entity type.
    Collection(String),
    /// Type only known at run time (open properties, nulls).
    Dynamic,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::I32 | FieldType::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, FieldType::F32 | FieldType::F64)
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            FieldType::Array(_) | FieldType::Structured(_) | FieldType::Collection(_)
        )
    }

    /// Result type of an arithmetic operator over `self` and `other`, following the
    /// same promotion rules as the value arithmetic.
    pub fn promote(&self, other: &FieldType) -> FieldType {
        match (self, other) {
            (FieldType::I32, FieldType::I32) => FieldType::I32,
            (a, b) if a.is_integer() && b.is_integer() => FieldType::I64,
            (FieldType::F32, FieldType::F32) => FieldType::F32,
            (a, b) if a.is_numeric() && b.is_numeric() => FieldType::F64,
            _ => FieldType::Dynamic,
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Boolean => write!(f, "Boolean"),
            FieldType::I32 => write!(f, "I32"),
            FieldType::I64 => write!(f, "I64"),
            FieldType::F32 => write!(f, "F32"),
            FieldType::F64 => write!(f, "F64"),
            FieldType::Date => write!(f, "Date"),
            FieldType::Array(t) => write!(f, "Array({t})"),
            FieldType::Structured(name) => write!(f, "{name}"),
            FieldType::Collection(name) => write!(f, "Collection({name})"),
            FieldType::Dynamic => write!(f, "Dynamic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Entity,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Structural(FieldType),
    Complex(String),
    Navigation { target: String, collection: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl PropertyDef {
    pub fn field_type(&self) -> FieldType {
        match &self.kind {
            PropertyKind::Structural(ty) => ty.clone(),
            PropertyKind::Complex(name) => FieldType::Structured(name.clone()),
            PropertyKind::Navigation {
                target,
                collection: false,
            } => FieldType::Structured(target.clone()),
            PropertyKind::Navigation {
                target,
                collection: true,
            } => FieldType::Collection(target.clone()),
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self.kind, PropertyKind::Navigation { .. })
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Navigation {
                collection: true,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredType {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Name of the property holding the dynamic-property dictionary when the type is open.
    #[serde(default)]
    pub open_container: Option<String>,
}

impl StructuredType {
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Entity,
            properties: Vec::new(),
            open_container: None,
        }
    }

    pub fn complex(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Complex,
            ..Self::entity(name)
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            kind: PropertyKind::Structural(ty),
            nullable: true,
        });
        self
    }

    pub fn with_complex(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            kind: PropertyKind::Complex(type_name.into()),
            nullable: true,
        });
        self
    }

    pub fn with_navigation(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            kind: PropertyKind::Navigation {
                target: target.into(),
                collection: false,
            },
            nullable: true,
        });
        self
    }

    pub fn with_collection(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            kind: PropertyKind::Navigation {
                target: target.into(),
                collection: true,
            },
            nullable: false,
        });
        self
    }

    pub fn open(mut self, container: impl Into<String>) -> Self {
        self.open_container = Some(container.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.open_container.is_some()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(with = "types_as_list")]
    types: IndexMap<String, StructuredType>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, ty: StructuredType) -> Self {
        self.types.insert(ty.name.clone(), ty);
        self
    }

    pub fn structured_type(&self, name: &str) -> Option<&StructuredType> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &StructuredType> {
        self.types.values()
    }

    pub fn resolve_property(&self, type_name: &str, name: &str) -> Option<&PropertyDef> {
        self.structured_type(type_name)?.property(name)
    }

    /// Reads a JSON schema document: `{"types": [{"name": .., "kind": "entity", ..}]}`.
    pub fn from_json(json: &str) -> Result<Self, sonic_rs::Error> {
        sonic_rs::from_str(json)
    }
}

mod types_as_list {
    use super::StructuredType;
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(
        types: &IndexMap<String, StructuredType>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let list: Vec<&StructuredType> = types.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<IndexMap<String, StructuredType>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<StructuredType>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|t| (t.name.clone(), t)).collect())
    }
}
