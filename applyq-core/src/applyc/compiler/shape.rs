use crate::{
    applyc::schema::{FieldType, Model},
    engine::expr::{ContainerSlot, Expr},
};
use itertools::Itertools;

/// Index of a [`RowShape`] inside a [`ShapeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: FieldType,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A boundary-crossing path materialized by the flattening projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedProperty {
    pub path: String,
    pub field: FieldDecl,
}

/// Compile-time description of the rows a query produces at some stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RowShape {
    Entity {
        type_name: String,
    },
    Wrapper {
        instance: Option<ShapeId>,
        extras: Vec<FieldDecl>,
    },
    Grouped {
        keys: Vec<FieldDecl>,
        aggregates: Vec<FieldDecl>,
    },
    Flattened {
        source: ShapeId,
        properties: Vec<FlattenedProperty>,
    },
}

/// Owns every shape created during one binding run. Shapes are never
/// mutated; a stage that changes the shape allocates a new one.
#[derive(Debug, Clone, Default)]
pub struct ShapeArena {
    shapes: Vec<RowShape>,
}

impl ShapeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, shape: RowShape) -> ShapeId {
        self.shapes.push(shape);
        ShapeId(self.shapes.len() - 1)
    }

    pub fn get(&self, id: ShapeId) -> &RowShape {
        &self.shapes[id.0]
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Finds a field named `name` (a plain name or a `/` path) that a stage
    /// introduced on `id`, or a declared property of the entity underneath.
    /// `base` is the expression that yields a row of shape `id`.
    pub fn find_field(
        &self,
        id: ShapeId,
        base: Expr,
        name: &str,
        model: &Model,
    ) -> Option<(Expr, FieldType)> {
        match self.get(id) {
            RowShape::Entity { type_name } => {
                let property = model.resolve_property(type_name, name)?;
                Some((
                    Expr::Member {
                        target: Box::new(base),
                        name: name.to_string(),
                        null_propagation: false,
                    },
                    property.field_type(),
                ))
            }
            RowShape::Wrapper { instance, extras } => {
                if let Some(field) = extras.iter().rev().find(|f| f.name == name) {
                    return Some((container(base, ContainerSlot::Extras, &field.name), field.ty.clone()));
                }
                let instance = (*instance)?;
                self.find_field(instance, Expr::Instance(Box::new(base)), name, model)
            }
            RowShape::Grouped { keys, aggregates } => {
                if let Some(field) = keys.iter().find(|f| f.name == name) {
                    return Some((container(base, ContainerSlot::Keys, &field.name), field.ty.clone()));
                }
                aggregates.iter().find(|f| f.name == name).map(|field| {
                    (
                        container(base, ContainerSlot::Aggregates, &field.name),
                        field.ty.clone(),
                    )
                })
            }
            RowShape::Flattened { source, properties } => {
                if let Some(property) = properties.iter().find(|p| p.path == name) {
                    return Some((
                        container(base, ContainerSlot::Flattened, &property.field.name),
                        property.field.ty.clone(),
                    ));
                }
                self.find_field(*source, Expr::Source(Box::new(base)), name, model)
            }
        }
    }

    /// The entity underneath `id` and the expression reaching it, if the
    /// shape still carries one.
    pub fn entity_of(&self, id: ShapeId, base: Expr) -> Option<(Expr, &str)> {
        match self.get(id) {
            RowShape::Entity { type_name } => Some((base, type_name.as_str())),
            RowShape::Wrapper {
                instance: Some(instance),
                ..
            } => self.entity_of(*instance, Expr::Instance(Box::new(base))),
            RowShape::Flattened { source, .. } => {
                self.entity_of(*source, Expr::Source(Box::new(base)))
            }
            RowShape::Wrapper { instance: None, .. } | RowShape::Grouped { .. } => None,
        }
    }

    /// Every field a consumer of `id` can read, in declaration order. A field
    /// introduced later replaces an earlier one with the same name.
    pub fn declared_fields(&self, id: ShapeId, model: &Model) -> Vec<FieldDecl> {
        let mut fields: Vec<FieldDecl> = Vec::new();
        let mut add = |field: FieldDecl| match fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => fields.push(field),
        };
        match self.get(id) {
            RowShape::Entity { type_name } => {
                for property in model
                    .structured_type(type_name)
                    .map(|ty| ty.properties.as_slice())
                    .unwrap_or_default()
                {
                    add(FieldDecl::new(property.name.clone(), property.field_type()));
                }
            }
            RowShape::Wrapper { instance, extras } => {
                if let Some(instance) = instance {
                    self.declared_fields(*instance, model).into_iter().for_each(&mut add);
                }
                extras.iter().cloned().for_each(&mut add);
            }
            RowShape::Grouped { keys, aggregates } => {
                keys.iter().chain(aggregates).cloned().for_each(&mut add);
            }
            RowShape::Flattened { source, .. } => {
                self.declared_fields(*source, model).into_iter().for_each(&mut add);
            }
        }
        fields
    }

    /// Short human-readable form used in error messages and `explain` output.
    pub fn describe(&self, id: ShapeId) -> String {
        match self.get(id) {
            RowShape::Entity { type_name } => type_name.clone(),
            RowShape::Wrapper {
                instance: Some(instance),
                extras,
            } => format!("{} + {{{}}}", self.describe(*instance), names(extras)),
            RowShape::Wrapper {
                instance: None,
                extras,
            } => format!("{{{}}}", names(extras)),
            RowShape::Grouped { keys, aggregates } => {
                format!("group {{{}}} -> {{{}}}", names(keys), names(aggregates))
            }
            RowShape::Flattened { source, .. } => self.describe(*source),
        }
    }
}

fn names(fields: &[FieldDecl]) -> String {
    fields.iter().map(|f| f.name.as_str()).join(", ")
}

fn container(base: Expr, slot: ContainerSlot, name: &str) -> Expr {
    Expr::Container {
        target: Box::new(base),
        slot,
        name: name.to_string(),
    }
}
