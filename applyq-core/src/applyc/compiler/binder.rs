use crate::{
    applyc::{
        analyzer::flattening::{collect_flattened_paths, requires_flattening},
        ast::{ScalarNode, UnaryOperator},
        compiler::shape::{FieldDecl, FlattenedProperty, RowShape, ShapeArena, ShapeId},
        extensions::ExtensionRegistry,
        schema::{FieldType, Model},
        settings::ApplySettings,
    },
    engine::{
        expr::Expr,
        functions::BuiltinFunction,
        plan::{NamedExpr, Projection},
        queryable::{BackendKind, Queryable},
    },
    protocol::error::{ApplyError, Result},
};
use indexmap::IndexSet;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, trace};

/// What a compiled node yields: a whole row of some shape, or a field value.
#[derive(Debug, Clone)]
enum Compiled {
    Row(ShapeId),
    Field(FieldType),
}

impl Compiled {
    fn field_type(&self) -> FieldType {
        match self {
            Compiled::Row(_) => FieldType::Dynamic,
            Compiled::Field(ty) => ty.clone(),
        }
    }
}

/// Compiles scalar AST nodes into [`Expr`]s against the working row of one
/// binding run.
///
/// Owns the per-run state: the null-propagation decision, whether scalar
/// results are boxed, the member-path cache and the flattening wrapper once
/// one has been created.
pub struct ExpressionCompiler<'m> {
    model: &'m Model,
    extensions: Arc<ExtensionRegistry>,
    null_propagation: bool,
    box_scalars: bool,
    path_cache: HashMap<(ShapeId, String), (Expr, Compiled)>,
    flattened: Option<ShapeId>,
}

impl<'m> ExpressionCompiler<'m> {
    pub fn new(model: &'m Model, settings: &ApplySettings, backend: &BackendKind) -> Self {
        Self {
            model,
            extensions: Arc::clone(&settings.extensions),
            null_propagation: settings.null_propagation.resolve(backend),
            box_scalars: backend.is_in_memory(),
            path_cache: HashMap::new(),
            flattened: None,
        }
    }

    pub fn null_propagation(&self) -> bool {
        self.null_propagation
    }

    pub fn boxes_scalars(&self) -> bool {
        self.box_scalars
    }

    /// The flattening wrapper of this run, if one was created.
    pub fn flattened(&self) -> Option<ShapeId> {
        self.flattened
    }

    pub fn compile(
        &mut self,
        node: &ScalarNode,
        arena: &ShapeArena,
        row: ShapeId,
    ) -> Result<(Expr, FieldType)> {
        let (expr, compiled) = self.compile_node(node, arena, row)?;
        Ok((expr, compiled.field_type()))
    }

    /// Boxes a scalar bound for a heterogeneous container when running in memory.
    pub fn wrap_convert(&self, expr: Expr, ty: &FieldType) -> Expr {
        if self.box_scalars && ty.is_scalar() {
            Expr::Boxed(Box::new(expr))
        } else {
            expr
        }
    }

    /// Inserts the flattening projection in front of a stage whose expressions
    /// cross a navigation or complex boundary. Happens at most once per run and
    /// never after the entity has been grouped away.
    pub fn flatten_if_needed<Q: Queryable>(
        &mut self,
        query: Q,
        arena: &mut ShapeArena,
        row: ShapeId,
        nodes: &[&ScalarNode],
    ) -> Result<(Q, ShapeId)> {
        if self.flattened.is_some() || !nodes.iter().any(|node| requires_flattening(node)) {
            return Ok((query, row));
        }
        if arena.entity_of(row, Expr::It).is_none() {
            return Ok((query, row));
        }

        let mut paths = IndexSet::new();
        for node in nodes {
            collect_flattened_paths(*node, &mut paths);
        }
        if paths.is_empty() {
            return Ok((query, row));
        }

        let mut named = Vec::with_capacity(paths.len());
        let mut properties = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let (expr, ty) = self.compile(path.node, arena, row)?;
            let name = format!("Property{i}");
            named.push(NamedExpr::new(name.clone(), self.wrap_convert(expr, &ty), ty.clone()));
            properties.push(FlattenedProperty {
                path: path.path.clone(),
                field: FieldDecl::new(name, ty),
            });
        }
        debug!(properties = properties.len(), "flattening rows");

        let shape = arena.alloc(RowShape::Flattened {
            source: row,
            properties,
        });
        self.flattened = Some(shape);
        Ok((query.select(Projection::Flatten { properties: named }), shape))
    }

    fn compile_node(
        &mut self,
        node: &ScalarNode,
        arena: &ShapeArena,
        row: ShapeId,
    ) -> Result<(Expr, Compiled)> {
        match node {
            ScalarNode::RangeVariable => Ok((Expr::It, Compiled::Row(row))),
            ScalarNode::PropertyAccess { source, property }
            | ScalarNode::ComplexAccess { source, property }
            | ScalarNode::NavigationAccess {
                source,
                navigation: property,
            } => self.member_access(node, source, property, arena, row, false),
            ScalarNode::OpenPropertyAccess { source, name } => {
                self.member_access(node, source, name, arena, row, true)
            }
            ScalarNode::BinaryOperator { op, left, right } => {
                let (left, left_ty) = self.compile(left, arena, row)?;
                let (right, right_ty) = self.compile(right, arena, row)?;
                let ty = if op.is_arithmetic() {
                    left_ty.promote(&right_ty)
                } else {
                    FieldType::Boolean
                };
                Ok((
                    Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    Compiled::Field(ty),
                ))
            }
            ScalarNode::UnaryOperator { op, operand } => {
                let (operand, operand_ty) = self.compile(operand, arena, row)?;
                let ty = match op {
                    UnaryOperator::Not => FieldType::Boolean,
                    UnaryOperator::Negate => operand_ty,
                };
                Ok((
                    Expr::Unary {
                        op: *op,
                        operand: Box::new(operand),
                    },
                    Compiled::Field(ty),
                ))
            }
            ScalarNode::FunctionCall { name, arguments } => {
                self.function_call(name, arguments, arena, row)
            }
            ScalarNode::Constant { value } => {
                Ok((Expr::Constant(value.clone()), Compiled::Field(value.field_type())))
            }
            ScalarNode::Convert { source, target } => {
                let (source, _) = self.compile(source, arena, row)?;
                Ok((
                    Expr::Convert {
                        source: Box::new(source),
                        target: target.clone(),
                    },
                    Compiled::Field(target.clone()),
                ))
            }
            ScalarNode::ParameterAlias { .. } | ScalarNode::Any { .. } | ScalarNode::All { .. } => {
                Err(ApplyError::unsupported(node.kind_name()))
            }
        }
    }

    /// Resolves a member read. A field introduced by an earlier stage under the
    /// node's full path wins; otherwise the source is compiled and the member
    /// read from it.
    fn member_access(
        &mut self,
        node: &ScalarNode,
        source: &ScalarNode,
        name: &str,
        arena: &ShapeArena,
        row: ShapeId,
        open: bool,
    ) -> Result<(Expr, Compiled)> {
        let path = node.full_path();
        if let Some(path) = &path {
            if let Some(hit) = self.path_cache.get(&(row, path.clone())) {
                trace!(path = %path, "member path cache hit");
                return Ok(hit.clone());
            }
            if let Some((expr, ty)) = arena.find_field(row, Expr::It, path, self.model) {
                let compiled = (expr, Compiled::Field(ty));
                self.path_cache.insert((row, path.clone()), compiled.clone());
                return Ok(compiled);
            }
        }

        let (target, target_ty) = self.compile_node(source, arena, row)?;
        let compiled = match target_ty {
            Compiled::Row(shape) if open => match arena.entity_of(shape, target) {
                Some((entity, type_name)) => self.open_member(entity, type_name, name, false)?,
                None => return Err(ApplyError::unknown_property(name, arena.describe(shape))),
            },
            Compiled::Row(shape) => arena
                .find_field(shape, target, name, self.model)
                .map(|(expr, ty)| (expr, Compiled::Field(ty)))
                .ok_or_else(|| ApplyError::unknown_property(name, arena.describe(shape)))?,
            Compiled::Field(FieldType::Structured(type_name)) if open => {
                self.open_member(target, &type_name, name, true)?
            }
            Compiled::Field(FieldType::Structured(type_name)) => {
                let property = self
                    .model
                    .resolve_property(&type_name, name)
                    .ok_or_else(|| ApplyError::unknown_property(name, &type_name))?;
                (
                    self.member(target, name, true),
                    Compiled::Field(property.field_type()),
                )
            }
            Compiled::Field(FieldType::Dynamic) => (
                self.member(target, name, true),
                Compiled::Field(FieldType::Dynamic),
            ),
            Compiled::Field(other) => {
                return Err(ApplyError::unknown_property(name, other.to_string()));
            }
        };

        if let Some(path) = path {
            self.path_cache.insert((row, path), compiled.clone());
        }
        Ok(compiled)
    }

    /// Reads `name` on a value of an open type: the declared property if there
    /// is one, otherwise a guarded lookup in the dynamic-property container.
    fn open_member(
        &self,
        target: Expr,
        type_name: &str,
        name: &str,
        value_target: bool,
    ) -> Result<(Expr, Compiled)> {
        let ty = self
            .model
            .structured_type(type_name)
            .ok_or_else(|| ApplyError::unknown_property(name, type_name))?;
        if let Some(property) = ty.property(name) {
            return Ok((
                self.member(target, name, value_target),
                Compiled::Field(property.field_type()),
            ));
        }
        match &ty.open_container {
            Some(container) => Ok((
                Expr::DynamicLookup {
                    target: Box::new(target),
                    container: container.clone(),
                    key: name.to_string(),
                    null_propagation: self.null_propagation,
                },
                Compiled::Field(FieldType::Dynamic),
            )),
            None => Err(ApplyError::unknown_property(name, type_name)),
        }
    }

    /// Member reads on values (not rows) may see null and follow the run's
    /// null-propagation mode.
    fn member(&self, target: Expr, name: &str, value_target: bool) -> Expr {
        Expr::Member {
            target: Box::new(target),
            name: name.to_string(),
            null_propagation: value_target && self.null_propagation,
        }
    }

    fn function_call(
        &mut self,
        name: &str,
        arguments: &[ScalarNode],
        arena: &ShapeArena,
        row: ShapeId,
    ) -> Result<(Expr, Compiled)> {
        if let Some(function) = BuiltinFunction::from_name(name) {
            if !function.accepts_arity(arguments.len()) {
                return Err(ApplyError::unsupported(format!(
                    "{name} with {} arguments",
                    arguments.len()
                )));
            }
            let (exprs, types) = self.compile_arguments(arguments, arena, row)?;
            return Ok((
                Expr::Call {
                    function,
                    arguments: exprs,
                    null_propagation: self.null_propagation,
                },
                Compiled::Field(function.return_type(&types)),
            ));
        }

        let Some(custom) = self.extensions.function(name).cloned() else {
            return Err(ApplyError::unsupported(name));
        };
        if custom.arity != arguments.len() {
            return Err(ApplyError::unsupported(format!(
                "{name} with {} arguments",
                arguments.len()
            )));
        }
        let (exprs, _) = self.compile_arguments(arguments, arena, row)?;
        let ty = custom.return_type.clone();
        Ok((
            Expr::Custom {
                function: custom,
                arguments: exprs,
            },
            Compiled::Field(ty),
        ))
    }

    fn compile_arguments(
        &mut self,
        arguments: &[ScalarNode],
        arena: &ShapeArena,
        row: ShapeId,
    ) -> Result<(Vec<Expr>, Vec<FieldType>)> {
        let mut exprs = Vec::with_capacity(arguments.len());
        let mut types = Vec::with_capacity(arguments.len());
        for argument in arguments {
            let (expr, ty) = self.compile(argument, arena, row)?;
            exprs.push(expr);
            types.push(ty);
        }
        Ok((exprs, types))
    }
}
