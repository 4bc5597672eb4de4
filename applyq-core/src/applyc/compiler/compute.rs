use crate::{
    applyc::{
        ast::{ComputeExpression, ScalarNode},
        compiler::{
            pipeline::Pipeline,
            shape::{FieldDecl, RowShape},
        },
    },
    engine::{
        expr::Expr,
        plan::{NamedExpr, Projection},
        queryable::Queryable,
    },
    protocol::error::{ApplyError, Result},
};
use std::collections::HashSet;

impl<Q: Queryable> Pipeline<'_, Q> {
    /// Wraps every row as `{ instance, extras }` where `extras` holds the
    /// computed values. Items are compiled against the pre-stage row, so one
    /// alias cannot read another alias of the same clause. An alias may not
    /// reuse the name of a field the row already exposes.
    pub fn compute(mut self, items: &[ComputeExpression]) -> Result<Self> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in items {
            if !seen.insert(item.alias.as_str()) {
                return Err(ApplyError::InvalidPipelineState(format!(
                    "duplicate compute alias `{}`",
                    item.alias
                )));
            }
            if let Some((_, ty)) = self
                .arena
                .find_field(self.row, Expr::It, &item.alias, self.model)
            {
                return Err(ApplyError::InvalidPipelineState(format!(
                    "compute alias `{}` collides with an existing field of type {ty}",
                    item.alias
                )));
            }
        }

        let nodes: Vec<&ScalarNode> = items.iter().map(|item| &item.expression).collect();
        let (query, row) =
            self.compiler
                .flatten_if_needed(self.query, &mut self.arena, self.row, &nodes)?;

        let mut extras = Vec::with_capacity(items.len());
        let mut declared = Vec::with_capacity(items.len());
        for item in items {
            let (expr, ty) = self.compiler.compile(&item.expression, &self.arena, row)?;
            extras.push(NamedExpr::new(
                item.alias.clone(),
                self.compiler.wrap_convert(expr, &ty),
                ty.clone(),
            ));
            declared.push(FieldDecl::new(item.alias.clone(), ty));
        }

        self.query = query.select(Projection::Compute { extras });
        self.row = self.arena.alloc(RowShape::Wrapper {
            instance: Some(row),
            extras: declared,
        });
        self.shape_changed = true;
        Ok(self)
    }
}
