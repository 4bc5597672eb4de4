use crate::{
    applyc::{
        ast::{AggregateExpression, ScalarNode, TransformationNode},
        settings::{ArithmeticOperator, ValidationSettings},
    },
    protocol::error::{ApplyError, Result},
};

/// Checks every stage of a pipeline against the configured limits.
///
/// Node counts are per stage: all expressions owned by one stage count
/// together, entity-set children and nested expand options count as part of
/// the stage that owns them.
pub fn validate_pipeline(
    transformations: &[TransformationNode],
    settings: &ValidationSettings,
) -> Result<()> {
    for transformation in transformations {
        validate_transformation(transformation, settings)?;
    }
    Ok(())
}

pub fn validate_transformation(
    transformation: &TransformationNode,
    settings: &ValidationSettings,
) -> Result<()> {
    let mut validator = Validator::new(settings);
    match transformation {
        TransformationNode::Filter { predicate } => validator.visit(predicate)?,
        TransformationNode::Compute { items } => {
            for item in items {
                validator.visit(&item.expression)?;
            }
        }
        TransformationNode::GroupBy { keys, aggregate } => {
            for key in keys {
                validator.visit(key)?;
            }
            validator.visit_aggregates(aggregate)?;
        }
        TransformationNode::Aggregate { expressions } => validator.visit_aggregates(expressions)?,
        TransformationNode::Expand { clause } => {
            for item in &clause.items {
                if let Some(filter) = &item.filter {
                    validator.visit(filter)?;
                }
                for compute in &item.compute {
                    validator.visit(&compute.expression)?;
                }
                validate_pipeline(&item.apply, settings)?;
            }
        }
    }
    Ok(())
}

/// Validates a standalone expression (a `$filter` or `$orderby` option).
pub fn validate_expression(node: &ScalarNode, settings: &ValidationSettings) -> Result<()> {
    Validator::new(settings).visit(node)
}

struct Validator<'s> {
    settings: &'s ValidationSettings,
    node_count: usize,
}

impl<'s> Validator<'s> {
    fn new(settings: &'s ValidationSettings) -> Self {
        Self {
            settings,
            node_count: 0,
        }
    }

    fn visit_aggregates(&mut self, aggregates: &[AggregateExpression]) -> Result<()> {
        for aggregate in aggregates {
            match aggregate {
                AggregateExpression::Property { expression, .. } => self.visit(expression)?,
                AggregateExpression::Count { .. } => self.bump()?,
                AggregateExpression::EntitySet { children, .. } => {
                    self.bump()?;
                    self.visit_aggregates(children)?;
                }
            }
        }
        Ok(())
    }

    fn visit(&mut self, node: &ScalarNode) -> Result<()> {
        self.bump()?;
        if let ScalarNode::BinaryOperator { op, .. } = node
            && let Some(arithmetic) = ArithmeticOperator::from_binary(*op)
            && !self
                .settings
                .allowed_arithmetic_operators
                .contains(&arithmetic)
        {
            return Err(ApplyError::Validation(format!(
                "arithmetic operator `{op:?}` is not allowed",
            )));
        }
        for child in node.children() {
            self.visit(child)?;
        }
        Ok(())
    }

    fn bump(&mut self) -> Result<()> {
        self.node_count += 1;
        if self.node_count > self.settings.max_node_count {
            return Err(ApplyError::Validation(format!(
                "the node count limit of {} has been exceeded",
                self.settings.max_node_count
            )));
        }
        Ok(())
    }
}
