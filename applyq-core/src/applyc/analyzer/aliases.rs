use crate::applyc::ast::{ScalarNode, TransformationNode};
use std::collections::HashMap;
use tracing::debug;

/// Replaces `@alias` references inside filter stages with the supplied alias values.
/// An alias with no value becomes a null constant. Aliases may refer to other
/// aliases; a reference cycle resolves to null at the point it closes.
pub fn resolve_parameter_aliases(
    transformations: &[TransformationNode],
    aliases: &HashMap<String, ScalarNode>,
) -> Vec<TransformationNode> {
    transformations
        .iter()
        .map(|transformation| match transformation {
            TransformationNode::Filter { predicate } => TransformationNode::Filter {
                predicate: substitute(predicate, aliases),
            },
            other => other.clone(),
        })
        .collect()
}

pub fn substitute(node: &ScalarNode, aliases: &HashMap<String, ScalarNode>) -> ScalarNode {
    substitute_inner(node, aliases, &mut Vec::new())
}

fn substitute_inner<'a>(
    node: &'a ScalarNode,
    aliases: &'a HashMap<String, ScalarNode>,
    resolving: &mut Vec<&'a str>,
) -> ScalarNode {
    let recurse = |child: &'a ScalarNode, resolving: &mut Vec<&'a str>| {
        Box::new(substitute_inner(child, aliases, resolving))
    };
    match node {
        ScalarNode::ParameterAlias { name } => {
            match aliases.get(name) {
                Some(value) if !resolving.contains(&name.as_str()) => {
                    resolving.push(name);
                    let resolved = substitute_inner(value, aliases, resolving);
                    resolving.pop();
                    resolved
                }
                _ => {
                    debug!(alias = %name, "parameter alias has no value, substituting null");
                    ScalarNode::null()
                }
            }
        }
        ScalarNode::PropertyAccess { source, property } => ScalarNode::PropertyAccess {
            source: recurse(source, resolving),
            property: property.clone(),
        },
        ScalarNode::ComplexAccess { source, property } => ScalarNode::ComplexAccess {
            source: recurse(source, resolving),
            property: property.clone(),
        },
        ScalarNode::NavigationAccess { source, navigation } => ScalarNode::NavigationAccess {
            source: recurse(source, resolving),
            navigation: navigation.clone(),
        },
        ScalarNode::OpenPropertyAccess { source, name } => ScalarNode::OpenPropertyAccess {
            source: recurse(source, resolving),
            name: name.clone(),
        },
        ScalarNode::BinaryOperator { op, left, right } => ScalarNode::BinaryOperator {
            op: *op,
            left: recurse(left, resolving),
            right: recurse(right, resolving),
        },
        ScalarNode::UnaryOperator { op, operand } => ScalarNode::UnaryOperator {
            op: *op,
            operand: recurse(operand, resolving),
        },
        ScalarNode::FunctionCall { name, arguments } => ScalarNode::FunctionCall {
            name: name.clone(),
            arguments: arguments
                .iter()
                .map(|arg| substitute_inner(arg, aliases, resolving))
                .collect(),
        },
        ScalarNode::Convert { source, target } => ScalarNode::Convert {
            source: recurse(source, resolving),
            target: target.clone(),
        },
        ScalarNode::Any { source, predicate } => ScalarNode::Any {
            source: recurse(source, resolving),
            predicate: recurse(predicate, resolving),
        },
        ScalarNode::All { source, predicate } => ScalarNode::All {
            source: recurse(source, resolving),
            predicate: recurse(predicate, resolving),
        },
        ScalarNode::RangeVariable | ScalarNode::Constant { .. } => node.clone(),
    }
}
