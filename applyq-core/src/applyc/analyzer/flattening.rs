use crate::applyc::ast::ScalarNode;
use indexmap::IndexSet;

/// True as soon as the expression reads through a navigation or complex-type boundary.
pub fn requires_flattening(node: &ScalarNode) -> bool {
    match node {
        ScalarNode::NavigationAccess { .. } | ScalarNode::ComplexAccess { .. } => true,
        ScalarNode::PropertyAccess { source, .. }
        | ScalarNode::OpenPropertyAccess { source, .. }
        | ScalarNode::Convert { source, .. } => requires_flattening(source),
        ScalarNode::FunctionCall { arguments, .. } => arguments.iter().any(requires_flattening),
        ScalarNode::BinaryOperator { left, right, .. } => {
            requires_flattening(left) || requires_flattening(right)
        }
        ScalarNode::UnaryOperator { operand, .. } => requires_flattening(operand),
        // lambdas are rejected by the compiler; nothing to flatten for them
        ScalarNode::Any { .. } | ScalarNode::All { .. } => false,
        ScalarNode::RangeVariable
        | ScalarNode::Constant { .. }
        | ScalarNode::ParameterAlias { .. } => false,
    }
}

/// Distinct boundary-crossing member paths of `node`, in first-seen order.
///
/// A path qualifies when it is a plain member chain from `$it` that passes
/// through a navigation or complex property, e.g. `Category/Name`.
pub fn collect_flattened_paths<'a>(node: &'a ScalarNode, paths: &mut IndexSet<FlattenedPath<'a>>) {
    match node {
        ScalarNode::PropertyAccess { source, .. } | ScalarNode::OpenPropertyAccess { source, .. }
            if requires_flattening(source) =>
        {
            if let Some(path) = node.full_path() {
                paths.insert(FlattenedPath { path, node });
            } else {
                collect_flattened_paths(source, paths);
            }
        }
        _ => {
            for child in node.children() {
                collect_flattened_paths(child, paths);
            }
        }
    }
}

/// A boundary-crossing member chain and the node that reads it.
#[derive(Debug, Clone)]
pub struct FlattenedPath<'a> {
    pub path: String,
    pub node: &'a ScalarNode,
}

impl PartialEq for FlattenedPath<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FlattenedPath<'_> {}

impl std::hash::Hash for FlattenedPath<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}
