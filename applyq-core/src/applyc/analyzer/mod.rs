//! Pre-binding passes over the transformation AST.

pub mod aliases;
pub mod flattening;
pub mod validation;
