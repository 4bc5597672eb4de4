pub mod eval;
pub mod expr;
pub mod functions;
pub mod memory;
pub mod plan;
pub mod queryable;
pub mod reduce;
pub mod translate;

#[cfg(test)]
mod tests;
