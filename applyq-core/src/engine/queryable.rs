use crate::engine::plan::{Grouping, Projection, SortKey};
use crate::engine::expr::Expr;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identity of the store a query will run against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendKind {
    /// Rows are enumerated and evaluated in process.
    InMemory,
    /// The plan is handed to a remote store that translates it.
    Translated { provider: String },
}

impl BackendKind {
    pub fn is_in_memory(&self) -> bool {
        matches!(self, BackendKind::InMemory)
    }

    pub fn name(&self) -> &str {
        match self {
            BackendKind::InMemory => "in-memory",
            BackendKind::Translated { provider } => provider,
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_apply: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_apply: true,
        }
    }
}

/// A deferred query over rows of some working shape.
///
/// Every operation returns a new query; nothing is enumerated until the
/// backend is asked to execute.
pub trait Queryable: Sized {
    fn backend(&self) -> &BackendKind;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn filter(self, predicate: Expr) -> Self;

    fn select(self, projection: Projection) -> Self;

    fn group_by(self, grouping: Grouping) -> Self;

    fn order_by(self, keys: Vec<SortKey>) -> Self;

    fn skip(self, count: usize) -> Self;

    fn take(self, count: usize) -> Self;
}
