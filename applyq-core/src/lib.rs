pub mod applyc;
pub mod engine;
pub mod protocol;

pub use applyc::{
    ast::TransformationNode,
    compiler::{ApplyBinder, BoundQuery, QueryOptions, apply_query_options},
    schema::Model,
    settings::ApplySettings,
};
pub use engine::{memory::InMemoryQuery, queryable::Queryable, translate::TranslatedQuery};
pub use protocol::{
    error::{ApplyError, Result},
    row::Row,
    value::Value,
};
