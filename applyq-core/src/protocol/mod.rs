pub mod error;
pub mod row;
pub mod value;
