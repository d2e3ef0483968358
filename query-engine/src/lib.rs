//! query-engine: the collection query language.
//!
//! [`parse_query_string`] turns `?age=12$24&sort=name$-1&proj=name` into a
//! [`Query`]; [`evaluate`] applies it to JSON records described by a
//! [`Schema`].

pub mod error;
pub mod evaluator;
pub mod parser;
pub mod schema;
pub mod value;

pub use error::QueryError;
pub use evaluator::{evaluate, matches_filter, Record};
pub use parser::{
    parse_params, parse_query_string, FilterSpec, Predicate, ProjectionSpec, Query,
    SortDirection, SortKey, SortSpec,
};
pub use schema::{FieldType, Schema};
pub use value::TypedValue;
