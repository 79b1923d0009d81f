//! SQL assembly for one grid request.
//!
//! - `clause`: structured WHERE/JOIN fragments and column alias helpers.
//! - `builder`: the `QueryBuilder` that renders and executes the page query
//!   and its two counts.

pub mod builder;
pub mod clause;

pub use builder::{QueryBuilder, QueryFailure, QueryStage};
pub use clause::{
    column_alias, column_expression, escape_like, result_key, BindValue, Join, Predicate, SqlQuery,
};
