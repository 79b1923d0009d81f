//! Database collaborator used by the query builder.
//!
//! The builder only ever hands over a rendered statement plus its bind
//! values; the source executes it and returns loosely typed rows.
use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::query::{Query, QueryScalar};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, ValueRef};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::RawRow;
use crate::query::{BindValue, SqlQuery};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("query rejected by backend: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Execute a row-returning statement.
    async fn fetch_rows(&self, query: &SqlQuery) -> Result<Vec<RawRow>, QueryError>;

    /// Execute a statement returning a single integer in its first column.
    async fn fetch_count(&self, query: &SqlQuery) -> Result<i64, QueryError>;
}

#[async_trait]
impl DataSource for SqlitePool {
    #[instrument(skip_all)]
    async fn fetch_rows(&self, query: &SqlQuery) -> Result<Vec<RawRow>, QueryError> {
        debug!(sql = %query.sql, binds = query.binds.len(), "fetching rows");
        let rows = bind_values(sqlx::query(&query.sql), &query.binds)
            .fetch_all(self)
            .await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    #[instrument(skip_all)]
    async fn fetch_count(&self, query: &SqlQuery) -> Result<i64, QueryError> {
        debug!(sql = %query.sql, binds = query.binds.len(), "fetching count");
        let count = bind_values_scalar(sqlx::query_scalar::<_, i64>(&query.sql), &query.binds)
            .fetch_one(self)
            .await?;
        Ok(count)
    }
}

fn bind_values<'q>(
    mut q: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: &'q [BindValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in binds {
        q = match value {
            BindValue::Null => q.bind(None::<i64>),
            BindValue::Int(v) => q.bind(*v),
            BindValue::Real(v) => q.bind(*v),
            BindValue::Text(v) => q.bind(v.as_str()),
            BindValue::Bool(v) => q.bind(*v),
        };
    }
    q
}

fn bind_values_scalar<'q>(
    mut q: QueryScalar<'q, Sqlite, i64, SqliteArguments<'q>>,
    binds: &'q [BindValue],
) -> QueryScalar<'q, Sqlite, i64, SqliteArguments<'q>> {
    for value in binds {
        q = match value {
            BindValue::Null => q.bind(None::<i64>),
            BindValue::Int(v) => q.bind(*v),
            BindValue::Real(v) => q.bind(*v),
            BindValue::Text(v) => q.bind(v.as_str()),
            BindValue::Bool(v) => q.bind(*v),
        };
    }
    q
}

fn decode_row(row: &SqliteRow) -> RawRow {
    let mut out = RawRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_cell(row, idx));
    }
    out
}

/// SQLite is dynamically typed, so try the storage classes in turn.
fn decode_cell(row: &SqliteRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return Value::String(String::from_utf8_lossy(&v).into_owned());
    }
    Value::Null
}
