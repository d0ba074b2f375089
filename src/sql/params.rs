//! Convert serde_json::Value parameters to types sqlx can bind, per dialect.

use crate::error::{DataError, Result};
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// A value that can be bound to a query. Converts from serde_json::Value.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Json(Value),
}

impl BindValue {
    /// Integers outside the `i64` range are rejected rather than rounded.
    pub fn from_json(v: &Value) -> Result<Self> {
        Ok(match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => match (n.as_i64(), n.is_u64()) {
                (Some(i), _) => BindValue::I64(i),
                (None, true) => {
                    return Err(DataError::validation(format!("integer {} is out of range", n)));
                }
                (None, false) => BindValue::F64(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => BindValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => BindValue::Json(v.clone()),
        })
    }
}

pub(crate) fn bind_pg<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[Value],
) -> Result<Query<'q, Postgres, PgArguments>> {
    for p in params {
        query = match BindValue::from_json(p)? {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(b) => query.bind(b),
            BindValue::I64(n) => query.bind(n),
            BindValue::F64(n) => query.bind(n),
            BindValue::Text(s) => query.bind(s),
            BindValue::Json(v) => query.bind(sqlx::types::Json(v)),
        };
    }
    Ok(query)
}

pub(crate) fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Value],
) -> Result<Query<'q, Sqlite, SqliteArguments<'q>>> {
    for p in params {
        query = match BindValue::from_json(p)? {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(b) => query.bind(b),
            BindValue::I64(n) => query.bind(n),
            BindValue::F64(n) => query.bind(n),
            BindValue::Text(s) => query.bind(s),
            // SQLite has no JSON type; store the serialized document.
            BindValue::Json(v) => query.bind(v.to_string()),
        };
    }
    Ok(query)
}
