//! Decode driver rows into JSON objects keyed by column name.

use crate::schema::{ColumnKind, TableDef};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _};

pub type Row = Map<String, Value>;

pub(crate) fn pg_row_to_json(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), pg_cell(row, col.ordinal())))
        .collect()
}

fn pg_cell(row: &PgRow, idx: usize) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(idx) {
        return number(n as f64);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(idx) {
        return number(n);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(idx) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(idx) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(idx) {
        return j;
    }
    Value::Null
}

pub(crate) fn sqlite_row_to_json(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), sqlite_cell(row, col.ordinal())))
        .collect()
}

fn sqlite_cell(row: &SqliteRow, idx: usize) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(idx) {
        return number(n);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(idx) {
        return Value::Bool(b);
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(idx) {
        return Value::String(s);
    }
    Value::Null
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Align decoded values with declared column kinds (SQLite stores booleans as 0/1).
pub fn normalize_row(table: &TableDef, mut row: Row) -> Row {
    for (name, value) in row.iter_mut() {
        let Some(col) = table.get(name) else { continue };
        if col.kind == ColumnKind::Boolean {
            if let Some(n) = value.as_i64() {
                *value = Value::Bool(n != 0);
            }
        }
    }
    row
}
