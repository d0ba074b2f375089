//! Generic CRUD over one table on one named connection.

use crate::db::{ConnectionHandle, DatabaseRegistry, DialectKind, TransactionHandle};
use crate::error::{DataError, Result};
use crate::events::{EventKind, TableEvent, TableEventChannel};
use crate::filter::{FilterCompiler, MutationOptions, QueryOptions, Search, SearchQuery};
use crate::schema::TableDef;
use crate::sql::{self, normalize_row, QueryBuf, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::field;
use uuid::Uuid;

/// Rows come back as `T` (plain JSON objects by default). Inputs are anything that serializes
/// to a JSON object, or an array of them for bulk insert.
pub struct Repository<T = Value> {
    handle: Arc<ConnectionHandle>,
    table: Arc<TableDef>,
    events: Arc<TableEventChannel>,
    _row: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Repository {
            handle: self.handle.clone(),
            table: self.table.clone(),
            events: self.events.clone(),
            _row: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Repository<T> {
    pub fn new(handle: Arc<ConnectionHandle>, table: TableDef) -> Self {
        let events = handle.events(&table.table_name);
        Repository {
            handle,
            table: Arc::new(table),
            events,
            _row: PhantomData,
        }
    }

    pub fn from_registry(registry: &DatabaseRegistry, connection: &str, table: TableDef) -> Result<Self> {
        Ok(Self::new(registry.get(connection)?, table))
    }

    pub fn table(&self) -> &TableDef {
        &self.table
    }

    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub fn events(&self) -> &Arc<TableEventChannel> {
        &self.events
    }

    fn dialect(&self) -> DialectKind {
        self.handle.dialect()
    }

    fn compiler(&self) -> FilterCompiler<'_> {
        FilterCompiler::new(&self.table)
    }

    fn by_id(&self, id: impl Into<Value>) -> Search {
        SearchQuery::new().eq(self.table.primary_key.clone(), id).into()
    }

    /// Insert one object or an array of objects. Consecutive rows with the same columns go out
    /// as one multi-row statement.
    #[tracing::instrument(skip_all, fields(table = %self.table.table_name, correlation_id = field::Empty))]
    pub async fn insert<D: Serialize>(&self, data: D, opts: &MutationOptions) -> Result<Vec<T>> {
        let id = correlate();
        let rows = input_rows(&data)?;
        let statements = batches(&rows)
            .into_iter()
            .map(|batch| sql::insert(&self.table, batch, self.dialect()))
            .collect::<Result<Vec<_>>>()?;
        let created = match (&opts.transaction, statements.len()) {
            (None, n) if n > 1 => {
                // Several statements form one insert; all of them land or none do.
                let tx = self.handle.begin().await?;
                match self.insert_batches(statements, Some(&tx), id).await {
                    Ok(created) => {
                        tx.commit().await?;
                        created
                    }
                    Err(e) => {
                        if let Err(rb) = tx.rollback().await {
                            tracing::warn!(error = %rb, "rollback after failed insert batch");
                        }
                        return Err(e);
                    }
                }
            }
            (tx, _) => self.insert_batches(statements, tx.as_ref(), id).await?,
        };
        if created.is_empty() && opts.throw_if_no_result {
            return Err(DataError::ModelNotCreated {
                table: self.table.table_name.clone(),
            });
        }
        self.decode(created)
    }

    async fn insert_batches(
        &self,
        statements: Vec<QueryBuf>,
        tx: Option<&TransactionHandle>,
        id: Uuid,
    ) -> Result<Vec<Row>> {
        let mut created = Vec::new();
        for q in statements {
            created.extend(self.run(EventKind::Inserted, q, tx, id).await?);
        }
        Ok(created)
    }

    #[tracing::instrument(skip_all, fields(table = %self.table.table_name, correlation_id = field::Empty))]
    pub async fn find(&self, search: impl Into<Search>, opts: &QueryOptions) -> Result<Vec<T>> {
        let id = correlate();
        let search = search.into();
        let compiled = self.compiler().compile_query(Some(&search), opts)?;
        let q = sql::select(&self.table, &compiled, self.dialect());
        let rows = self.run(EventKind::Selected, q, opts.transaction.as_ref(), id).await?;
        if rows.is_empty() && opts.throw_if_no_result {
            return Err(DataError::ModelNotFound {
                table: self.table.table_name.clone(),
            });
        }
        self.decode(rows)
    }

    pub async fn find_one(&self, search: impl Into<Search>, opts: &QueryOptions) -> Result<Option<T>> {
        let opts = opts.clone().limit(1);
        Ok(self.find(search, &opts).await?.into_iter().next())
    }

    pub async fn find_by_id(&self, id: impl Into<Value>, opts: &QueryOptions) -> Result<Option<T>> {
        self.find_one(self.by_id(id), opts).await
    }

    /// Set the given columns on every matching row.
    #[tracing::instrument(skip_all, fields(table = %self.table.table_name, correlation_id = field::Empty))]
    pub async fn update<D: Serialize>(
        &self,
        data: D,
        search: impl Into<Search>,
        opts: &MutationOptions,
    ) -> Result<Vec<T>> {
        let id = correlate();
        let data = match to_json(&data)? {
            Value::Object(map) => map,
            _ => return Err(DataError::validation("update data must be an object")),
        };
        let search = search.into();
        let predicate = self.compiler().where_clause(Some(&search), None)?;
        let q = sql::update(&self.table, &data, predicate.as_ref(), self.dialect())?;
        let rows = self.run(EventKind::Updated, q, opts.transaction.as_ref(), id).await?;
        if rows.is_empty() && opts.throw_if_no_result {
            return Err(DataError::ModelNotUpdated {
                table: self.table.table_name.clone(),
            });
        }
        self.decode(rows)
    }

    pub async fn update_one<D: Serialize>(
        &self,
        data: D,
        id: impl Into<Value>,
        opts: &MutationOptions,
    ) -> Result<Option<T>> {
        Ok(self.update(data, self.by_id(id), opts).await?.into_iter().next())
    }

    /// Delete matching rows. A search that imposes no condition (missing, empty, or with an
    /// empty alternative) is refused before anything runs.
    #[tracing::instrument(skip_all, fields(table = %self.table.table_name, correlation_id = field::Empty))]
    pub async fn delete(&self, search: Option<Search>, opts: &MutationOptions) -> Result<Vec<T>> {
        let predicate = match &search {
            Some(s) => self.compiler().where_clause(Some(s), None)?,
            None => None,
        };
        let Some(predicate) = predicate else {
            return Err(DataError::CrudDeleteNoSearch {
                table: self.table.table_name.clone(),
            });
        };
        let id = correlate();
        let q = sql::delete(&self.table, Some(&predicate), self.dialect());
        let rows = self.run(EventKind::Deleted, q, opts.transaction.as_ref(), id).await?;
        if rows.is_empty() && opts.throw_if_no_result {
            return Err(DataError::ModelNotDeleted {
                table: self.table.table_name.clone(),
            });
        }
        self.decode(rows)
    }

    pub async fn delete_one(&self, id: impl Into<Value>, opts: &MutationOptions) -> Result<Option<T>> {
        Ok(self.delete(Some(self.by_id(id)), opts).await?.into_iter().next())
    }

    /// Number of rows matching `search` and `opts.filters`. Projection, ordering and
    /// pagination in `opts` are ignored.
    #[tracing::instrument(skip_all, fields(table = %self.table.table_name, correlation_id = field::Empty))]
    pub async fn count(&self, search: Option<Search>, opts: &QueryOptions) -> Result<u64> {
        let id = correlate();
        let predicate = self.compiler().where_clause(search.as_ref(), opts.filters.as_ref())?;
        let q = sql::count(&self.table, predicate.as_ref(), self.dialect());
        tracing::debug!(sql = %q.sql, params = ?q.params, "executing statement");
        let rows = self.handle.fetch(&q, opts.transaction.as_ref()).await?;
        let n = rows
            .first()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        self.emit(EventKind::Selected, q, n, id);
        Ok(n)
    }

    async fn run(
        &self,
        kind: EventKind,
        q: QueryBuf,
        tx: Option<&TransactionHandle>,
        correlation_id: Uuid,
    ) -> Result<Vec<Row>> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "executing statement");
        let rows = self.handle.fetch(&q, tx).await?;
        self.emit(kind, q, rows.len() as u64, correlation_id);
        Ok(rows)
    }

    fn emit(&self, kind: EventKind, q: QueryBuf, row_count: u64, correlation_id: Uuid) {
        let table = match &self.table.schema_name {
            Some(schema) => format!("{}.{}", schema, self.table.table_name),
            None => self.table.table_name.clone(),
        };
        self.events.emit(&TableEvent {
            kind,
            connection: self.handle.name().to_string(),
            table: self.table.table_name.clone(),
            tables: vec![table],
            sql: q.sql,
            params: q.params,
            correlation_id,
            row_count,
        });
    }

    fn decode(&self, rows: Vec<Row>) -> Result<Vec<T>> {
        rows.into_iter()
            .map(|r| Ok(serde_json::from_value(Value::Object(normalize_row(&self.table, r)))?))
            .collect()
    }
}

fn correlate() -> Uuid {
    let id = Uuid::new_v4();
    tracing::Span::current().record("correlation_id", field::display(id));
    id
}

fn to_json<D: Serialize>(data: &D) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| DataError::validation(format!("input is not serializable: {}", e)))
}

fn input_rows<D: Serialize>(data: &D) -> Result<Vec<Row>> {
    let not_object = || DataError::validation("insert data must be an object or an array of objects");
    match to_json(data)? {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => Ok(map),
                _ => Err(not_object()),
            })
            .collect(),
        _ => Err(not_object()),
    }
}

fn same_columns(a: &Row, b: &Row) -> bool {
    a.len() == b.len() && a.keys().all(|k| b.contains_key(k))
}

/// Split into runs of consecutive rows sharing one column set. Rows without columns stand alone.
fn batches(rows: &[Row]) -> Vec<&[Row]> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        let split = i == rows.len()
            || rows[i].is_empty()
            || rows[start].is_empty()
            || !same_columns(&rows[start], &rows[i]);
        if split {
            out.push(&rows[start..i]);
            start = i;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(v: Value) -> Vec<Row> {
        input_rows(&v).unwrap()
    }

    #[test]
    fn batches_follow_consecutive_column_sets() {
        let input = rows(json!([
            {"a": 1, "b": 2},
            {"b": 3, "a": 4},
            {"a": 5},
            {},
            {},
            {"a": 6},
        ]));
        let sizes: Vec<usize> = batches(&input).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1, 1, 1]);
        assert!(batches(&[]).is_empty());
    }

    #[test]
    fn insert_input_must_be_objects() {
        assert_eq!(rows(json!({"a": 1})).len(), 1);
        assert!(input_rows(&json!([1, 2])).is_err());
        assert!(input_rows(&json!("x")).is_err());
    }
}
