//! Renders compiled predicates and CRUD intents into parameterized SQL.
//! Identifiers come from `TableDef` only; every value is a bound parameter.

use crate::db::DialectKind;
use crate::error::{DataError, Result};
use crate::filter::{CompiledQuery, Predicate};
use crate::schema::{ColumnDef, ColumnKind, TableDef};
use serde_json::{Map, Value};
use std::fmt::Write;

/// Quote identifier (double quotes work for both PostgreSQL and SQLite).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(table: &TableDef) -> String {
    match &table.schema_name {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(&table.table_name)),
        None => quoted(&table.table_name),
    }
}

#[derive(Clone, Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    dialect: DialectKind,
}

impl QueryBuf {
    pub fn new(dialect: DialectKind) -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
            dialect,
        }
    }

    pub fn dialect(&self) -> DialectKind {
        self.dialect
    }

    /// Push a parameter and return its placeholder. PostgreSQL placeholders carry a cast so
    /// text-bound values (dates, uuids, enums) compare against typed columns.
    fn push_param(&mut self, v: Value, pg_type: Option<&str>) -> String {
        self.params.push(v);
        match self.dialect {
            DialectKind::Postgres => {
                let n = self.params.len();
                match pg_type {
                    Some(t) => format!("${}::{}", n, t),
                    None => format!("${}", n),
                }
            }
            DialectKind::Sqlite => "?".to_string(),
        }
    }
}

fn pg_cast<'a>(table: &'a TableDef, column: &str) -> Option<&'a str> {
    table.get(column).map(|c| c.pg_type())
}

/// SELECT/RETURNING list. On PostgreSQL, custom enum types (schema.typename) come back as text
/// and numeric as float8 so rows decode to JSON scalars.
fn select_column_list<'a, I>(table: &TableDef, columns: I, dialect: DialectKind) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    columns
        .into_iter()
        .map(|name| {
            let q = quoted(name);
            let sql_type = table.get(name).map(ColumnDef::pg_type).unwrap_or("");
            match dialect {
                DialectKind::Postgres if sql_type.contains('.') => format!("{}::text AS {}", q, q),
                DialectKind::Postgres if sql_type == "numeric" => format!("{}::float8 AS {}", q, q),
                _ => q,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn returning_list(table: &TableDef, dialect: DialectKind) -> String {
    select_column_list(table, table.column_names(), dialect)
}

/// Render a predicate, pushing its values in textual order.
pub fn write_predicate(q: &mut QueryBuf, table: &TableDef, p: &Predicate) -> String {
    match p {
        Predicate::Compare { column, op, value } => {
            let ph = q.push_param(value.clone(), pg_cast(table, column));
            format!("{} {} {}", quoted(column), op.sql(), ph)
        }
        Predicate::In { column, values, negated } => {
            let cast = pg_cast(table, column);
            let placeholders: Vec<String> = values.iter().map(|v| q.push_param(v.clone(), cast)).collect();
            format!(
                "{} {}IN ({})",
                quoted(column),
                if *negated { "NOT " } else { "" },
                placeholders.join(", ")
            )
        }
        Predicate::Like { column, pattern, negated } => {
            let is_text = table.get(column).map(|c| c.kind == ColumnKind::String).unwrap_or(true);
            let target = if is_text {
                quoted(column)
            } else {
                format!("CAST({} AS TEXT)", quoted(column))
            };
            let ph = q.push_param(Value::String(pattern.clone()), Some("text"));
            format!("{} {}LIKE {}", target, if *negated { "NOT " } else { "" }, ph)
        }
        Predicate::Between { column, low, high, negated } => {
            let cast = pg_cast(table, column);
            let lo = q.push_param(low.clone(), cast);
            let hi = q.push_param(high.clone(), cast);
            format!(
                "{} {}BETWEEN {} AND {}",
                quoted(column),
                if *negated { "NOT " } else { "" },
                lo,
                hi
            )
        }
        Predicate::Null { column, negated } => {
            format!("{} IS {}NULL", quoted(column), if *negated { "NOT " } else { "" })
        }
        Predicate::And(parts) => write_group(q, table, parts, " AND ", "1 = 1"),
        Predicate::Or(parts) => write_group(q, table, parts, " OR ", "1 = 0"),
        Predicate::Const(true) => "1 = 1".to_string(),
        Predicate::Const(false) => "1 = 0".to_string(),
    }
}

fn write_group(q: &mut QueryBuf, table: &TableDef, parts: &[Predicate], sep: &str, empty: &str) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let rendered: Vec<String> = parts.iter().map(|p| write_predicate(q, table, p)).collect();
    format!("({})", rendered.join(sep))
}

fn push_where(q: &mut QueryBuf, table: &TableDef, predicate: Option<&Predicate>) {
    if let Some(p) = predicate {
        let clause = write_predicate(q, table, p);
        q.sql.push_str(" WHERE ");
        q.sql.push_str(&clause);
    }
}

/// SELECT with projection, filters, ordering and pagination.
pub fn select(table: &TableDef, query: &CompiledQuery, dialect: DialectKind) -> QueryBuf {
    let mut q = QueryBuf::new(dialect);
    let cols = select_column_list(table, query.selection.iter().map(String::as_str), dialect);
    q.sql = format!("SELECT {} FROM {}", cols, qualified_table(table));
    push_where(&mut q, table, query.predicate.as_ref());
    if !query.order_by.is_empty() {
        let order: Vec<String> = query
            .order_by
            .iter()
            .map(|o| format!("{} {}", quoted(&o.selected_field), o.direction.sql()))
            .collect();
        q.sql.push_str(" ORDER BY ");
        q.sql.push_str(&order.join(", "));
    }
    let _ = write!(q.sql, " LIMIT {} OFFSET {}", query.limit, query.offset);
    q
}

/// SELECT COUNT(*) with optional filters.
pub fn count(table: &TableDef, predicate: Option<&Predicate>, dialect: DialectKind) -> QueryBuf {
    let mut q = QueryBuf::new(dialect);
    q.sql = format!("SELECT COUNT(*) AS {} FROM {}", quoted("count"), qualified_table(table));
    push_where(&mut q, table, predicate);
    q
}

fn check_columns<'a>(table: &TableDef, keys: impl IntoIterator<Item = &'a String>) -> Result<()> {
    for k in keys {
        if table.get(k).is_none() {
            return Err(DataError::validation(format!(
                "unknown column '{}' on {}",
                k, table.table_name
            )));
        }
    }
    Ok(())
}

/// Multi-row INSERT ... RETURNING. Every row must carry the same columns; a single empty row
/// inserts DEFAULT VALUES.
pub fn insert(table: &TableDef, rows: &[Map<String, Value>], dialect: DialectKind) -> Result<QueryBuf> {
    let first = rows
        .first()
        .ok_or_else(|| DataError::validation("insert needs at least one row"))?;
    let columns: Vec<&String> = first.keys().collect();
    check_columns(table, columns.iter().copied())?;
    let returning = returning_list(table, dialect);
    let mut q = QueryBuf::new(dialect);
    if columns.is_empty() {
        if rows.len() > 1 {
            return Err(DataError::validation("rows without columns must be inserted one at a time"));
        }
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", qualified_table(table), returning);
        return Ok(q);
    }
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c.as_str())) {
            return Err(DataError::validation("all rows in one insert statement must have the same columns"));
        }
        let placeholders: Vec<String> = columns
            .iter()
            .map(|c| {
                let v = row.get(c.as_str()).cloned().unwrap_or(Value::Null);
                q.push_param(v, pg_cast(table, c))
            })
            .collect();
        tuples.push(format!("({})", placeholders.join(", ")));
    }
    let col_list: Vec<String> = columns.iter().map(|c| quoted(c)).collect();
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES {} RETURNING {}",
        qualified_table(table),
        col_list.join(", "),
        tuples.join(", "),
        returning
    );
    Ok(q)
}

/// UPDATE ... SET only the given columns, optional filters, RETURNING all columns.
pub fn update(
    table: &TableDef,
    data: &Map<String, Value>,
    predicate: Option<&Predicate>,
    dialect: DialectKind,
) -> Result<QueryBuf> {
    if data.is_empty() {
        return Err(DataError::validation("update needs at least one column"));
    }
    check_columns(table, data.keys())?;
    let mut q = QueryBuf::new(dialect);
    let sets: Vec<String> = data
        .iter()
        .map(|(k, v)| {
            let ph = q.push_param(v.clone(), pg_cast(table, k));
            format!("{} = {}", quoted(k), ph)
        })
        .collect();
    q.sql = format!("UPDATE {} SET {}", qualified_table(table), sets.join(", "));
    push_where(&mut q, table, predicate);
    let returning = returning_list(table, dialect);
    let _ = write!(q.sql, " RETURNING {}", returning);
    Ok(q)
}

/// DELETE ... RETURNING all columns.
pub fn delete(table: &TableDef, predicate: Option<&Predicate>, dialect: DialectKind) -> QueryBuf {
    let mut q = QueryBuf::new(dialect);
    q.sql = format!("DELETE FROM {}", qualified_table(table));
    push_where(&mut q, table, predicate);
    let returning = returning_list(table, dialect);
    let _ = write!(q.sql, " RETURNING {}", returning);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterCompiler, OrderSpec, QueryOptions, Search};
    use crate::schema::{ColumnDef, PkKind};
    use serde_json::json;

    fn people() -> TableDef {
        TableDef::new("people", "id", PkKind::BigInt)
            .column(ColumnDef::new("name", ColumnKind::String))
            .column(ColumnDef::new("age", ColumnKind::Number).with_sql_type("int4"))
            .column(ColumnDef::new("active", ColumnKind::Boolean))
            .column(ColumnDef::new("born", ColumnKind::Date))
    }

    fn compiled(search: serde_json::Value, opts: QueryOptions) -> CompiledQuery {
        let table = people();
        let search = Search::from_json(&search).unwrap();
        FilterCompiler::new(&table).compile_query(Some(&search), &opts).unwrap()
    }

    #[test]
    fn range_conjunction_renders_with_casts_on_postgres() {
        let table = people();
        let q = select(
            &table,
            &compiled(json!({"age": {"$gte": 18}}), QueryOptions::new().select(["id"])),
            DialectKind::Postgres,
        );
        assert_eq!(q.sql, r#"SELECT "id" FROM "people" WHERE "age" >= $1::int4 LIMIT 100 OFFSET 0"#);
        assert_eq!(q.params, vec![json!(18)]);
    }

    #[test]
    fn undeclared_numbers_are_projected_as_float8_on_postgres() {
        let table = TableDef::new("items", "id", PkKind::BigInt)
            .column(ColumnDef::new("price", ColumnKind::Number))
            .column(ColumnDef::new("qty", ColumnKind::Number).with_sql_type("int4"));
        let q = select(
            &table,
            &FilterCompiler::new(&table).compile_query(None, &QueryOptions::new().select(["price", "qty"])).unwrap(),
            DialectKind::Postgres,
        );
        assert!(q.sql.starts_with(r#"SELECT "price"::float8 AS "price", "qty" FROM "items""#), "{}", q.sql);
        let q = select(
            &table,
            &FilterCompiler::new(&table).compile_query(None, &QueryOptions::new().select(["price"])).unwrap(),
            DialectKind::Sqlite,
        );
        assert!(q.sql.starts_with(r#"SELECT "price" FROM"#), "{}", q.sql);
    }

    #[test]
    fn disjunction_of_conjunctions_on_sqlite() {
        let table = people();
        let opts = QueryOptions::new()
            .select(["id", "name"])
            .order_by(OrderSpec::asc("name"))
            .limit(10)
            .offset(20);
        let q = select(
            &table,
            &compiled(json!([{"name": "active"}, {"name": "pending", "active": true}]), opts),
            DialectKind::Sqlite,
        );
        assert!(q.sql.starts_with(r#"SELECT "id", "name" FROM "people" WHERE ("name" = ? OR ("#));
        assert!(q.sql.ends_with(r#" ORDER BY "name" ASC LIMIT 10 OFFSET 20"#));
        assert_eq!(q.params.len(), 3);
        assert_eq!(q.params[0], json!("active"));
    }

    #[test]
    fn like_on_non_text_columns_casts_the_column() {
        let table = people();
        let q = select(&table, &compiled(json!({"born": {"$like": "2001-%"}}), QueryOptions::new().select(["id"])), DialectKind::Postgres);
        assert!(q.sql.contains(r#"CAST("born" AS TEXT) LIKE $1::text"#));
    }

    #[test]
    fn in_between_and_null_render() {
        let table = people();
        let mut q = QueryBuf::new(DialectKind::Postgres);
        let p = Predicate::And(vec![
            Predicate::In { column: "age".into(), values: vec![json!(1), json!(2)], negated: true },
            Predicate::Between { column: "age".into(), low: json!(3), high: json!(4), negated: false },
            Predicate::Null { column: "name".into(), negated: true },
        ]);
        assert_eq!(
            write_predicate(&mut q, &table, &p),
            r#"("age" NOT IN ($1::int4, $2::int4) AND "age" BETWEEN $3::int4 AND $4::int4 AND "name" IS NOT NULL)"#
        );
        assert_eq!(q.params, vec![json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn insert_batches_rows_with_the_same_columns() {
        let table = people();
        let rows: Vec<Map<String, Value>> = vec![
            json!({"name": "ada", "age": 36}).as_object().unwrap().clone(),
            json!({"name": "alan", "age": 41}).as_object().unwrap().clone(),
        ];
        let q = insert(&table, &rows, DialectKind::Sqlite).unwrap();
        assert!(q.sql.starts_with(r#"INSERT INTO "people" ("#));
        assert!(q.sql.contains("VALUES (?, ?), (?, ?) RETURNING"));
        assert_eq!(q.params.len(), 4);

        let mixed = vec![rows[0].clone(), json!({"name": "x"}).as_object().unwrap().clone()];
        assert!(insert(&table, &mixed, DialectKind::Sqlite).is_err());
        let unknown = vec![json!({"password": "x"}).as_object().unwrap().clone()];
        assert!(insert(&table, &unknown, DialectKind::Sqlite).is_err());
    }

    #[test]
    fn update_and_delete_bind_set_values_before_filters() {
        let table = people();
        let pred = Predicate::Compare { column: "id".into(), op: crate::filter::CmpOp::Eq, value: json!(7) };
        let data = json!({"name": "ada"}).as_object().unwrap().clone();
        let q = update(&table, &data, Some(&pred), DialectKind::Postgres).unwrap();
        assert!(q.sql.starts_with(r#"UPDATE "people" SET "name" = $1::text WHERE "id" = $2::int8 RETURNING"#));
        assert_eq!(q.params, vec![json!("ada"), json!(7)]);
        assert!(update(&table, &Map::new(), Some(&pred), DialectKind::Postgres).is_err());

        let q = delete(&table, Some(&pred), DialectKind::Sqlite);
        assert!(q.sql.starts_with(r#"DELETE FROM "people" WHERE "id" = ? RETURNING"#));
    }

    #[test]
    fn schema_qualified_tables_and_count() {
        let table = people().in_schema("app");
        let q = count(&table, None, DialectKind::Postgres);
        assert_eq!(q.sql, r#"SELECT COUNT(*) AS "count" FROM "app"."people""#);
    }
}
