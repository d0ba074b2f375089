#![allow(dead_code)]

use std::sync::Arc;
use tessera_sdk::db::DbPool;
use tessera_sdk::{
    ColumnDef, ColumnKind, ConnectionConfig, ConnectionHandle, DatabaseRegistry, DialectKind, PkKind, Repository,
    TableDef,
};

pub const PEOPLE_DDL: &str = "CREATE TABLE people (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER,
    active INTEGER NOT NULL DEFAULT 1,
    born TEXT
)";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tessera_sdk=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Private in-memory database; one connection keeps it alive.
pub fn memory() -> ConnectionConfig {
    ConnectionConfig::from_url("sqlite::memory:").with_max_connections(1)
}

pub fn people_table() -> TableDef {
    TableDef::new("people", "id", PkKind::BigInt)
        .column(ColumnDef::new("name", ColumnKind::String))
        .column(ColumnDef::new("age", ColumnKind::Number))
        .column(ColumnDef::new("active", ColumnKind::Boolean))
        .column(ColumnDef::new("born", ColumnKind::Date))
}

pub async fn execute(handle: &ConnectionHandle, ddl: &str) {
    match handle.pool().unwrap() {
        DbPool::Sqlite(pool) => {
            sqlx::query(ddl).execute(&pool).await.unwrap();
        }
        DbPool::Postgres(_) => panic!("tests run on sqlite"),
    }
}

/// Registry with a connected `main` database holding an empty `people` table.
pub async fn setup() -> (Arc<DatabaseRegistry>, Repository) {
    init_tracing();
    let registry = Arc::new(DatabaseRegistry::with_dynamic(DialectKind::Sqlite, memory()));
    registry.register("main", "sqlite", memory()).unwrap();
    let handle = registry.connect("main").await.unwrap();
    execute(&handle, PEOPLE_DDL).await;
    let repo = Repository::from_registry(&registry, "main", people_table()).unwrap();
    (registry, repo)
}
