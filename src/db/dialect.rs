//! Supported dialects and the pool each one is backed by.

use crate::config::ConnectionConfig;
use crate::error::{DataError, Result};
use crate::sql::params::{bind_pg, bind_sqlite};
use crate::sql::rows::{pg_row_to_json, sqlite_row_to_json};
use crate::sql::{QueryBuf, Row};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DialectKind {
    Postgres,
    Sqlite,
}

impl DialectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            other => Err(DataError::DatabaseInvalidType(other.to_string())),
        }
    }
}

/// A live pool, tagged by dialect.
#[derive(Clone, Debug)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// An open transaction on one pool.
pub(crate) enum DbTransaction {
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
    Sqlite(sqlx::Transaction<'static, sqlx::Sqlite>),
}

impl DbPool {
    pub fn dialect(&self) -> DialectKind {
        match self {
            DbPool::Postgres(_) => DialectKind::Postgres,
            DbPool::Sqlite(_) => DialectKind::Sqlite,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::Postgres(p) => p.is_closed(),
            DbPool::Sqlite(p) => p.is_closed(),
        }
    }

    pub async fn close(&self) {
        match self {
            DbPool::Postgres(p) => p.close().await,
            DbPool::Sqlite(p) => p.close().await,
        }
    }

    pub(crate) async fn fetch(&self, q: &QueryBuf) -> Result<Vec<Row>> {
        match self {
            DbPool::Postgres(pool) => {
                let rows = bind_pg(sqlx::query(&q.sql), &q.params)?.fetch_all(pool).await?;
                Ok(rows.iter().map(pg_row_to_json).collect())
            }
            DbPool::Sqlite(pool) => {
                let rows = bind_sqlite(sqlx::query(&q.sql), &q.params)?.fetch_all(pool).await?;
                Ok(rows.iter().map(sqlite_row_to_json).collect())
            }
        }
    }

    pub(crate) async fn ping(&self) -> Result<()> {
        match self {
            DbPool::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ())?,
            DbPool::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ())?,
        }
        Ok(())
    }

    pub(crate) async fn begin(&self) -> Result<DbTransaction> {
        Ok(match self {
            DbPool::Postgres(pool) => DbTransaction::Postgres(pool.begin().await?),
            DbPool::Sqlite(pool) => DbTransaction::Sqlite(pool.begin().await?),
        })
    }
}

impl DbTransaction {
    pub(crate) async fn fetch(&mut self, q: &QueryBuf) -> Result<Vec<Row>> {
        match self {
            DbTransaction::Postgres(tx) => {
                let rows = bind_pg(sqlx::query(&q.sql), &q.params)?.fetch_all(&mut **tx).await?;
                Ok(rows.iter().map(pg_row_to_json).collect())
            }
            DbTransaction::Sqlite(tx) => {
                let rows = bind_sqlite(sqlx::query(&q.sql), &q.params)?.fetch_all(&mut **tx).await?;
                Ok(rows.iter().map(sqlite_row_to_json).collect())
            }
        }
    }

    pub(crate) async fn commit(self) -> Result<()> {
        match self {
            DbTransaction::Postgres(tx) => tx.commit().await?,
            DbTransaction::Sqlite(tx) => tx.commit().await?,
        }
        Ok(())
    }

    pub(crate) async fn rollback(self) -> Result<()> {
        match self {
            DbTransaction::Postgres(tx) => tx.rollback().await?,
            DbTransaction::Sqlite(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}

fn pg_options(config: &ConnectionConfig) -> Result<PgConnectOptions> {
    let mut opts = match &config.url {
        Some(url) => PgConnectOptions::from_str(url)?,
        None => PgConnectOptions::new(),
    };
    if let Some(host) = &config.host {
        opts = opts.host(host);
    }
    if let Some(port) = config.port {
        opts = opts.port(port);
    }
    if let Some(user) = &config.username {
        opts = opts.username(user);
    }
    if let Some(password) = &config.password {
        opts = opts.password(password);
    }
    if let Some(db) = &config.database {
        opts = opts.database(db);
    }
    Ok(opts)
}

fn sqlite_file(db: &str) -> String {
    if db.contains('.') {
        db.to_string()
    } else {
        format!("{}.db", db)
    }
}

fn sqlite_options(config: &ConnectionConfig) -> Result<SqliteConnectOptions> {
    if config.is_in_memory() {
        return Ok(SqliteConnectOptions::from_str("sqlite::memory:")?);
    }
    let opts = match (&config.database, &config.url) {
        // Sibling file of the base database.
        (Some(db), Some(url)) => {
            let base = SqliteConnectOptions::from_str(url)?;
            let dir = base.get_filename().parent().map(Path::to_path_buf).unwrap_or_default();
            base.filename(dir.join(sqlite_file(db)))
        }
        (Some(db), None) => SqliteConnectOptions::new().filename(sqlite_file(db)),
        (None, Some(url)) => SqliteConnectOptions::from_str(url)?,
        (None, None) => {
            return Err(DataError::validation("sqlite connection needs a url or a database file"));
        }
    };
    Ok(opts.create_if_missing(true))
}

/// Build and open a pool for the given dialect.
pub(crate) async fn connect(dialect: DialectKind, config: &ConnectionConfig) -> Result<DbPool> {
    let acquire = Duration::from_secs(config.acquire_timeout_secs);
    match dialect {
        DialectKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(acquire)
                .connect_with(pg_options(config)?)
                .await?;
            Ok(DbPool::Postgres(pool))
        }
        DialectKind::Sqlite => {
            let mut pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(acquire);
            if config.is_in_memory() {
                // An in-memory database lives only as long as one of its connections.
                pool = pool.idle_timeout(None).max_lifetime(None);
            }
            Ok(DbPool::Sqlite(pool.connect_with(sqlite_options(config)?).await?))
        }
    }
}
