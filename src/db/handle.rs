use super::dialect::{self, DbPool, DialectKind};
use super::transaction::TransactionHandle;
use crate::config::ConnectionConfig;
use crate::error::{DataError, Result};
use crate::events::{EventHub, TableEventChannel};
use crate::sql::{QueryBuf, Row};
use std::sync::{Arc, PoisonError, RwLock};

/// One named database: its dialect, settings, pool (once connected) and table event channels.
pub struct ConnectionHandle {
    name: String,
    dialect: DialectKind,
    config: ConnectionConfig,
    pool: RwLock<Option<DbPool>>,
    events: EventHub,
}

impl ConnectionHandle {
    pub fn new(name: impl Into<String>, dialect: DialectKind, config: ConnectionConfig) -> Self {
        ConnectionHandle {
            name: name.into(),
            dialect,
            config,
            pool: RwLock::new(None),
            events: EventHub::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> DialectKind {
        self.dialect
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open the pool. Connecting an already connected handle is a no-op.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let pool = dialect::connect(self.dialect, &self.config).await?;
        let surplus = {
            let mut slot = self.pool.write().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(existing) if !existing.is_closed() => Some(pool),
                _ => {
                    *slot = Some(pool);
                    None
                }
            }
        };
        // Lost a race with a concurrent connect.
        if let Some(pool) = surplus {
            pool.close().await;
            return Ok(());
        }
        tracing::info!(connection = %self.name, dialect = %self.dialect, "database connected");
        Ok(())
    }

    pub async fn disconnect(&self) {
        let pool = self.pool.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!(connection = %self.name, "database disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|p| !p.is_closed())
    }

    pub fn pool(&self) -> Result<DbPool> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|p| !p.is_closed())
            .ok_or_else(|| DataError::DatabaseNotConnected(self.name.clone()))
    }

    pub async fn begin(&self) -> Result<TransactionHandle> {
        let tx = self.pool()?.begin().await?;
        Ok(TransactionHandle::new(&self.name, tx))
    }

    pub async fn ping(&self) -> Result<()> {
        self.pool()?.ping().await
    }

    /// Event channel for one table on this connection.
    pub fn events(&self, table: &str) -> Arc<TableEventChannel> {
        self.events.channel(table)
    }

    /// Run a statement on the pool, or inside `tx` when given.
    pub(crate) async fn fetch(&self, q: &QueryBuf, tx: Option<&TransactionHandle>) -> Result<Vec<Row>> {
        match tx {
            Some(tx) if tx.connection() != self.name => Err(DataError::validation(format!(
                "transaction belongs to connection '{}', not '{}'",
                tx.connection(),
                self.name
            ))),
            Some(tx) => tx.fetch(q).await,
            None => self.pool()?.fetch(q).await,
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("connected", &self.is_connected())
            .finish()
    }
}
