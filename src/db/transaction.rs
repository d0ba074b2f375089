use super::dialect::DbTransaction;
use crate::error::{DataError, Result};
use crate::sql::{QueryBuf, Row};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A caller-owned transaction. Clones share the same underlying transaction; the
/// repository only runs statements in it and never commits or rolls back on its own.
#[derive(Clone)]
pub struct TransactionHandle {
    connection: String,
    id: Uuid,
    inner: Arc<Mutex<Option<DbTransaction>>>,
}

impl TransactionHandle {
    pub(crate) fn new(connection: &str, tx: DbTransaction) -> Self {
        TransactionHandle {
            connection: connection.to_string(),
            id: Uuid::new_v4(),
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Name of the connection this transaction was opened on.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn commit(&self) -> Result<()> {
        let tx = self.inner.lock().await.take().ok_or_else(|| self.finished())?;
        tx.commit().await?;
        tracing::debug!(connection = %self.connection, transaction = %self.id, "committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<()> {
        let tx = self.inner.lock().await.take().ok_or_else(|| self.finished())?;
        tx.rollback().await?;
        tracing::debug!(connection = %self.connection, transaction = %self.id, "rolled back");
        Ok(())
    }

    pub(crate) async fn fetch(&self, q: &QueryBuf) -> Result<Vec<Row>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(|| self.finished())?;
        tx.fetch(q).await
    }

    fn finished(&self) -> DataError {
        DataError::validation(format!("transaction {} is already finished", self.id))
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("connection", &self.connection)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
