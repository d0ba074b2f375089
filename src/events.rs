//! Per-table event channels: repositories emit one event per executed statement.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&TableEvent) -> Result<(), BoxError> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Selected,
    Inserted,
    Updated,
    Deleted,
}

#[derive(Clone, Debug, Serialize)]
pub struct TableEvent {
    pub kind: EventKind,
    pub connection: String,
    pub table: String,
    /// Every table the statement touched.
    pub tables: Vec<String>,
    pub sql: String,
    pub params: Vec<Value>,
    pub correlation_id: Uuid,
    pub row_count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Subscriber {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

pub struct TableEventChannel {
    table: String,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl TableEventChannel {
    pub fn new(table: impl Into<String>) -> Self {
        TableEventChannel {
            table: table.into(),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&TableEvent) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                kind,
                handler: Arc::new(handler),
            });
        SubscriptionToken(id)
    }

    /// Returns false when the token was not (or no longer) subscribed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != token.0);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Deliver to every subscriber of `event.kind`. Failing or panicking handlers are logged
    /// and skipped.
    pub fn emit(&self, event: &TableEvent) {
        let handlers: Vec<(u64, Handler)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind == event.kind)
            .map(|s| (s.id, s.handler.clone()))
            .collect();
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    table = %self.table,
                    subscriber = id,
                    correlation_id = %event.correlation_id,
                    error = %e,
                    "event subscriber failed"
                ),
                Err(_) => tracing::warn!(
                    table = %self.table,
                    subscriber = id,
                    correlation_id = %event.correlation_id,
                    "event subscriber panicked"
                ),
            }
        }
    }
}

/// Lazily created channels for one connection, keyed by table name.
#[derive(Default)]
pub struct EventHub {
    channels: RwLock<HashMap<String, Arc<TableEventChannel>>>,
}

impl EventHub {
    pub fn channel(&self, table: &str) -> Arc<TableEventChannel> {
        if let Some(ch) = self.channels.read().unwrap_or_else(PoisonError::into_inner).get(table) {
            return ch.clone();
        }
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(TableEventChannel::new(table)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(kind: EventKind) -> TableEvent {
        TableEvent {
            kind,
            connection: "main".into(),
            table: "users".into(),
            tables: vec!["users".into()],
            sql: "SELECT 1".into(),
            params: vec![],
            correlation_id: Uuid::new_v4(),
            row_count: 0,
        }
    }

    #[test]
    fn delivers_by_kind_and_survives_bad_handlers() {
        let ch = TableEventChannel::new("users");
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        ch.subscribe(EventKind::Inserted, |_| Err("boom".into()));
        ch.subscribe(EventKind::Inserted, |_| panic!("subscriber bug"));
        ch.subscribe(EventKind::Inserted, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        ch.emit(&event(EventKind::Inserted));
        ch.emit(&event(EventKind::Deleted));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let ch = TableEventChannel::new("users");
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let token = ch.subscribe(EventKind::Selected, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(ch.unsubscribe(token));
        assert!(!ch.unsubscribe(token));
        ch.emit(&event(EventKind::Selected));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(ch.subscriber_count(), 0);
    }

    #[test]
    fn hub_reuses_channels() {
        let hub = EventHub::default();
        assert!(Arc::ptr_eq(&hub.channel("a"), &hub.channel("a")));
        assert!(!Arc::ptr_eq(&hub.channel("a"), &hub.channel("b")));
    }
}
