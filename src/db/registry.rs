use super::dialect::DialectKind;
use super::handle::ConnectionHandle;
use crate::config::ConnectionConfig;
use crate::error::{ConfigError, DataError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

/// Registry name for a dynamically provisioned database.
pub fn dynamic_name(key: &str) -> String {
    format!("database:{}", key)
}

fn dynamic_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,63}$").expect("static pattern"))
}

struct DynamicSource {
    dialect: DialectKind,
    base: ConnectionConfig,
}

/// Named connections. Construct one per process (or per test) and share it as `Arc<DatabaseRegistry>`.
#[derive(Default)]
pub struct DatabaseRegistry {
    entries: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
    dynamic: Option<DynamicSource>,
    provisioning: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that can provision `database:<key>` entries on first use, each one the base
    /// settings pointed at database `key`.
    pub fn with_dynamic(dialect: DialectKind, base: ConnectionConfig) -> Self {
        DatabaseRegistry {
            dynamic: Some(DynamicSource { dialect, base }),
            ..Self::default()
        }
    }

    /// Register without connecting. `dialect` is a name such as `postgres` or `sqlite`.
    pub fn register(&self, name: &str, dialect: &str, config: ConnectionConfig) -> Result<Arc<ConnectionHandle>> {
        self.register_kind(name, dialect.parse()?, config)
    }

    pub fn register_kind(
        &self,
        name: &str,
        dialect: DialectKind,
        config: ConnectionConfig,
    ) -> Result<Arc<ConnectionHandle>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(name) {
            return Err(DataError::DatabaseAlreadyRegistered(name.to_string()));
        }
        let handle = Arc::new(ConnectionHandle::new(name, dialect, config));
        entries.insert(name.to_string(), handle.clone());
        tracing::info!(connection = %name, %dialect, "database registered");
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Result<Arc<ConnectionHandle>> {
        self.lookup(name)
            .ok_or_else(|| DataError::DatabaseNotRegistered(name.to_string()))
    }

    fn lookup(&self, name: &str) -> Option<Arc<ConnectionHandle>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub async fn connect(&self, name: &str) -> Result<Arc<ConnectionHandle>> {
        let handle = self.get(name)?;
        handle.connect().await?;
        Ok(handle)
    }

    pub async fn disconnect(&self, name: &str) -> Result<()> {
        self.get(name)?.disconnect().await;
        Ok(())
    }

    /// False for unknown names.
    pub fn is_connected(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|h| h.is_connected())
    }

    /// Remove the entry, closing its pool if it was connected. Waits for any in-flight dynamic
    /// provisioning of the same name.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        let gate = self.gate(name);
        let result = {
            let _guard = gate.lock().await;
            self.remove_entry(name).await
        };
        self.release_gate(name, gate);
        result
    }

    async fn remove_entry(&self, name: &str) -> Result<()> {
        let handle = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| DataError::DatabaseNotRegistered(name.to_string()))?;
        handle.disconnect().await;
        tracing::info!(connection = %name, "database unregistered");
        Ok(())
    }

    /// Per-name lock shared by dynamic provisioning and `unregister`.
    fn gate(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.provisioning
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Drop the gate once no other task holds or waits on it.
    fn release_gate(&self, name: &str, gate: Arc<tokio::sync::Mutex<()>>) {
        let mut gates = self.provisioning.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&gate) == 2 {
            gates.remove(name);
        }
    }

    /// Registered names, sorted.
    pub fn registry(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn handles(&self) -> Vec<Arc<ConnectionHandle>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Connected handle for `database:<key>`, registering and connecting it on first use.
    /// Concurrent first calls for the same key provision a single connection.
    pub async fn resolve_dynamic(&self, key: &str) -> Result<Arc<ConnectionHandle>> {
        if !dynamic_key_re().is_match(key) {
            return Err(DataError::BadRequest(format!("invalid database key '{}'", key)));
        }
        let name = dynamic_name(key);
        if let Some(handle) = self.lookup(&name).filter(|h| h.is_connected()) {
            return Ok(handle);
        }
        let source = self
            .dynamic
            .as_ref()
            .ok_or_else(|| ConfigError::Missing("dynamic database base settings".into()))?;

        let gate = self.gate(&name);
        let result = {
            let _guard = gate.lock().await;
            self.provision(&name, key, source).await
        };
        self.release_gate(&name, gate);
        result
    }

    async fn provision(&self, name: &str, key: &str, source: &DynamicSource) -> Result<Arc<ConnectionHandle>> {
        if let Some(handle) = self.lookup(name) {
            handle.connect().await?;
            return Ok(handle);
        }
        let handle = self.register_kind(name, source.dialect, source.base.with_database(key))?;
        if let Err(e) = handle.connect().await {
            self.entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(name);
            tracing::warn!(connection = %name, error = %e, "dynamic database provisioning failed");
            return Err(e);
        }
        Ok(handle)
    }

    /// Close every live pool; entries stay registered.
    pub async fn disconnect_all(&self) {
        for handle in self.handles() {
            handle.disconnect().await;
        }
    }
}
