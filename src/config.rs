//! Connection settings: serde-deserializable, or read from `<PREFIX>_*` environment variables.

use crate::db::DialectKind;
use crate::error::{ConfigError, DataError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_acquire_timeout() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}

/// Either a full `url`, or discrete parts. When both are present the discrete
/// `database` overrides the one in the url.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl ConnectionConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        ConnectionConfig {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Same server and credentials, different database. In-memory SQLite bases stay in memory:
    /// every pool built from them is its own private database.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        let mut next = self.clone();
        if !self.is_in_memory() {
            next.database = Some(database.into());
        }
        next
    }

    pub fn is_in_memory(&self) -> bool {
        self.url
            .as_deref()
            .is_some_and(|u| u.contains(":memory:") || u.contains("mode=memory"))
    }

    /// Read `<PREFIX>_URL` or `<PREFIX>_HOST`/`_PORT`/`_USER`/`_PASSWORD`/`_NAME`, plus
    /// `_MAX_CONNECTIONS`, `_MIN_CONNECTIONS` and `_ACQUIRE_TIMEOUT_SECS`.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{}_{}", prefix, suffix);
            lookup(&key).filter(|v| !v.trim().is_empty()).map(|v| (key, v))
        };
        let url = get("URL").map(|(_, v)| v);
        let host = get("HOST").map(|(_, v)| v);
        if url.is_none() && host.is_none() {
            return Err(ConfigError::Missing(format!("{}_URL", prefix)));
        }
        Ok(ConnectionConfig {
            url,
            host,
            port: parse_opt(get("PORT"))?,
            username: get("USER").map(|(_, v)| v),
            password: get("PASSWORD").map(|(_, v)| v),
            database: get("NAME").map(|(_, v)| v),
            max_connections: parse_opt(get("MAX_CONNECTIONS"))?.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            min_connections: parse_opt(get("MIN_CONNECTIONS"))?.unwrap_or(0),
            acquire_timeout_secs: parse_opt(get("ACQUIRE_TIMEOUT_SECS"))?.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        })
    }
}

fn parse_opt<T: FromStr>(entry: Option<(String, String)>) -> Result<Option<T>, ConfigError> {
    match entry {
        None => Ok(None),
        Some((key, value)) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// `DATABASE_DIALECT`, defaulting to postgres.
pub fn dialect_from_env() -> Result<DialectKind, DataError> {
    std::env::var("DATABASE_DIALECT")
        .unwrap_or_else(|_| "postgres".into())
        .parse()
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => format!("{}://***@{}", &url[..scheme], &url[at + 1..]),
        _ => url.to_string(),
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url.as_deref().map(redact_url))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}
