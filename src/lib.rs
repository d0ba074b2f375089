//! Tessera SDK: filter compiler, generic repository and connection registry over sqlx pools.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extractors;
pub mod filter;
pub mod repository;
pub mod routes;
pub mod schema;
pub mod sql;
pub mod state;

pub use config::ConnectionConfig;
pub use db::{ConnectionHandle, DatabaseRegistry, DialectKind, TransactionHandle};
pub use error::{ConfigError, DataError, Result};
pub use events::{EventKind, SubscriptionToken, TableEvent, TableEventChannel};
pub use extractors::{DatabaseKey, TenantConnection, DATABASE_HEADER};
pub use filter::{
    FieldFilter, FilterExpression, FreeText, MutationOptions, Operator, OrderSpec, QueryOptions, Search, SearchQuery,
    Selection,
};
pub use repository::Repository;
pub use routes::common_routes;
pub use schema::{ColumnDef, ColumnKind, PkKind, TableDef};
pub use state::AppState;
