pub mod database;

pub use database::{DatabaseKey, TenantConnection, DATABASE_HEADER};
