//! Resolve the request's database from the `X-Database` header.

use crate::db::ConnectionHandle;
use crate::error::DataError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;

/// Header naming the database (tenant) a request targets.
pub const DATABASE_HEADER: &str = "X-Database";

/// Raw key from `X-Database`. Missing or blank headers are rejected with 400.
#[derive(Clone, Debug)]
pub struct DatabaseKey(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for DatabaseKey
where
    S: Send + Sync,
{
    type Rejection = DataError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(DATABASE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(DatabaseKey)
            .ok_or_else(|| DataError::BadRequest(format!("missing {} header", DATABASE_HEADER)))
    }
}

/// Connected handle for the request's database, provisioned on first use.
#[derive(Clone, Debug)]
pub struct TenantConnection(pub Arc<ConnectionHandle>);

#[async_trait]
impl<S> FromRequestParts<S> for TenantConnection
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = DataError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let DatabaseKey(key) = DatabaseKey::from_request_parts(parts, state).await?;
        let app = AppState::from_ref(state);
        let handle = app.registry.resolve_dynamic(&key).await?;
        Ok(TenantConnection(handle))
    }
}
