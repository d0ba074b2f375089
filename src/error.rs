//! Typed errors for the data-access core, plus the HTTP mapping used by axum collaborators.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = DataError> = std::result::Result<T, E>;

/// Errors raised while reading connection settings from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    Missing(String),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum DataError {
    /// Malformed filter, operator, projection, ordering or pagination input.
    #[error("validation: {0}")]
    Validation(String),
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] sqlx::Error),
    #[error("row decode failed: {0}")]
    RowDecode(#[from] serde_json::Error),
    #[error("no {table} row was created")]
    ModelNotCreated { table: String },
    #[error("no {table} row was found")]
    ModelNotFound { table: String },
    #[error("no {table} row was updated")]
    ModelNotUpdated { table: String },
    #[error("no {table} row was deleted")]
    ModelNotDeleted { table: String },
    #[error("refusing to delete from {table} without a search")]
    CrudDeleteNoSearch { table: String },
    #[error("database not connected: {0}")]
    DatabaseNotConnected(String),
    #[error("database already registered: {0}")]
    DatabaseAlreadyRegistered(String),
    #[error("database not registered: {0}")]
    DatabaseNotRegistered(String),
    #[error("invalid database type: {0}")]
    DatabaseInvalidType(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DataError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        DataError::Validation(msg.into())
    }

    /// Stable, machine-readable error key.
    pub fn key(&self) -> &'static str {
        match self {
            DataError::Validation(_) => "validation_error",
            DataError::DatabaseQuery(_) => "database_query_error",
            DataError::RowDecode(_) => "row_decode_error",
            DataError::ModelNotCreated { .. } => "model_not_created",
            DataError::ModelNotFound { .. } => "model_not_found",
            DataError::ModelNotUpdated { .. } => "model_not_updated",
            DataError::ModelNotDeleted { .. } => "model_not_deleted",
            DataError::CrudDeleteNoSearch { .. } => "crud_delete_no_search",
            DataError::DatabaseNotConnected(_) => "database_not_connected",
            DataError::DatabaseAlreadyRegistered(_) => "database_already_registered",
            DataError::DatabaseNotRegistered(_) => "database_not_registered",
            DataError::DatabaseInvalidType(_) => "database_invalid_type",
            DataError::BadRequest(_) => "bad_request",
            DataError::Config(_) => "config_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DataError::Validation(_) | DataError::ModelNotCreated { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DataError::ModelNotFound { .. }
            | DataError::ModelNotUpdated { .. }
            | DataError::ModelNotDeleted { .. }
            | DataError::DatabaseNotRegistered(_) => StatusCode::NOT_FOUND,
            DataError::CrudDeleteNoSearch { .. }
            | DataError::DatabaseInvalidType(_)
            | DataError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DataError::DatabaseAlreadyRegistered(_) => StatusCode::CONFLICT,
            DataError::DatabaseNotConnected(_) => StatusCode::SERVICE_UNAVAILABLE,
            DataError::DatabaseQuery(_) | DataError::RowDecode(_) | DataError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for DataError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Driver messages can leak schema details; keep them in the logs.
        let message = match &self {
            DataError::DatabaseQuery(e) => {
                tracing::error!(error = %e, "database query failed");
                "database query failed".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.key().to_string(),
                message,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_and_statuses_line_up() {
        let err = DataError::CrudDeleteNoSearch { table: "users".into() };
        assert_eq!(err.key(), "crud_delete_no_search");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "refusing to delete from users without a search");

        let err = DataError::DatabaseAlreadyRegistered("primary".into());
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn query_errors_keep_their_cause() {
        use std::error::Error as _;
        let err = DataError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.key(), "database_query_error");
        assert!(err.source().is_some());
    }
}
