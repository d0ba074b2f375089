//! Common routes: health, readiness, version.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    databases: BTreeMap<String, &'static str>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// Pings every connected database; 503 if any of them fails.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let mut databases = BTreeMap::new();
    for handle in state.registry.handles() {
        if !handle.is_connected() {
            continue;
        }
        let status = match handle.ping().await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::warn!(connection = %handle.name(), error = %e, "readiness ping failed");
                "unavailable"
            }
        };
        databases.insert(handle.name().to_string(), status);
    }
    if databases.values().any(|s| *s != "ok") {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                databases,
            }),
        );
    }
    (StatusCode::OK, Json(ReadyBody { status: "ok", databases }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /ready, GET /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
