mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tessera_sdk::{common_routes, AppState, DatabaseRegistry, DialectKind, TenantConnection, DATABASE_HEADER};
use tower::ServiceExt;

async fn whoami(TenantConnection(handle): TenantConnection) -> String {
    handle.name().to_string()
}

fn app() -> Router {
    let registry = Arc::new(DatabaseRegistry::with_dynamic(DialectKind::Sqlite, common::memory()));
    Router::new()
        .route("/whoami", get(whoami))
        .with_state(AppState::new(registry))
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_database_header_is_a_bad_request() {
    let resp = app()
        .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn invalid_database_key_is_a_bad_request() {
    let req = Request::builder()
        .uri("/whoami")
        .header(DATABASE_HEADER, "../../etc")
        .body(Body::empty())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn header_selects_the_tenant_database() {
    let req = Request::builder()
        .uri("/whoami")
        .header(DATABASE_HEADER, " acme ")
        .body(Body::empty())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"database:acme");
}

#[tokio::test]
async fn readiness_reports_connected_databases() {
    let registry = Arc::new(DatabaseRegistry::new());
    registry.register("main", "sqlite", common::memory()).unwrap();
    registry.register("idle", "sqlite", common::memory()).unwrap();
    registry.connect("main").await.unwrap();
    let app = common_routes(AppState::new(registry));

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["databases"]["main"], "ok");
    assert!(body["databases"].get("idle").is_none());

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
