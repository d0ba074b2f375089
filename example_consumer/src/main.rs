//! Example consumer: a small notes service where every request picks its tenant database
//! through the `X-Database` header.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Settings come from `DATABASE_*` variables (a `.env` file is loaded if present), e.g.
//! `DATABASE_URL=postgres://localhost/app` and optionally `DATABASE_DIALECT=sqlite`.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tessera_sdk::{
    common_routes, config::dialect_from_env, AppState, ColumnDef, ColumnKind, ConnectionConfig, DataError,
    DatabaseRegistry, MutationOptions, PkKind, QueryOptions, Repository, Search, TableDef, TenantConnection,
};
use tokio::net::TcpListener;

fn notes_table() -> TableDef {
    TableDef::new("notes", "id", PkKind::BigInt)
        .column(ColumnDef::new("title", ColumnKind::String))
        .column(ColumnDef::new("body", ColumnKind::String))
        .column(ColumnDef::new("pinned", ColumnKind::Boolean))
        .column(ColumnDef::new("created_at", ColumnKind::Date))
}

#[derive(Deserialize)]
struct ListParams {
    /// JSON search, e.g. `{"pinned":true}` or `[{"title":{"$like":"a%"}},{"$q":"todo"}]`.
    filter: Option<String>,
    /// JSON query options, e.g. `{"orderBy":{"selectedField":"created_at","direction":"desc"},"limit":20}`.
    options: Option<String>,
}

fn parse_json(raw: Option<&str>) -> Result<Option<Value>, DataError> {
    raw.map(|s| serde_json::from_str(s).map_err(|e| DataError::BadRequest(e.to_string())))
        .transpose()
}

async fn list_notes(
    TenantConnection(handle): TenantConnection,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Value>>, DataError> {
    let search = match parse_json(params.filter.as_deref())? {
        Some(v) => Search::from_json(&v)?,
        None => Search::Many(Vec::new()),
    };
    let opts = match parse_json(params.options.as_deref())? {
        Some(v) => QueryOptions::from_json(v)?,
        None => QueryOptions::new(),
    };
    let repo: Repository = Repository::new(handle, notes_table());
    Ok(Json(repo.find(search, &opts).await?))
}

async fn create_notes(
    TenantConnection(handle): TenantConnection,
    Json(body): Json<Value>,
) -> Result<Json<Vec<Value>>, DataError> {
    let repo: Repository = Repository::new(handle, notes_table());
    Ok(Json(repo.insert(body, &MutationOptions::new().throw_if_no_result()).await?))
}

async fn list_databases(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({ "databases": state.registry.registry() }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tessera_sdk=info,example_consumer=info")),
        )
        .init();

    let dialect = dialect_from_env()?;
    let base = ConnectionConfig::from_env("DATABASE")?;
    let registry = Arc::new(DatabaseRegistry::with_dynamic(dialect, base.clone()));
    registry.register_kind("primary", dialect, base)?;
    registry.connect("primary").await?;

    let state = AppState::new(registry.clone());
    let app = Router::new()
        .route("/notes", get(list_notes).post(create_notes))
        .route("/databases", get(list_databases))
        .with_state(state.clone())
        .merge(common_routes(state));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    registry.disconnect_all().await;
    Ok(())
}
