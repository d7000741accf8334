//! Axum server wiring: shared state, route table, listener.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::storage::Store;

/// Maximum accepted upload size.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Shared state for all handlers: the single process-wide store lock.
///
/// Every cache-touching operation (upload, download, add-alias, dump, and
/// the maintenance pass) acquires `store` on entry and holds it across its
/// filesystem work, so effective concurrency on the cache is one. Request
/// bodies are buffered by the extractor before the lock is taken.
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
}

impl AppState {
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/help", get(super::routes::help::get_help))
        .route(
            "/products/metadata",
            get(super::routes::products::dump_metadata),
        )
        .route(
            "/products/{product}/{version}/{platform}/{key}",
            post(super::routes::products::upload).get(super::routes::products::download),
        )
        .route(
            "/products/{product}/{version}/{platform}/{key}/add_alias/{key_alias}",
            post(super::routes::products::add_alias),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listener and serve until the process is stopped.
pub async fn start_server(
    port: u16,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("files caching server listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
