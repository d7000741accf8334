//! Product routes: upload, download, alias creation, metadata dump.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::api::server::AppState;
use crate::error::CacheError;

/// POST /products/{product}/{version}/{platform}/{key} — store a new entry.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Path((product, version, platform, key)): Path<(String, String, String, String)>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    info!("the product {product}/{version}/{platform} is posted");
    let now = Local::now().naive_local();

    let result = state
        .store
        .lock()
        .await
        .insert(&product, &platform, &version, &key, &body, now);

    match result {
        Ok(()) => {
            info!("the product {product}/{version}/{platform} has been saved");
            (
                StatusCode::CREATED,
                Json(json!({
                    "message": format!(
                        "The product {product}/{version}/{platform} has been uploaded successfully"
                    )
                })),
            )
        }
        Err(CacheError::AlreadyExists(_)) => {
            info!("cannot add data: the product {product}/{version}/{platform} exists");
            (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": format!("The product {product}/{version}/{platform} already exists")
                })),
            )
        }
        Err(err) => {
            error!(error = %err, "failed to store {product}/{version}/{platform}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal storage error" })),
            )
        }
    }
}

/// GET /products/{product}/{version}/{platform}/{key} — fetch an entry.
///
/// Resolution follows one alias hop; a hit credits the canonical entry's
/// usage before the body is returned.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((product, version, platform, key)): Path<(String, String, String, String)>,
) -> Response {
    info!("the product {product}/{version}/{platform} is requested");
    let now = Local::now().naive_local();

    let result = state
        .store
        .lock()
        .await
        .fetch(&product, &platform, &version, &key, now);

    match result {
        Ok(data) => {
            info!("sending the product {product}/{version}/{platform}");
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                data,
            )
                .into_response()
        }
        Err(CacheError::NotFound(_)) => {
            info!("cannot get {product}/{version}/{platform}, not found");
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": format!(
                        "The product {product}/{version}/{platform} is not found in the cache"
                    )
                })),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, "failed to read {product}/{version}/{platform}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal storage error" })),
            )
                .into_response()
        }
    }
}

/// POST /products/{product}/{version}/{platform}/{key}/add_alias/{key_alias}
///
/// Both preconditions report 409: a missing source and an occupied alias
/// name are each an "already decided" state for this tuple.
pub async fn add_alias(
    State(state): State<Arc<AppState>>,
    Path((product, version, platform, key, key_alias)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> (StatusCode, Json<Value>) {
    info!("an alias {key_alias} for the product {product}/{version}/{platform}/{key} is requested");

    let result = state
        .store
        .lock()
        .await
        .add_alias(&product, &platform, &version, &key, &key_alias);

    match result {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({
                "message": format!(
                    "The alias {key_alias} for the product {product}/{version}/{platform} has been created successfully"
                )
            })),
        ),
        Err(CacheError::NotFound(_)) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!(
                    "The alias source {product}/{version}/{platform}/{key} is not found in the cache"
                )
            })),
        ),
        Err(CacheError::AlreadyExists(_)) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!(
                    "The alias {key_alias} for the product {product}/{version}/{platform} already exists"
                )
            })),
        ),
        Err(err) => {
            error!(error = %err, "failed to create alias {key_alias}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal storage error" })),
            )
        }
    }
}

/// GET /products/metadata — dump the whole index as JSON.
pub async fn dump_metadata(State(state): State<Arc<AppState>>) -> Json<Value> {
    info!("the product metadata is requested");
    Json(state.store.lock().await.dump())
}
