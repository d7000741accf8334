//! End-to-end tests driving the full router through tower.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Local;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::ServiceExt;

use blobcache::api::server::{build_router, AppState};
use blobcache::storage::Store;

fn router_for(store: Store) -> Router {
    build_router(Arc::new(AppState::new(Arc::new(Mutex::new(store)))))
}

fn router(tmp: &TempDir) -> Router {
    router_for(Store::new(tmp.path().join("cache")))
}

async fn post(app: &Router, uri: &str, body: &'static [u8]) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_store_then_fetch_round_trip() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    let response = post(&app, "/products/p/1.0/linux/k", b"hello").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("uploaded successfully"));

    let response = get(&app, "/products/p/1.0/linux/k").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(body_bytes(response).await, b"hello");

    // One create plus one read.
    let dump = body_json(get(&app, "/products/metadata").await).await;
    assert_eq!(dump["p"]["linux"]["1.0_k"]["use_count"], 2);
}

#[tokio::test]
async fn test_duplicate_upload_conflicts() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    assert_eq!(
        post(&app, "/products/p/1.0/linux/k", b"hello").await.status(),
        StatusCode::CREATED
    );

    let response = post(&app, "/products/p/1.0/linux/k", b"hello").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn test_download_missing_is_404() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    let response = get(&app, "/products/p/1.0/linux/nothing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_alias_is_transparent_and_credits_canonical() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    post(&app, "/products/p/1.0/linux/k", b"hello").await;
    let response = post(&app, "/products/p/1.0/linux/k/add_alias/k2", b"").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = get(&app, "/products/p/1.0/linux/k2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"hello");

    // The canonical entry carries both the usage and the alias list; the
    // alias is not an entry of its own.
    let dump = body_json(get(&app, "/products/metadata").await).await;
    assert_eq!(dump["p"]["linux"]["1.0_k"]["use_count"], 2);
    assert_eq!(dump["p"]["linux"]["1.0_k"]["aliases"], json!(["1.0_k2"]));
    assert!(dump["p"]["linux"]["1.0_k2"].is_null());
}

#[tokio::test]
async fn test_alias_missing_source_conflicts() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    let response = post(&app, "/products/p/1.0/linux/missing/add_alias/k2", b"").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_alias_duplicate_conflicts() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    post(&app, "/products/p/1.0/linux/k", b"hello").await;
    post(&app, "/products/p/1.0/linux/k/add_alias/k2", b"").await;

    let response = post(&app, "/products/p/1.0/linux/k/add_alias/k2", b"").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn test_upload_via_alias_conflicts() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    post(&app, "/products/p/1.0/linux/k", b"hello").await;
    post(&app, "/products/p/1.0/linux/k/add_alias/k2", b"").await;

    // The alias occupies the tuple: a write there is a duplicate.
    let response = post(&app, "/products/p/1.0/linux/k2", b"other").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_metadata_dump_starts_empty() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    let response = get(&app, "/products/metadata").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));
}

#[tokio::test]
async fn test_help_text() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    let response = get(&app, "/help").await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("add_alias"));
    assert!(text.contains("/products/metadata"));
}

#[tokio::test]
async fn test_entries_survive_a_restart() {
    let tmp = TempDir::new().unwrap();
    let app = router(&tmp);

    post(&app, "/products/p/1.0/linux/k", b"hello").await;
    post(&app, "/products/p/1.0/linux/k/add_alias/k2", b"").await;
    let before = body_json(get(&app, "/products/metadata").await).await;
    drop(app);

    // A fresh process rebuilds its index from disk on the startup pass.
    let mut store = Store::new(tmp.path().join("cache"));
    store.refresh(Local::now().naive_local()).unwrap();
    let app = router_for(store);

    assert_eq!(
        body_json(get(&app, "/products/metadata").await).await,
        before
    );
    let response = get(&app, "/products/p/1.0/linux/k2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"hello");
}
