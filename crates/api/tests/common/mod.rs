#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use glossa_api::config::{ServerConfig, StoreBackend};
use glossa_api::router::build_app_router;
use glossa_api::state::AppState;
use glossa_core::memory::InMemoryStore;
use glossa_core::nlp::lexicon::LexiconAnalyzer;

/// Build a test `ServerConfig` with safe defaults.
///
/// A zero grace window recomputes aggregates on every cached read.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        store_backend: StoreBackend::Memory,
        database_url: None,
        analyzer_url: None,
        lexicon_path: None,
        stale_grace_secs: 0,
        tfidf_page_size: 50,
        max_sample_size: 10,
    }
}

/// Full application router over a fresh in-memory store and the built-in
/// lexicon analyzer, with the production middleware stack.
pub fn build_test_app() -> Router {
    let config = test_config();
    let state = AppState::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(LexiconAnalyzer::new()),
        config.clone(),
    );
    build_app_router(state, &config)
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn put_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// POST and return `data` from the envelope, asserting the status.
pub async fn post_data(app: &Router, uri: &str, body: Value, expected: StatusCode) -> Value {
    let response = post_json(app, uri, body).await;
    assert_eq!(response.status(), expected, "POST {uri}");
    body_json(response).await["data"].clone()
}

pub async fn get_data(app: &Router, uri: &str) -> Value {
    let response = get(app, uri).await;
    assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
    body_json(response).await["data"].clone()
}

pub async fn create_label(app: &Router, name: &str) -> i64 {
    post_data(app, "/api/v1/labels", json!({ "name": name }), StatusCode::CREATED).await["id"]
        .as_i64()
        .unwrap()
}

pub async fn create_image(app: &Router, file_name: &str) -> i64 {
    post_data(
        app,
        "/api/v1/images",
        json!({ "fileName": file_name, "width": 640, "height": 480 }),
        StatusCode::CREATED,
    )
    .await["id"]
        .as_i64()
        .unwrap()
}

pub async fn add_object(app: &Router, image_id: i64, label_id: i64) -> i64 {
    post_data(
        app,
        &format!("/api/v1/images/{image_id}/objects"),
        json!({
            "labelId": label_id,
            "bbox": { "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0 }
        }),
        StatusCode::CREATED,
    )
    .await["id"]
        .as_i64()
        .unwrap()
}

pub async fn annotate(app: &Router, object_id: i64, text: &str) -> Value {
    post_data(
        app,
        "/api/v1/annotation",
        json!({ "objectId": object_id, "annotation": text }),
        StatusCode::CREATED,
    )
    .await
}
