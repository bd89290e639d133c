#![allow(missing_docs)]

use std::fs;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::Router;
use evently::model::{encode_binary, LinearModel};
use evently::predict::PredictionService;
use evently::server::{build_router, AppState};
use evently::store::{ModelProvider, ModelStore, StaticModel};
use ndarray::array;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn model() -> LinearModel {
    LinearModel::new(array![0.5, 0.3, 0.1], 0.0)
}

fn router_with(provider: Arc<dyn ModelProvider>) -> Router {
    let service = PredictionService::new(provider).with_max_batch(3);
    build_router(Arc::new(AppState::new(service)))
}

fn app() -> Router {
    router_with(Arc::new(StaticModel::new(model())))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header(CONTENT_TYPE, "application/json");
    }
    let request = request
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(&body.to_string())).await
}

fn row(rm: u64, likes: u64, pop: u64) -> Value {
    json!({"region_match": rm, "user_likes_for_category": likes, "event_popularity": pop})
}

#[tokio::test]
async fn index_and_health_report_ok() {
    let (status, body) = send(app(), Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let (status, body) = send(app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn predict_scores_and_echoes() {
    let (status, body) = post(app(), "/predict", row(1, 3, 15)).await;
    assert_eq!(status, StatusCode::OK);
    assert!((body["prediction"].as_f64().expect("number") - 2.9).abs() < 1e-9);
    assert_eq!(body["input_data"], row(1, 3, 15));
}

#[tokio::test]
async fn predict_lists_every_missing_feature() {
    let (status, body) = post(app(), "/predict", json!({"region_match": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("user_likes_for_category"), "{message}");
    assert!(message.contains("event_popularity"), "{message}");
}

#[tokio::test]
async fn malformed_and_non_numeric_bodies_are_rejected() {
    let (status, body) = send(app(), Method::POST, "/predict", Some("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let bad = json!({"region_match": "one", "user_likes_for_category": 0, "event_popularity": 0});
    let (status, _) = post(app(), "/predict", bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_preserves_order() {
    let batch = json!([row(0, 0, 0), row(1, 0, 0), row(0, 1, 1)]);
    let (status, body) = post(app(), "/batch-predict", batch.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let results = body.as_array().expect("array");
    let expected = [0.0, 0.5, 0.4];
    assert_eq!(results.len(), 3);
    for ((result, input), want) in results.iter().zip(batch.as_array().expect("array")).zip(expected) {
        assert!((result["prediction"].as_f64().expect("number") - want).abs() < 1e-9);
        assert_eq!(&result["input_data"], input);
    }
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let batch = json!([row(1, 0, 0), {"region_match": 1, "event_popularity": 2}, row(0, 0, 0)]);
    let (status, body) = post(app(), "/batch-predict", batch).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("user_likes_for_category"), "{message}");
    assert!(body.get("prediction").is_none());
}

#[tokio::test]
async fn batch_shape_and_cap_are_enforced() {
    let (status, _) = post(app(), "/batch-predict", row(1, 1, 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let too_many = json!([row(0, 0, 0), row(0, 0, 0), row(0, 0, 0), row(0, 0, 0)]);
    let (status, _) = post(app(), "/batch-predict", too_many).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_model_is_a_server_error_then_recovers() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("model.bin");
    let store: Arc<dyn ModelProvider> = Arc::new(ModelStore::new(&path));

    let (status, body) = send(router_with(Arc::clone(&store)), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");

    let (status, body) = post(router_with(Arc::clone(&store)), "/predict", row(1, 1, 1)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    // Validation still wins over the missing model.
    let (status, _) = post(router_with(Arc::clone(&store)), "/predict", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    fs::write(&path, encode_binary(&model())).expect("write model");
    let (status, body) = post(router_with(Arc::clone(&store)), "/predict", row(1, 1, 1)).await;
    assert_eq!(status, StatusCode::OK);
    assert!((body["prediction"].as_f64().expect("number") - 0.9).abs() < 1e-9);
    assert!(store.is_loaded());
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let service = PredictionService::new(Arc::new(StaticModel::new(model())));
    let state = AppState::new(service).with_allowed_origins(vec!["http://localhost:3000/".into()]);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/predict")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .expect("request");
    let response = build_router(Arc::new(state))
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );
}
