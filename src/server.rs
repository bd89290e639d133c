//! HTTP surface of the prediction service.

use std::{io, net::SocketAddr, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{net::TcpListener, task};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServeOptions;
use crate::predict::{PredictionError, PredictionResult, PredictionService, ValidationError};
use crate::store::ModelStore;

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving on the listener failed.
    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Shared state handed to every handler.
pub struct AppState {
    service: PredictionService,
    allow_origins: Vec<String>,
}

impl AppState {
    /// State serving `service` with no cross-origin access.
    pub fn new(service: PredictionService) -> Self {
        Self {
            service,
            allow_origins: Vec::new(),
        }
    }

    /// Sets the origins allowed by the CORS layer.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allow_origins = origins;
        self
    }
}

/// Starts the server and runs until ctrl-c.
///
/// The model is not read at startup; the first request that needs it loads
/// it through the store.
pub async fn serve(options: ServeOptions) -> Result<(), ServerError> {
    let (host, port) = options.socket_parts();
    let store = Arc::new(ModelStore::new(&options.model_path));
    let service = PredictionService::new(store).with_max_batch(options.max_batch);
    let state = AppState::new(service).with_allowed_origins(options.allow_origins.clone());
    let app = build_router(Arc::new(state));

    let addr = SocketAddr::from((host, port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        model = %options.model_path.display(),
        allow_origins = ?options.allow_origins,
        max_batch = options.max_batch,
        "prediction API listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Builds the router with tracing and, when origins are configured, CORS.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.allow_origins);

    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .route("/batch-predict", post(batch_predict_handler));

    if let Some(layer) = cors {
        router = router.layer(layer);
    }

    router.with_state(state).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let value = normalize_origin(origin).and_then(|v| HeaderValue::from_str(&v).ok());
            if value.is_none() {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
            }
            value
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([ACCEPT, CONTENT_TYPE])
            .allow_credentials(true),
    )
}

fn normalize_origin(origin: &str) -> Option<String> {
    let trimmed = origin.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

async fn index_handler() -> Json<Value> {
    Json(json!({ "message": "Evently prediction API is running" }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let provider = Arc::clone(state.service.provider());
    let outcome = task::spawn_blocking(move || provider.model().map(|_| ())).await;
    let (status, body) = match outcome {
        Ok(Ok(())) => (
            StatusCode::OK,
            HealthResponse {
                status: "ok",
                message: "API running and model loaded".into(),
            },
        ),
        Ok(Err(err)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            HealthResponse {
                status: "error",
                message: format!("model not loaded: {err}"),
            },
        ),
        Err(err) => {
            tracing::error!(%err, "health check task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                HealthResponse {
                    status: "error",
                    message: "health check failed".into(),
                },
            )
        }
    };
    (status, Json(body)).into_response()
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let Json(input) = payload?;
    let service = state.service.clone();
    let result = task::spawn_blocking(move || service.predict_one(input)).await??;
    Ok(Json(result))
}

async fn batch_predict_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Vec<PredictionResult>>, ApiError> {
    let Json(input) = payload?;
    let service = state.service.clone();
    let results = task::spawn_blocking(move || service.predict_batch(input)).await??;
    Ok(Json(results))
}

#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error("internal task failure: {0}")]
    Join(#[from] task::JoinError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Prediction(ValidationError::MalformedBody(rejection.body_text()).into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Prediction(PredictionError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Prediction(PredictionError::ModelUnavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Prediction(PredictionError::Internal(_)) | ApiError::Join(_) => {
                tracing::error!(error = %self, "prediction request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorPayload { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}
