use crate::delivery::{Delivery, FetchOptions};
use crate::dispatch::{Dispatcher, SynthRequest};
use crate::error::{DeliveryError, ValidationError};
use crate::job::JobResult;
use crate::metrics_store::MetricsStore;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

lazy_static! {
    static ref APP_NAME: Regex = Regex::new(r"^[a-z0-9]+$").unwrap();
}

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub delivery: Delivery,
    pub metrics: Arc<dyn MetricsStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/synth", post(synth))
        .route("/engine", get(list_engines))
        .route("/engine/{name}", get(engine_info))
        .route("/files/{*path}", get(files))
        .route("/cache/{app}", get(load_metrics).post(record_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// JSON failure bodies shared by the API routes.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, description) = match self {
            ApiError::BadRequest(description) => (StatusCode::BAD_REQUEST, description),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Internal(description) => (StatusCode::INTERNAL_SERVER_ERROR, description),
        };
        (status, Json(JobResult::failure(description))).into_response()
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        match self {
            DeliveryError::Forbidden => (StatusCode::FORBIDDEN, "forbidden").into_response(),
            DeliveryError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            DeliveryError::RangeNotSatisfiable { size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
                "range not satisfiable",
            )
                .into_response(),
            DeliveryError::Io(e) => {
                error!(error = %e, "artifact read failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({"success": true, "result": "ok"}))
}

async fn synth(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: SynthRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return ApiError::BadRequest(ValidationError::MalformedBody(e.to_string()).to_string())
                .into_response()
        }
    };

    let result = state.dispatcher.submit(request).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}

async fn list_engines(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({"success": true, "result": state.dispatcher.engines()}))
}

async fn engine_info(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.dispatcher.engine_info(&name).await {
        Ok(descriptor) => Ok(Json(json!({"success": true, "result": descriptor.as_ref()}))),
        Err(e) => {
            warn!(engine = %name, error = %e, "capability query failed");
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

async fn files(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let header_text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let options = FetchOptions {
        versioned: query.contains_key("v"),
        if_modified_since: header_text(header::IF_MODIFIED_SINCE),
        range: header_text(header::RANGE),
    };

    match state.delivery.fetch(&path, &options).await {
        Ok(artifact) => artifact.into_response(),
        Err(e) => e.into_response(),
    }
}

fn check_app(app: &str) -> Result<(), ApiError> {
    if APP_NAME.is_match(app) {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}

async fn load_metrics(
    State(state): State<Arc<AppState>>,
    Path(app): Path<String>,
) -> Result<Json<Value>, ApiError> {
    check_app(&app)?;
    let metrics = state.metrics.clone();
    let stored = tokio::task::spawn_blocking(move || metrics.load(&app))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({"success": true, "result": stored})))
}

async fn record_metrics(
    State(state): State<Arc<AppState>>,
    Path(app): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    check_app(&app)?;
    let value: Value = serde_json::from_slice(&body).map_err(|e| {
        ApiError::BadRequest(ValidationError::MalformedBody(e.to_string()).to_string())
    })?;

    let metrics = state.metrics.clone();
    tokio::task::spawn_blocking(move || metrics.record(&app, &value))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({"success": true})))
}
