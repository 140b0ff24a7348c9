//! HTTP query surface using Axum

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, Level};

use crate::core::runtime::SentimentRuntime;
use crate::error::IngestError;
use crate::ingest::normalizer::RawObservation;
use crate::metrics::Metrics;
use crate::models::signal::{SignalName, SnapshotLookup, Window};

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<RwLock<HealthStatus>>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub runtime: SentimentRuntime,
}

impl AppState {
    pub fn new(runtime: SentimentRuntime) -> Self {
        Self {
            health: Arc::new(RwLock::new(HealthStatus::default())),
            metrics: runtime.metrics().clone(),
            start_time: Arc::new(Instant::now()),
            runtime,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthStatus {
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn no_data(entity: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "no_data", "entity": entity })),
    )
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let health = state.health.read().await;
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Ok(Json(json!({
        "status": health.status,
        "uptime_seconds": uptime_seconds,
        "service": "sentrix-signal-engine",
        "partitions": state.runtime.partitions(),
        "entities": state.runtime.entities().len(),
    })))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();
    state.metrics.http_requests_in_flight.dec();

    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

/// Accept one provider observation
async fn ingest_observation(
    State(state): State<AppState>,
    Json(raw): Json<RawObservation>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let entity = raw.entity.clone();
    match state.runtime.ingest_raw(raw) {
        Ok(receipt) => {
            debug!(entity = %entity, receipt = ?receipt, "observation accepted");
            Ok((StatusCode::ACCEPTED, Json(json!({ "status": receipt }))))
        }
        Err(e @ IngestError::Validation(_)) | Err(e @ IngestError::SourceDisabled(_)) => {
            Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
        Err(e @ IngestError::Closed) => Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}

/// All tracked signals of an entity
async fn get_entity_signals(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let snapshot = state.runtime.snapshot(&entity).ok_or_else(|| no_data(&entity))?;
    Ok(Json(json!(*snapshot)))
}

/// Current value of one signal window
async fn get_signal_window(
    State(state): State<AppState>,
    Path((entity, signal, window)): Path<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    let signal: SignalName = signal
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;
    let window: Window = window
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;

    match state.runtime.lookup(&entity, signal, window) {
        SnapshotLookup::Value { value, updated_at } => Ok(Json(json!({
            "status": "value",
            "entity": entity,
            "signal": signal,
            "window": window,
            "value": value,
            "updated_at": updated_at,
        }))),
        SnapshotLookup::NoData => Err(no_data(&entity)),
    }
}

async fn list_entities(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "entities": state.runtime.entities() }))
}

async fn get_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!(*state.runtime.config()))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/observations", post(ingest_observation))
        .route("/api/entities", get(list_entities))
        .route("/api/signals/{entity}", get(get_entity_signals))
        .route(
            "/api/signals/{entity}/{signal}/{window}",
            get(get_signal_window),
        )
        .route("/api/config", get(get_config))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server<F>(
    port: u16,
    state: AppState,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    info!(
        "Metrics endpoint available at http://0.0.0.0:{}/metrics",
        port
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
