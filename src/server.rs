//! HTTP server exposing the pipeline to display and export clients.
//!
//! This module provides an HTTP server that:
//! - Serves the session export document via GET /export
//! - Serves the latest prediction and highlight via GET /predictions/latest
//! - Accepts word events via POST /words
//!
//! # Architecture
//!
//! ```text
//! Speller UI ──→ POST /words ──→ feed channel ──→ pipeline (single ingester)
//!      ▲
//!      └──────── GET /export, /predictions/latest ◀── PipelineView
//! ```

use crate::core::{ExportDocument, PipelineView, Prediction};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    /// Read access to the running pipeline
    view: PipelineView,
    /// Feed channel; word events go through the ingestion loop
    feed: Sender<String>,
}

impl ServerState {
    pub fn new(view: PipelineView, feed: Sender<String>) -> Self {
        Self { view, feed }
    }
}

/// Word event submitted by the speller UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordRequest {
    pub word: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance_id: String,
}

/// Latest prediction response
#[derive(Debug, Serialize, Deserialize)]
pub struct LatestResponse {
    pub prediction: Option<Prediction>,
    pub highlight: Option<String>,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: String) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.view.instance_id().to_string(),
    })
}

/// GET /export
///
/// Read-only; only export files count towards the stats.
async fn export(State(state): State<Arc<ServerState>>) -> Json<ExportDocument> {
    Json(state.view.export())
}

/// GET /predictions/latest
async fn latest(State(state): State<Arc<ServerState>>) -> Json<LatestResponse> {
    Json(LatestResponse {
        prediction: state.view.latest_prediction(),
        highlight: state.view.current_highlight(),
    })
}

/// POST /words
///
/// Queues the word on the feed so it is recorded in arrival order with samples.
async fn words(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<WordRequest>,
) -> Result<StatusCode, ApiError> {
    if request.word.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "EMPTY_WORD",
            "Word must not be empty".to_string(),
        ));
    }

    let line = serde_json::to_string(&request).map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_WORD",
            format!("Invalid word event: {e}"),
        )
    })?;

    match state.feed.try_send(line) {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(TrySendError::Full(_)) => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "FEED_FULL",
            "Feed queue is full".to_string(),
        )),
        Err(TrySendError::Disconnected(_)) => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "FEED_CLOSED",
            "Pipeline is not accepting events".to_string(),
        )),
    }
}

/// Build the router over the given state.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/export", get(export))
        .route("/predictions/latest", get(latest))
        .route("/words", post(words))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://localhost:3000"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(Arc::new(state));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Pipeline server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
