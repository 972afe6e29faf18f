//! HTTP scrape endpoint.
//!
//! - `GET /` static liveness string
//! - `GET /metrics` Prometheus text exposition
//! - `GET /health` JSON status of the pipeline

use crate::core::{FlowstatError, Result};
use crate::export::{content_type, MetricsExporter};
use crate::monitoring::PipelineMetrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Body of the liveness root path
pub const LIVENESS_BODY: &str = "status: active";

/// API server state.
#[derive(Clone)]
pub struct ApiState {
    pub exporter: Arc<MetricsExporter>,
    pub telemetry: Arc<PipelineMetrics>,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connected: bool,
}

/// Build the router with all endpoints
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the scrape port; failure here is fatal
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| FlowstatError::config(format!("Failed to bind metrics endpoint {}: {}", addr, e)))
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Serving metrics on http://{}/metrics", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| FlowstatError::network(format!("metrics server error: {}", e)))
}

/// GET /
async fn root_handler() -> &'static str {
    LIVENESS_BODY
}

/// GET /metrics
async fn metrics_handler(State(state): State<ApiState>) -> Response {
    match state.exporter.render().await {
        Ok(body) => ([(header::CONTENT_TYPE, content_type())], body).into_response(),
        Err(e) => {
            tracing::error!("Scrape failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, format!("metrics unavailable: {}", e)).into_response()
        },
    }
}

/// GET /health
async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "active",
        version: env!("CARGO_PKG_VERSION"),
        connected: state.telemetry.is_connected(),
    })
}
