//! Prometheus text exporter over HTTP.

use crate::error::{TelemetryError, TelemetryResult};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Render the default registry in text exposition format.
pub fn render_metrics() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    encoder
        .encode(&families, &mut buf)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
}

async fn metrics_handler() -> impl IntoResponse {
    match render_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn create_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
}

/// Serve `/metrics` and `/healthz` until `shutdown` resolves.
pub async fn serve_metrics<F>(addr: SocketAddr, shutdown: F) -> TelemetryResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Starting metrics exporter");
    axum::serve(listener, create_router())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
