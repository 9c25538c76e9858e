//! Plain HTTP endpoints for Prometheus scraping and kubelet probes, kept
//! separate from the TLS-terminating progress server since both the
//! metrics and health surfaces are meant to stay on the pod network only.

use crate::metrics;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

pub async fn serve_metrics(bind_address: String) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "metrics endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn serve_health(bind_address: String) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/readyz", get(|| async { StatusCode::OK }));
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "health endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode(),
    )
}
