//! The progress-update HTTP plane: a small axum service trainer pods
//! call back into to report `TrainerStatus`, authenticated via
//! `TokenReview` against the projected service-account token the
//! progress plugin mounts into every trainer pod.

pub mod auth;
pub mod error;
pub mod handler;

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use kube::Client;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub client: Client,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub tls_cert_path: PathBuf,
    pub tls_key_path: PathBuf,
    pub max_body_bytes: usize,
    pub request_timeout_seconds: u64,
}

pub fn router(client: Client) -> Router {
    let state = Arc::new(AppState { client });
    Router::new()
        .route(
            "/apis/trainer.kubeflow.org/v1alpha1/namespaces/{namespace}/trainjobs/{name}/status",
            post(handler::update_status),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves the progress-update plane over TLS until cancelled,
/// applying the configured body-size limit and request timeout at the
/// layer level (kept outside `router` so tests can build a router
/// without a real socket). Terminates TLS itself rather than expecting
/// a sidecar, since trainer pods reach this service directly over the
/// cluster network.
pub async fn serve(config: Config, client: Client) -> anyhow::Result<()> {
    let app = router(client)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_seconds,
        )));

    let tls_config =
        RustlsConfig::from_pem_file(&config.tls_cert_path, &config.tls_key_path).await?;

    tracing::info!(address = %config.bind_address, "progress server listening");
    axum_server::bind_rustls(config.bind_address, tls_config)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
