//! Controller binary entry point: loads configuration, wires the
//! reconcile loop to a `kube::runtime::Controller<TrainJob>`, and runs
//! the metrics/health/progress-server sidecars alongside it.

mod cli;
mod config;
mod context;
mod error;
mod health;
mod metrics;
mod reconciler;

use crate::config::Config;
use crate::context::{Context, SharedContext};
use clap::Parser;
use common::model::TrainJob;
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::{controller::Controller, watcher};
use kube::Client;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trainer_runtime::{Pipeline, RuntimeRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = load_config(&cli.config);
    tracing::info!(?config, "starting trainer-controller");

    let client = Client::try_default().await?;
    let pipeline = Pipeline::new(RuntimeRegistry::new(client.clone()));
    let ctx: SharedContext = Arc::new(Context {
        client: client.clone(),
        pipeline,
        config: config.clone(),
    });

    let metrics_server = tokio::spawn(health::serve_metrics(config.metrics_bind_address.clone()));
    let health_server = tokio::spawn(health::serve_health(config.health_bind_address.clone()));
    let progress_server = tokio::spawn(run_progress_server(config.progress_server.clone(), client.clone()));

    let trainjobs: Api<TrainJob> = if config.watch_namespace.is_empty() {
        Api::all(client.clone())
    } else {
        Api::namespaced(client.clone(), &config.watch_namespace)
    };

    let jobsets: Api<DynamicObject> = Api::all_with(client.clone(), &jobset_resource());
    let podgroups: Api<DynamicObject> = Api::all_with(client.clone(), &podgroup_resource());

    Controller::new(trainjobs, watcher::Config::default())
        .owns_with(jobsets, jobset_resource(), watcher::Config::default())
        .owns_with(podgroups, podgroup_resource(), watcher::Config::default())
        .shutdown_on_signal()
        .run(reconciler::reconcile, reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    tracing::debug!(trainjob = %object.name, ?action, "reconciled")
                }
                Err(err) => tracing::warn!(error = %err, "reconcile error"),
            }
        })
        .await;

    metrics_server.abort();
    health_server.abort();
    progress_server.abort();
    Ok(())
}

fn jobset_resource() -> kube::discovery::ApiResource {
    kube::discovery::ApiResource {
        group: "jobset.x-k8s.io".to_string(),
        version: "v1alpha2".to_string(),
        api_version: "jobset.x-k8s.io/v1alpha2".to_string(),
        kind: "JobSet".to_string(),
        plural: "jobsets".to_string(),
    }
}

fn podgroup_resource() -> kube::discovery::ApiResource {
    kube::discovery::ApiResource {
        group: "scheduling.volcano.sh".to_string(),
        version: "v1beta1".to_string(),
        api_version: "scheduling.volcano.sh/v1beta1".to_string(),
        kind: "PodGroup".to_string(),
        plural: "podgroups".to_string(),
    }
}

async fn run_progress_server(config: config::ProgressServerConfig, client: Client) -> anyhow::Result<()> {
    let bind_address = config.bind_address.parse()?;
    progress_server::serve(
        progress_server::Config {
            bind_address,
            tls_cert_path: PathBuf::from(config.tls_cert_path),
            tls_key_path: PathBuf::from(config.tls_key_path),
            max_body_bytes: config.max_body_bytes,
            request_timeout_seconds: config.request_timeout_seconds,
        },
        client,
    )
    .await
}

fn load_config(path: &PathBuf) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(config::ConfigError::Read { .. }) => {
            tracing::warn!(path = %path.display(), "no config file found, using defaults");
            Config::default()
        }
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    }
}

fn init_logging(log_level: Option<&str>) {
    let filter = log_level
        .and_then(|level| EnvFilter::from_str(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(filter)
        .init();

    tracing_log::LogTracer::init().expect("log tracer bridge");
}
