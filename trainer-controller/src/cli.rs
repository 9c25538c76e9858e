//! Command-line surface, a `clap`-derive CLI.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "trainer-controller", version, about = "Kubeflow Trainer control plane")]
pub struct Cli {
    /// Path to the controller's YAML config file.
    #[arg(long, env = "TRAINER_CONTROLLER_CONFIG", default_value = "/etc/trainer/controller.yaml")]
    pub config: PathBuf,

    /// Override the log level (falls back to RUST_LOG / info).
    #[arg(long, env = "TRAINER_CONTROLLER_LOG_LEVEL")]
    pub log_level: Option<String>,
}
