use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("kube API error: {0}")]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Runtime(#[from] trainer_runtime::RuntimeError),
    #[error("TrainJob {name:?} is missing its namespace")]
    MissingNamespace { name: String },
}
