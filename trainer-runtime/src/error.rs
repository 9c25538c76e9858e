use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime {name:?} not found ({kind:?})")]
    NotFound { name: String, kind: &'static str },
    #[error("kube API error resolving runtime: {0}")]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Plugin(#[from] trainer_plugins::PluginError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
