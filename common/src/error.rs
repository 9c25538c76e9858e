use thiserror::Error;

/// Errors that can arise while building or validating the shared data
/// model itself, as distinct from pipeline- or reconcile-level errors
/// defined in `trainer-plugins`/`trainer-controller`.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("resource quantity {0:?} could not be parsed")]
    InvalidQuantity(String),

    #[error("replicated job {0:?} not found in runtime template")]
    ReplicatedJobNotFound(String),
}
