use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Error type for every handler and middleware layer in this service.
/// `into_response` shapes the body as a Kubernetes `Status` object so
/// callers (trainer pods running the standard client libraries) can
/// parse failures the same way they parse API server errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing bearer token")]
    Unauthenticated,
    #[error("token rejected: {0}")]
    InvalidToken(String),
    #[error("{name} in namespace {namespace} is not authorized to update trainjob {trainjob}")]
    Forbidden {
        name: String,
        namespace: String,
        trainjob: String,
    },
    #[error("trainjob {0} not found")]
    NotFound(String),
    #[error("malformed status payload: {0}")]
    BadRequest(String),
    #[error("kube API error: {0}")]
    Kube(#[from] kube::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthenticated | AppError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Kube(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "progress-server request failed");
        } else {
            tracing::debug!(error = %self, "progress-server request rejected");
        }
        let body = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": self.to_string(),
            "code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
