use crate::auth::authorize_caller;
use crate::error::AppError;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use common::model::{Metric, TrainJob, TrainerStatus};
use kube::api::{Api, Patch, PatchParams};
use serde::Deserialize;
use std::sync::Arc;

/// Body shape trainer containers POST. Mirrors `TrainerStatus` rather
/// than reusing it directly so a malformed metric doesn't reject the
/// whole payload silently via `#[serde(default)]` coercion.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub progress_percentage: Option<i32>,
    pub estimated_remaining_seconds: Option<i32>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

const FIELD_MANAGER: &str = "trainer-progress-server";

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    auth: TypedHeader<Authorization<Bearer>>,
    Json(update): Json<StatusUpdate>,
) -> Result<StatusCode, AppError> {
    authorize_caller(&state.client, auth.token(), &namespace, &name).await?;

    let train_jobs: Api<TrainJob> = Api::namespaced(state.client.clone(), &namespace);
    train_jobs
        .get_status(&name)
        .await
        .map_err(|err| match err {
            kube::Error::Api(resp) if resp.code == 404 => AppError::NotFound(name.clone()),
            other => AppError::Kube(other),
        })?;

    let trainer_status = TrainerStatus {
        progress_percentage: update.progress_percentage,
        estimated_remaining_seconds: update.estimated_remaining_seconds,
        metrics: update.metrics,
    };
    let patch = serde_json::json!({
        "status": {
            "trainerStatus": trainer_status,
            "progressionStatus": {
                "lastProgressTime": chrono::Utc::now().to_rfc3339(),
            },
        }
    });

    train_jobs
        .patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(patch),
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_update_tolerates_missing_fields() {
        let update: StatusUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.progress_percentage.is_none());
        assert!(update.metrics.is_empty());
    }

    #[test]
    fn status_update_parses_metrics() {
        let update: StatusUpdate = serde_json::from_str(
            r#"{"progressPercentage": 42, "metrics": [{"name": "loss", "value": "0.12"}]}"#,
        )
        .unwrap();
        assert_eq!(update.progress_percentage, Some(42));
        assert_eq!(update.metrics[0].name, "loss");
    }
}
