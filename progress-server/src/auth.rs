//! Authenticates callers by asking the API server to validate the
//! projected service-account token they present (`TokenReview`), the
//! same pattern webhook authenticators use rather than verifying the
//! JWT signature locally — this service never needs the cluster's
//! signing key or a JWKS endpoint.
//!
//! Authorization then checks, beyond the bearer token alone, that the
//! authenticated identity is a service account in the URL's namespace
//! and names the exact pod (name *and* UID) that owns the TrainJob in
//! the URL, by comparing against the pod's
//! `trainer.kubeflow.org/trainjob-name` label (stamped by the progress
//! plugin).

use crate::error::AppError;
use common::labels::{PROGRESS_TOKEN_AUDIENCE, TRAINJOB_NAME_LABEL};
use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, PostParams};
use kube::Client;

/// Extra fields the API server attaches to a successful `TokenReview`
/// for a projected service-account token, identifying the pod it was
/// mounted into.
const POD_NAME_EXTRA: &str = "authentication.kubernetes.io/pod-name";
const POD_UID_EXTRA: &str = "authentication.kubernetes.io/pod-uid";
const SERVICEACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// What a successful `TokenReview` tells us about the caller.
struct ReviewedIdentity {
    namespace: String,
    pod_name: String,
    pod_uid: String,
}

pub async fn authorize_caller(
    client: &Client,
    token: &str,
    namespace: &str,
    train_job_name: &str,
) -> Result<(), AppError> {
    let identity = review_token(client, token).await?;

    let forbidden = || AppError::Forbidden {
        name: identity.pod_name.clone(),
        namespace: namespace.to_string(),
        trainjob: train_job_name.to_string(),
    };

    if identity.namespace != namespace {
        return Err(forbidden());
    }

    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pod = pods.get(&identity.pod_name).await.map_err(|_| forbidden())?;

    let uid_matches = pod.metadata.uid.as_deref() == Some(identity.pod_uid.as_str());
    let owns_trainjob = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(TRAINJOB_NAME_LABEL))
        .is_some_and(|name| name == train_job_name);

    if uid_matches && owns_trainjob {
        Ok(())
    } else {
        Err(forbidden())
    }
}

async fn review_token(client: &Client, token: &str) -> Result<ReviewedIdentity, AppError> {
    let reviews: Api<TokenReview> = Api::all(client.clone());
    let review = TokenReview {
        spec: TokenReviewSpec {
            token: Some(token.to_string()),
            audiences: Some(vec![PROGRESS_TOKEN_AUDIENCE.to_string()]),
            ..Default::default()
        },
        ..Default::default()
    };

    let result = reviews.create(&PostParams::default(), &review).await?;
    let status = result
        .status
        .ok_or_else(|| AppError::InvalidToken("API server returned no review status".into()))?;

    if !status.authenticated.unwrap_or(false) {
        return Err(AppError::InvalidToken(
            status.error.unwrap_or_else(|| "token not authenticated".into()),
        ));
    }

    let user = status
        .user
        .ok_or_else(|| AppError::InvalidToken("token review returned no user info".into()))?;

    let namespace = user
        .username
        .as_deref()
        .and_then(|name| name.strip_prefix(SERVICEACCOUNT_PREFIX))
        .and_then(|rest| rest.split_once(':'))
        .map(|(namespace, _name)| namespace.to_string())
        .ok_or_else(|| AppError::InvalidToken("token is not a service-account token".into()))?;

    let mut extra = user
        .extra
        .ok_or_else(|| AppError::InvalidToken("token is not bound to a pod".into()))?;

    let pod_name = extra
        .remove(POD_NAME_EXTRA)
        .and_then(|mut values| values.pop())
        .ok_or_else(|| AppError::InvalidToken("token is not bound to a pod".into()))?;
    let pod_uid = extra
        .remove(POD_UID_EXTRA)
        .and_then(|mut values| values.pop())
        .ok_or_else(|| AppError::InvalidToken("token is not bound to a pod".into()))?;

    Ok(ReviewedIdentity { namespace, pod_name, pod_uid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_extra_keys_match_kubernetes_convention() {
        assert_eq!(POD_NAME_EXTRA, "authentication.kubernetes.io/pod-name");
        assert_eq!(POD_UID_EXTRA, "authentication.kubernetes.io/pod-uid");
    }

    #[test]
    fn serviceaccount_username_prefix_is_recognized() {
        let username = "system:serviceaccount:kubeflow:trainjob-abc-trainer-0";
        let namespace = username
            .strip_prefix(SERVICEACCOUNT_PREFIX)
            .and_then(|rest| rest.split_once(':'))
            .map(|(ns, _)| ns);
        assert_eq!(namespace, Some("kubeflow"));
    }
}
