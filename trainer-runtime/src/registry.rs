//! Resolves a `TrainJob.spec.runtimeRef` into the `RuntimeSpec` template it
//! names, fetching either a namespaced `TrainingRuntime` or a
//! cluster-scoped `ClusterTrainingRuntime`.

use crate::error::{RuntimeError, RuntimeResult};
use common::model::{
    ClusterTrainingRuntime, RuntimeKind, RuntimeRef, RuntimeSpec, TrainingRuntime,
};
use kube::api::Api;
use kube::Client;
use std::collections::BTreeMap;

/// A resolved runtime: its template plus the labels/annotations plugins
/// propagate onto every downstream object.
pub struct ResolvedRuntime {
    pub spec: RuntimeSpec,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

pub struct RuntimeRegistry {
    client: Client,
}

impl RuntimeRegistry {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn resolve(
        &self,
        reference: &RuntimeRef,
        namespace: &str,
    ) -> RuntimeResult<ResolvedRuntime> {
        log::debug!(
            "resolving runtimeRef {:?} kind={:?} in namespace {namespace:?}",
            reference.name,
            reference.kind
        );
        match reference.kind {
            RuntimeKind::TrainingRuntime => {
                let api: Api<TrainingRuntime> = Api::namespaced(self.client.clone(), namespace);
                let runtime = api.get(&reference.name).await.map_err(|err| match err {
                    kube::Error::Api(ref e) if e.code == 404 => RuntimeError::NotFound {
                        name: reference.name.clone(),
                        kind: "TrainingRuntime",
                    },
                    other => RuntimeError::Kube(other),
                })?;
                Ok(ResolvedRuntime {
                    spec: runtime.spec.template,
                    labels: runtime.metadata.labels.unwrap_or_default(),
                    annotations: runtime.metadata.annotations.unwrap_or_default(),
                })
            }
            RuntimeKind::ClusterTrainingRuntime => {
                let api: Api<ClusterTrainingRuntime> = Api::all(self.client.clone());
                let runtime = api.get(&reference.name).await.map_err(|err| match err {
                    kube::Error::Api(ref e) if e.code == 404 => RuntimeError::NotFound {
                        name: reference.name.clone(),
                        kind: "ClusterTrainingRuntime",
                    },
                    other => RuntimeError::Kube(other),
                })?;
                Ok(ResolvedRuntime {
                    spec: runtime.spec.template,
                    labels: runtime.metadata.labels.unwrap_or_default(),
                    annotations: runtime.metadata.annotations.unwrap_or_default(),
                })
            }
        }
    }
}
