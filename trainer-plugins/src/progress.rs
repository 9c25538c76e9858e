//! Progress plugin: wires every trainer container to the
//! progress-update HTTP plane. Mounts a projected service-account token
//! scoped to the `trainer.kubeflow.org` audience plus the cluster CA
//! bundle, and injects the URL/cert/token env triple pointing at the
//! mounted files — no secret material ever goes directly into an env var,
//! matching the volume-projection approach the `distribution` crate's
//! registry-token handling uses for its own bearer tokens.

use crate::capability::{EnforceMlPolicy, Plugin, PluginResult};
use common::apply::{upsert_envs, upsert_mount, upsert_volume};
use common::labels::{PROGRESS_TOKEN_AUDIENCE, TRAINJOB_NAME_LABEL};
use common::model::{EnvVar, PodSetAncestor, TrainJob, Volume, VolumeMount};
use common::Info;

pub struct ProgressPlugin;

const NAME: &str = "Progress";
const VOLUME_NAME: &str = "trainer-status";
const MOUNT_PATH: &str = "/var/run/secrets/trainer.kubeflow.org";
const TOKEN_EXPIRATION_SECONDS: i64 = 3600;

impl Plugin for ProgressPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

fn status_url(namespace: &str, train_job_name: &str) -> String {
    format!(
        "https://progress-server.{namespace}.svc/apis/trainer.kubeflow.org/v1alpha1/namespaces/{namespace}/trainjobs/{train_job_name}/status"
    )
}

fn projected_volume_source() -> serde_json::Value {
    serde_json::json!({
        "projected": {
            "sources": [
                {
                    "serviceAccountToken": {
                        "audience": PROGRESS_TOKEN_AUDIENCE,
                        "expirationSeconds": TOKEN_EXPIRATION_SECONDS,
                        "path": "token",
                    }
                },
                {
                    "configMap": {
                        "name": "kube-root-ca.crt",
                        "items": [{"key": "ca.crt", "path": "ca.crt"}],
                    }
                },
            ]
        }
    })
}

impl EnforceMlPolicy for ProgressPlugin {
    fn enforce_ml_policy(&self, info: &mut Info, _train_job: &TrainJob) -> PluginResult<()> {
        info.scheduler
            .pod_labels
            .insert(TRAINJOB_NAME_LABEL.to_string(), info.train_job_name.clone());

        let url = status_url(&info.namespace, &info.train_job_name);

        for pod_set in info.template_spec.pod_sets.iter_mut() {
            if pod_set.ancestor != Some(PodSetAncestor::Trainer) {
                continue;
            }
            upsert_volume(
                &mut pod_set.volumes,
                Volume {
                    name: VOLUME_NAME.to_string(),
                    source: projected_volume_source(),
                },
            );
            for container in pod_set.containers.iter_mut() {
                upsert_mount(
                    &mut container.volume_mounts,
                    VolumeMount {
                        name: VOLUME_NAME.to_string(),
                        mount_path: MOUNT_PATH.to_string(),
                        read_only: true,
                    },
                );
                upsert_envs(
                    &mut container.env,
                    [
                        EnvVar::new("KUBEFLOW_TRAINER_STATUS_URL", &url),
                        EnvVar::new(
                            "KUBEFLOW_TRAINER_STATUS_CA_CERT",
                            format!("{MOUNT_PATH}/ca.crt"),
                        ),
                        EnvVar::new(
                            "KUBEFLOW_TRAINER_STATUS_TOKEN",
                            format!("{MOUNT_PATH}/token"),
                        ),
                    ],
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::info::{ContainerSpec, PodSet, RuntimePolicy};
    use common::model::{MLPolicySource, RuntimeKind, RuntimeRef, TrainJobSpec};
    use kube::core::ObjectMeta;
    use std::collections::BTreeMap;

    fn trainer_pod_set() -> PodSet {
        PodSet {
            name: "node".to_string(),
            ancestor: Some(PodSetAncestor::Trainer),
            count: 1,
            containers: vec![ContainerSpec {
                name: "trainer".to_string(),
                ..Default::default()
            }],
            init_containers: vec![],
            volumes: vec![],
            per_pod_resource_request: BTreeMap::new(),
        }
    }

    fn train_job() -> TrainJob {
        TrainJob {
            metadata: ObjectMeta::default(),
            spec: TrainJobSpec {
                runtime_ref: RuntimeRef {
                    name: "r".to_string(),
                    kind: RuntimeKind::TrainingRuntime,
                },
                trainer: None,
                initializer: None,
                pod_spec_overrides: vec![],
                suspend: false,
                active_deadline_seconds: None,
            },
            status: None,
        }
    }

    #[test]
    fn injects_url_and_mount_into_trainer_only() {
        let mut info = Info::seed(
            "t1",
            "ns1",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::Torch(Default::default()),
                pod_group_policy_source: None,
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![trainer_pod_set()],
        );
        ProgressPlugin
            .enforce_ml_policy(&mut info, &train_job())
            .unwrap();

        let trainer = info.template_spec.trainer_pod_set().unwrap();
        assert_eq!(trainer.volumes.len(), 1);
        assert_eq!(trainer.volumes[0].name, VOLUME_NAME);
        let container = &trainer.containers[0];
        assert_eq!(container.volume_mounts.len(), 1);
        let url = container
            .env
            .iter()
            .find(|e| e.name == "KUBEFLOW_TRAINER_STATUS_URL")
            .unwrap();
        assert_eq!(url.value, "https://progress-server.ns1.svc/apis/trainer.kubeflow.org/v1alpha1/namespaces/ns1/trainjobs/t1/status");
        assert_eq!(
            info.scheduler.pod_labels.get(TRAINJOB_NAME_LABEL).unwrap(),
            "t1"
        );
    }

    #[test]
    fn running_plugin_twice_is_idempotent() {
        let mut info = Info::seed(
            "t1",
            "ns1",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::Torch(Default::default()),
                pod_group_policy_source: None,
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![trainer_pod_set()],
        );
        ProgressPlugin
            .enforce_ml_policy(&mut info, &train_job())
            .unwrap();
        let first = info.template_spec.trainer_pod_set().unwrap().containers[0].clone();
        ProgressPlugin
            .enforce_ml_policy(&mut info, &train_job())
            .unwrap();
        let second = info.template_spec.trainer_pod_set().unwrap().containers[0].clone();
        assert_eq!(first, second);
    }
}
