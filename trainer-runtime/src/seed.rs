//! Builds the seed `Info` for a reconciliation: materializes pod-sets from
//! a runtime's raw JobSet template and layers the `TrainJob`'s own
//! trainer/initializer overrides on top.

use common::apply::{upsert_env, upsert_envs, upsert_mount, upsert_volume};
use common::info::{ContainerSpec, PodSet, RuntimePolicy};
use common::model::{
    EnvVar, PodSetAncestor, ReplicatedJobTemplate, RuntimeSpec, SourceRef, TrainJob, Volume,
    VolumeMount,
};
use common::resources::{aggregate_pod_requests, parse_quantity};
use common::Info;
use std::collections::BTreeMap;

const TRAINER_CONTAINER: &str = "trainer";
const DATASET_INITIALIZER_CONTAINER: &str = "dataset-initializer";
const MODEL_INITIALIZER_CONTAINER: &str = "model-initializer";

pub fn seed_info(
    train_job: &TrainJob,
    runtime: &RuntimeSpec,
    runtime_labels: BTreeMap<String, String>,
    runtime_annotations: BTreeMap<String, String>,
) -> Info {
    let runtime_policy = RuntimePolicy {
        ml_policy_source: runtime.ml_policy.clone(),
        pod_group_policy_source: runtime.pod_group_policy.clone(),
    };

    let pod_sets = runtime
        .job_set_template
        .replicated_jobs
        .iter()
        .map(build_pod_set)
        .collect();

    let name = train_job.metadata.name.clone().unwrap_or_default();
    let namespace = train_job.metadata.namespace.clone().unwrap_or_default();

    let mut info = Info::seed(
        &name,
        &namespace,
        runtime_policy,
        runtime_labels,
        runtime_annotations,
        pod_sets,
    );
    if let Some(subdomain) = runtime.job_set_template.subdomain.clone() {
        info.subdomain = subdomain;
    }

    let empty = BTreeMap::new();
    info.apply_trainjob_overrides(
        train_job.metadata.labels.as_ref().unwrap_or(&empty),
        train_job.metadata.annotations.as_ref().unwrap_or(&empty),
    );

    apply_trainer_override(&mut info, train_job);
    apply_initializer_override(&mut info, train_job);
    info
}

fn build_pod_set(tmpl: &ReplicatedJobTemplate) -> PodSet {
    let containers_raw = tmpl
        .pod_spec
        .get("containers")
        .cloned()
        .unwrap_or(serde_json::Value::Array(vec![]));
    let init_containers_raw = tmpl
        .pod_spec
        .get("initContainers")
        .cloned()
        .unwrap_or(serde_json::Value::Array(vec![]));
    let volumes_raw = tmpl
        .pod_spec
        .get("volumes")
        .cloned()
        .unwrap_or(serde_json::Value::Array(vec![]));

    let containers: Vec<ContainerSpec> =
        serde_json::from_value(containers_raw.clone()).unwrap_or_default();
    let init_containers: Vec<ContainerSpec> =
        serde_json::from_value(init_containers_raw.clone()).unwrap_or_default();
    let volumes: Vec<Volume> = serde_json::from_value(volumes_raw).unwrap_or_default();

    let per_pod_resource_request = aggregate_pod_requests(
        &extract_requests(&containers_raw),
        &extract_requests(&init_containers_raw),
    );

    PodSet {
        name: tmpl.name.clone(),
        ancestor: tmpl.ancestor,
        count: tmpl.count,
        containers,
        init_containers,
        volumes,
        per_pod_resource_request,
    }
}

fn extract_requests(containers_json: &serde_json::Value) -> Vec<BTreeMap<String, i64>> {
    containers_json
        .as_array()
        .map(|containers| {
            containers
                .iter()
                .map(|container| {
                    let mut requests = BTreeMap::new();
                    if let Some(object) = container
                        .get("resources")
                        .and_then(|r| r.get("requests"))
                        .and_then(|r| r.as_object())
                    {
                        for (resource, qty) in object {
                            if let Some(raw) = qty.as_str() {
                                if let Ok(parsed) = parse_quantity(raw) {
                                    requests.insert(resource.clone(), parsed);
                                }
                            }
                        }
                    }
                    requests
                })
                .collect()
        })
        .unwrap_or_default()
}

/// image/command/args/env/resourcesPerNode overrides apply to the trainer
/// container only; `numNodes` is handled per-framework by the
/// `EnforceMlPolicy` plugins since each framework derives a different set
/// of env vars from the final node count.
fn apply_trainer_override(info: &mut Info, train_job: &TrainJob) {
    let Some(over) = train_job.spec.trainer.as_ref() else {
        return;
    };
    let Some(trainer) = info.template_spec.trainer_pod_set_mut() else {
        return;
    };

    if let Some(container) = trainer.container_mut(TRAINER_CONTAINER) {
        if let Some(image) = &over.image {
            container.image = image.clone();
        }
        if !over.command.is_empty() {
            container.command = over.command.clone();
        }
        if !over.args.is_empty() {
            container.args = over.args.clone();
        }
        upsert_envs(&mut container.env, over.env.clone());
        if !over.resources_per_node.is_empty() {
            container.resources = serde_json::json!({ "requests": over.resources_per_node });
        }
    }

    if !over.resources_per_node.is_empty() {
        let mut requests = BTreeMap::new();
        for (resource, raw) in &over.resources_per_node {
            if let Ok(parsed) = parse_quantity(raw) {
                requests.insert(resource.clone(), parsed);
            }
        }
        trainer.per_pod_resource_request = requests;
    }
}

fn apply_initializer_override(info: &mut Info, train_job: &TrainJob) {
    let Some(init) = train_job.spec.initializer.as_ref() else {
        return;
    };
    if let Some(dataset) = &init.dataset {
        apply_source_ref(
            info,
            PodSetAncestor::DatasetInitializer,
            DATASET_INITIALIZER_CONTAINER,
            "DATASET_URI",
            dataset,
        );
    }
    if let Some(model) = &init.model {
        apply_source_ref(
            info,
            PodSetAncestor::ModelInitializer,
            MODEL_INITIALIZER_CONTAINER,
            "MODEL_URI",
            model,
        );
    }
}

fn apply_source_ref(
    info: &mut Info,
    ancestor: PodSetAncestor,
    container_name: &str,
    uri_env: &str,
    source: &SourceRef,
) {
    let Some(pod_set) = info
        .template_spec
        .pod_sets
        .iter_mut()
        .find(|p| p.ancestor == Some(ancestor))
    else {
        return;
    };

    if let Some(secret_ref) = &source.secret_ref {
        let volume_name = format!("{container_name}-credentials");
        upsert_volume(
            &mut pod_set.volumes,
            Volume {
                name: volume_name.clone(),
                source: serde_json::json!({"secret": {"secretName": secret_ref}}),
            },
        );
        if let Some(container) = pod_set.container_mut(container_name) {
            upsert_mount(
                &mut container.volume_mounts,
                VolumeMount {
                    name: volume_name,
                    mount_path: "/var/run/secrets/trainer.kubeflow.org/initializer".to_string(),
                    read_only: true,
                },
            );
        }
    }

    if let Some(container) = pod_set.container_mut(container_name) {
        upsert_env(&mut container.env, EnvVar::new(uri_env, source.uri.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::{
        ClusterTrainingRuntimeSpec, InitializerOverride, JobSetTemplate, MLPolicySource,
        RuntimeKind, RuntimeRef, TorchPolicy, TrainJobSpec, TrainerOverride,
    };
    use kube::core::ObjectMeta;

    fn runtime() -> RuntimeSpec {
        RuntimeSpec {
            ml_policy: MLPolicySource::Torch(TorchPolicy::default()),
            pod_group_policy: None,
            job_set_template: JobSetTemplate {
                replicated_jobs: vec![
                    ReplicatedJobTemplate {
                        name: "node".to_string(),
                        ancestor: Some(PodSetAncestor::Trainer),
                        count: 1,
                        pod_spec: serde_json::json!({
                            "containers": [{
                                "name": "trainer",
                                "image": "pytorch:2.3",
                                "resources": {"requests": {"cpu": "1", "memory": "2Gi"}},
                            }]
                        }),
                    },
                    ReplicatedJobTemplate {
                        name: "dataset-initializer".to_string(),
                        ancestor: Some(PodSetAncestor::DatasetInitializer),
                        count: 1,
                        pod_spec: serde_json::json!({
                            "containers": [{"name": "dataset-initializer", "image": "initializer:latest"}]
                        }),
                    },
                ],
                subdomain: None,
            },
            ttl_seconds_after_finished: None,
            active_deadline_seconds: None,
        }
    }

    fn train_job() -> TrainJob {
        TrainJob {
            metadata: ObjectMeta {
                name: Some("t1".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: TrainJobSpec {
                runtime_ref: RuntimeRef {
                    name: "torch".to_string(),
                    kind: RuntimeKind::TrainingRuntime,
                },
                trainer: Some(TrainerOverride {
                    image: Some("pytorch:2.4".to_string()),
                    resources_per_node: BTreeMap::from([("cpu".to_string(), "2".to_string())]),
                    ..Default::default()
                }),
                initializer: Some(InitializerOverride {
                    dataset: Some(SourceRef {
                        uri: "s3://bucket/dataset".to_string(),
                        secret_ref: Some("dataset-creds".to_string()),
                    }),
                    model: None,
                }),
                pod_spec_overrides: vec![],
                suspend: false,
                active_deadline_seconds: None,
            },
            status: None,
        }
    }

    #[test]
    fn seeds_pod_sets_and_applies_overrides() {
        let info = seed_info(&train_job(), &runtime(), BTreeMap::new(), BTreeMap::new());

        let trainer = info.template_spec.trainer_pod_set().unwrap();
        assert_eq!(trainer.per_pod_resource_request["cpu"], 2000);
        let container = trainer.containers.iter().find(|c| c.name == "trainer").unwrap();
        assert_eq!(container.image, "pytorch:2.4");

        let initializer = info
            .template_spec
            .pod_sets
            .iter()
            .find(|p| p.ancestor == Some(PodSetAncestor::DatasetInitializer))
            .unwrap();
        let container = initializer
            .containers
            .iter()
            .find(|c| c.name == "dataset-initializer")
            .unwrap();
        assert_eq!(
            container
                .env
                .iter()
                .find(|e| e.name == "DATASET_URI")
                .unwrap()
                .value,
            "s3://bucket/dataset"
        );
        assert_eq!(initializer.volumes.len(), 1);
    }

    #[test]
    fn uses_cluster_training_runtime_kind_consistently() {
        // Documents that ClusterTrainingRuntimeSpec shares the same
        // flattened RuntimeSpec shape used throughout this module.
        let cluster_spec = ClusterTrainingRuntimeSpec { template: runtime() };
        assert!(matches!(
            cluster_spec.template.ml_policy,
            MLPolicySource::Torch(_)
        ));
    }
}
