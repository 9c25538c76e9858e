//! XGBoost ML-policy plugin.
//!
//! Reserves `DMLC_*` env names, rejecting user-supplied values for them at
//! admission. Computes `numWorkersPerNode` from GPU resources on trainer
//! containers (runtime default, overridden by
//! `TrainJob.trainer.resourcesPerNode`). Emits `DMLC_TRACKER_URI`,
//! `DMLC_TRACKER_PORT`, `DMLC_TASK_ID` (from completion index),
//! `DMLC_NUM_WORKER = numNodes * numWorkersPerNode`, plus a container port.

use crate::capability::{
    CustomValidation, EnforceMlPolicy, FieldError, Plugin, PluginError, PluginResult,
    ValidationResult,
};
use common::apply::{upsert_envs, upsert_port};
use common::model::{ContainerPort, EnvVar, MLPolicySource, RuntimeSpec, TrainJob};
use common::Info;

pub struct XgBoostPlugin;

const NAME: &str = "XGBoost";
const RESERVED_PREFIX: &str = "DMLC_";

impl Plugin for XgBoostPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

fn gpu_quantity(resources_per_node: &std::collections::BTreeMap<String, String>) -> Option<i32> {
    resources_per_node.iter().find_map(|(key, value)| {
        if key.to_lowercase().contains("gpu") {
            value.parse::<i32>().ok()
        } else {
            None
        }
    })
}

impl EnforceMlPolicy for XgBoostPlugin {
    fn enforce_ml_policy(&self, info: &mut Info, train_job: &TrainJob) -> PluginResult<()> {
        let policy = match info.runtime_policy.as_ref().map(|p| &p.ml_policy_source) {
            Some(MLPolicySource::XgBoost(p)) => p.clone(),
            _ => return Ok(()),
        };

        let trainer_override = train_job.spec.trainer.as_ref();
        if let Some(num_nodes) = trainer_override.and_then(|t| t.num_nodes) {
            if let Some(trainer) = info.template_spec.trainer_pod_set_mut() {
                trainer.count = num_nodes;
            }
        } else if let Some(trainer) = info.template_spec.trainer_pod_set_mut() {
            trainer.count = policy.num_nodes.max(trainer.count);
        }

        let num_workers_per_node = trainer_override
            .and_then(|t| gpu_quantity(&t.resources_per_node))
            .unwrap_or(policy.num_workers_per_node);

        let job_name = info.train_job_name.clone();
        let subdomain = info.subdomain.clone();
        let Some(trainer) = info.template_spec.trainer_pod_set_mut() else {
            return Ok(());
        };
        let num_nodes = trainer.count;
        let tracker_uri = trainer.rank_zero_endpoint(&job_name, &subdomain);
        let num_worker = num_nodes * num_workers_per_node;

        for container in trainer.containers.iter_mut() {
            upsert_envs(
                &mut container.env,
                [
                    EnvVar::new("DMLC_TRACKER_URI", &tracker_uri),
                    EnvVar::new("DMLC_TRACKER_PORT", policy.tracker_port.to_string()),
                    EnvVar::from_completion_index("DMLC_TASK_ID"),
                    EnvVar::new("DMLC_NUM_WORKER", num_worker.to_string()),
                ],
            );
            upsert_port(
                &mut container.ports,
                ContainerPort {
                    container_port: policy.tracker_port as i32,
                    name: Some("dmlc-tracker".to_string()),
                },
            );
        }
        Ok(())
    }
}

impl CustomValidation for XgBoostPlugin {
    fn validate(&self, train_job: &TrainJob, _runtime: &RuntimeSpec) -> ValidationResult {
        let mut result = ValidationResult::default();
        if let Some(trainer) = train_job.spec.trainer.as_ref() {
            for env in &trainer.env {
                if env.name.starts_with(RESERVED_PREFIX) {
                    result.errors.push(FieldError {
                        field: format!("spec.trainer.env[{}]", env.name),
                        message: PluginError::ReservedEnvForbidden {
                            plugin: NAME,
                            name: env.name.clone(),
                        }
                        .to_string(),
                    });
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::info::{ContainerSpec, PodSet, RuntimePolicy};
    use common::model::{PodSetAncestor, RuntimeKind, RuntimeRef, TrainJobSpec, TrainJobStatus, TrainerOverride, XgBoostPolicy};
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

    #[test]
    fn xgboost_with_gpus_seed_scenario() {
        let mut info = Info::seed(
            "gpu-job",
            "default",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::XgBoost(XgBoostPolicy::default()),
                pod_group_policy_source: None,
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![trainer_pod_set()],
        );
        let train_job = TrainJob {
            metadata: ObjectMeta {
                name: Some("gpu-job".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: TrainJobSpec {
                runtime_ref: RuntimeRef {
                    name: "xgboost-gpu".to_string(),
                    kind: RuntimeKind::TrainingRuntime,
                },
                trainer: Some(TrainerOverride {
                    num_nodes: Some(2),
                    resources_per_node: BTreeMap::from([(
                        "example.com/gpu".to_string(),
                        "4".to_string(),
                    )]),
                    ..Default::default()
                }),
                initializer: None,
                pod_spec_overrides: vec![],
                suspend: false,
                active_deadline_seconds: None,
            },
            status: Some(TrainJobStatus::default()),
        };

        XgBoostPlugin.enforce_ml_policy(&mut info, &train_job).unwrap();

        let trainer = info.template_spec.trainer_pod_set().unwrap();
        let env = &trainer.containers[0].env;
        let get = |n: &str| env.iter().find(|e| e.name == n).unwrap().value.clone();
        assert_eq!(get("DMLC_NUM_WORKER"), "8");
        assert_eq!(get("DMLC_TRACKER_URI"), "gpu-job-node-0-0.gpu-job");
        assert_eq!(get("DMLC_TRACKER_PORT"), "29500");
    }

    #[test]
    fn validation_rejects_user_supplied_dmlc_env() {
        let train_job = TrainJob {
            metadata: ObjectMeta::default(),
            spec: TrainJobSpec {
                runtime_ref: RuntimeRef {
                    name: "xgboost-gpu".to_string(),
                    kind: RuntimeKind::TrainingRuntime,
                },
                trainer: Some(TrainerOverride {
                    env: vec![EnvVar::new("DMLC_NUM_WORKER", "99")],
                    ..Default::default()
                }),
                initializer: None,
                pod_spec_overrides: vec![],
                suspend: false,
                active_deadline_seconds: None,
            },
            status: None,
        };
        let runtime = RuntimeSpec {
            ml_policy: MLPolicySource::XgBoost(XgBoostPolicy::default()),
            pod_group_policy: None,
            job_set_template: common::model::JobSetTemplate {
                replicated_jobs: vec![],
                subdomain: None,
            },
            ttl_seconds_after_finished: None,
            active_deadline_seconds: None,
        };
        let result = XgBoostPlugin.validate(&train_job, &runtime);
        assert!(!result.is_valid());
    }
}
