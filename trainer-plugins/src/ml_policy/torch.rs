//! Torch ML-policy plugin.
//!
//! Injects the PyTorch `torchrun`/`torch.distributed.elastic` rendezvous
//! envelope: `PET_NNODES`, `PET_NPROC_PER_NODE`, `PET_NODE_RANK` (from the
//! Job completion-index annotation), `PET_MASTER_ADDR`
//! (`{trainJobName}-trainer-node-0-0.{trainJobName}`), `PET_MASTER_PORT`
//! (default `29500`). Sets the trainer pod-set count from
//! `TrainJob.trainer.numNodes`.

use crate::capability::{EnforceMlPolicy, Plugin, PluginError, PluginResult};
use common::apply::upsert_envs;
use common::model::{EnvVar, MLPolicySource, TrainJob};
use common::Info;

pub struct TorchPlugin;

const NAME: &str = "Torch";

impl Plugin for TorchPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

impl EnforceMlPolicy for TorchPlugin {
    fn enforce_ml_policy(&self, info: &mut Info, train_job: &TrainJob) -> PluginResult<()> {
        let policy = match info.runtime_policy.as_ref().map(|p| &p.ml_policy_source) {
            Some(MLPolicySource::Torch(p)) => p.clone(),
            _ => return Ok(()),
        };

        if let Some(num_nodes) = train_job
            .spec
            .trainer
            .as_ref()
            .and_then(|t| t.num_nodes)
        {
            if let Some(trainer) = info.template_spec.trainer_pod_set_mut() {
                trainer.count = num_nodes;
            }
        } else if let Some(trainer) = info.template_spec.trainer_pod_set_mut() {
            trainer.count = policy.num_nodes.max(trainer.count);
        }

        let job_name = info.train_job_name.clone();
        let subdomain = info.subdomain.clone();
        let Some(trainer) = info.template_spec.trainer_pod_set_mut() else {
            return Ok(());
        };
        let count = trainer.count;
        let master_addr = trainer.rank_zero_endpoint(&job_name, &subdomain);

        for container in trainer.containers.iter_mut() {
            upsert_envs(
                &mut container.env,
                [
                    EnvVar::new("PET_NNODES", count.to_string()),
                    EnvVar::new("PET_NPROC_PER_NODE", policy.num_proc_per_node.to_string()),
                    EnvVar::from_completion_index("PET_NODE_RANK"),
                    EnvVar::new("PET_MASTER_ADDR", &master_addr),
                    EnvVar::new("PET_MASTER_PORT", policy.master_port.to_string()),
                ],
            );
        }
        Ok(())
    }
}

#[allow(dead_code)]
fn reserved_env_error(name: &str) -> PluginError {
    PluginError::ReservedEnvForbidden {
        plugin: NAME,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::info::{ContainerSpec, PodSet, RuntimePolicy};
    use common::model::{PodSetAncestor, RuntimeRef, RuntimeKind, TrainJobSpec, TrainJobStatus, TrainerOverride};
    use kube::core::ObjectMeta;
    use std::collections::BTreeMap;

    fn trainer_pod_set(count: i32) -> PodSet {
        PodSet {
            name: "node".to_string(),
            ancestor: Some(PodSetAncestor::Trainer),
            count,
            containers: vec![ContainerSpec {
                name: "trainer".to_string(),
                ..Default::default()
            }],
            init_containers: vec![],
            volumes: vec![],
            per_pod_resource_request: BTreeMap::new(),
        }
    }

    fn train_job(name: &str, num_nodes: Option<i32>) -> TrainJob {
        TrainJob {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: TrainJobSpec {
                runtime_ref: RuntimeRef {
                    name: "torch-cpu".to_string(),
                    kind: RuntimeKind::TrainingRuntime,
                },
                trainer: num_nodes.map(|n| TrainerOverride {
                    num_nodes: Some(n),
                    ..Default::default()
                }),
                initializer: None,
                pod_spec_overrides: vec![],
                suspend: false,
                active_deadline_seconds: None,
            },
            status: Some(TrainJobStatus::default()),
        }
    }

    #[test]
    fn simple_torch_job_seed_scenario() {
        let mut info = Info::seed(
            "t1",
            "default",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::Torch(Default::default()),
                pod_group_policy_source: None,
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![trainer_pod_set(1)],
        );
        let train_job = train_job("t1", Some(2));

        TorchPlugin.enforce_ml_policy(&mut info, &train_job).unwrap();

        let trainer = info.template_spec.trainer_pod_set().unwrap();
        assert_eq!(trainer.count, 2);
        let container = &trainer.containers[0];
        let get = |n: &str| {
            container
                .env
                .iter()
                .find(|e| e.name == n)
                .unwrap()
                .value
                .clone()
        };
        assert_eq!(get("PET_NNODES"), "2");
        assert_eq!(get("PET_NPROC_PER_NODE"), "1");
        assert_eq!(get("PET_MASTER_ADDR"), "t1-node-0-0.t1");
        assert_eq!(get("PET_MASTER_PORT"), "29500");
    }

    #[test]
    fn running_plugin_twice_is_idempotent() {
        let mut info = Info::seed(
            "t1",
            "default",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::Torch(Default::default()),
                pod_group_policy_source: None,
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![trainer_pod_set(1)],
        );
        let train_job = train_job("t1", Some(2));
        TorchPlugin.enforce_ml_policy(&mut info, &train_job).unwrap();
        let first = info.template_spec.trainer_pod_set().unwrap().containers[0]
            .env
            .clone();
        TorchPlugin.enforce_ml_policy(&mut info, &train_job).unwrap();
        let second = info.template_spec.trainer_pod_set().unwrap().containers[0]
            .env
            .clone();
        assert_eq!(first, second);
    }

    #[test]
    fn no_override_keeps_runtime_default_node_count() {
        let mut info = Info::seed(
            "t1",
            "default",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::Torch(common::model::TorchPolicy {
                    num_nodes: 3,
                    ..Default::default()
                }),
                pod_group_policy_source: None,
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![trainer_pod_set(1)],
        );
        let train_job = train_job("t1", None);
        TorchPlugin.enforce_ml_policy(&mut info, &train_job).unwrap();
        assert_eq!(info.template_spec.trainer_pod_set().unwrap().count, 3);
    }
}
