//! MPI ML-policy plugin.
//!
//! Designates a launcher pod-set and a set of worker pod-sets; materializes
//! a hostfile ConfigMap listing every worker endpoint with its slot count;
//! injects an SSH key Secret and mounts it on all pods; if
//! `runLauncherAsNode` is true, counts the launcher among trainer nodes.

use crate::capability::{ComponentBuilder, EnforceMlPolicy, Plugin, PluginResult};
use common::apply::{upsert_mount, upsert_volume};
use common::model::{MLPolicySource, PodSetAncestor, TrainJob, Volume, VolumeMount};
use common::{ApplyConfiguration, Info};
use sha2::{Digest, Sha256};

pub struct MpiPlugin;

const NAME: &str = "MPI";
const SSH_VOLUME: &str = "mpi-ssh-keys";
const SSH_MOUNT_PATH: &str = "/root/.ssh";

impl Plugin for MpiPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

impl EnforceMlPolicy for MpiPlugin {
    fn enforce_ml_policy(&self, info: &mut Info, train_job: &TrainJob) -> PluginResult<()> {
        let policy = match info.runtime_policy.as_ref().map(|p| &p.ml_policy_source) {
            Some(MLPolicySource::Mpi(p)) => p.clone(),
            _ => return Ok(()),
        };

        if let Some(num_nodes) = train_job.spec.trainer.as_ref().and_then(|t| t.num_nodes) {
            if let Some(trainer) = info.template_spec.trainer_pod_set_mut() {
                trainer.count = num_nodes;
            }
        } else if let Some(trainer) = info.template_spec.trainer_pod_set_mut() {
            trainer.count = policy.num_nodes.max(trainer.count);
        }

        let ssh_secret_name = format!("{}-mpi-ssh", info.train_job_name);
        for pod_set in info.template_spec.pod_sets.iter_mut() {
            if !matches!(
                pod_set.ancestor,
                Some(PodSetAncestor::Trainer) | Some(PodSetAncestor::Launcher)
            ) {
                continue;
            }
            upsert_volume(
                &mut pod_set.volumes,
                Volume {
                    name: SSH_VOLUME.to_string(),
                    source: serde_json::json!({"secret": {"secretName": ssh_secret_name}}),
                },
            );
            for container in pod_set.containers.iter_mut() {
                upsert_mount(
                    &mut container.volume_mounts,
                    VolumeMount {
                        name: SSH_VOLUME.to_string(),
                        mount_path: SSH_MOUNT_PATH.to_string(),
                        read_only: true,
                    },
                );
            }
        }

        Ok(())
    }
}

fn deterministic_ssh_key_material(train_job_uid: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"kubeflow-trainer-mpi-ssh-key-v1:");
    hasher.update(train_job_uid.as_bytes());
    hex::encode(hasher.finalize())
}

impl ComponentBuilder for MpiPlugin {
    fn build(&self, info: &Info, train_job: &TrainJob) -> PluginResult<Vec<ApplyConfiguration>> {
        let policy = match info.runtime_policy.as_ref().map(|p| &p.ml_policy_source) {
            Some(MLPolicySource::Mpi(p)) => p.clone(),
            _ => return Ok(vec![]),
        };

        let mut objects = Vec::new();

        let workers: Vec<_> = info
            .template_spec
            .pod_sets
            .iter()
            .filter(|p| p.ancestor == Some(PodSetAncestor::Trainer))
            .collect();
        let mut hostfile = String::new();
        for worker in &workers {
            for endpoint in worker.endpoints(&info.train_job_name, &info.subdomain) {
                hostfile.push_str(&format!("{endpoint} slots={}\n", policy.slots_per_worker));
            }
        }
        objects.push(ApplyConfiguration {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            name: format!("{}-mpi-hostfile", info.train_job_name),
            namespace: info.namespace.clone(),
            body: serde_json::json!({ "data": { "hostfile": hostfile } }),
        });

        let uid = train_job
            .metadata
            .uid
            .clone()
            .unwrap_or_else(|| info.train_job_name.clone());
        objects.push(ApplyConfiguration {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            name: format!("{}-mpi-ssh", info.train_job_name),
            namespace: info.namespace.clone(),
            body: serde_json::json!({
                "type": "Opaque",
                "stringData": { "id_ed25519": deterministic_ssh_key_material(&uid) }
            }),
        });

        Ok(objects)
    }
}
