//! JAX ML-policy plugin.
//!
//! Emits `JAX_NUM_PROCESSES`, `JAX_PROCESS_ID`, `JAX_COORDINATOR_ADDRESS`,
//! `JAX_COORDINATOR_PORT`.

use crate::capability::{EnforceMlPolicy, Plugin, PluginResult};
use common::apply::upsert_envs;
use common::model::{EnvVar, MLPolicySource, TrainJob};
use common::Info;

pub struct JaxPlugin;

const NAME: &str = "JAX";

impl Plugin for JaxPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

impl EnforceMlPolicy for JaxPlugin {
    fn enforce_ml_policy(&self, info: &mut Info, train_job: &TrainJob) -> PluginResult<()> {
        let policy = match info.runtime_policy.as_ref().map(|p| &p.ml_policy_source) {
            Some(MLPolicySource::Jax(p)) => p.clone(),
            _ => return Ok(()),
        };

        if let Some(num_nodes) = train_job.spec.trainer.as_ref().and_then(|t| t.num_nodes) {
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
        let coordinator_address = trainer.rank_zero_endpoint(&job_name, &subdomain);

        for container in trainer.containers.iter_mut() {
            upsert_envs(
                &mut container.env,
                [
                    EnvVar::new("JAX_NUM_PROCESSES", count.to_string()),
                    EnvVar::from_completion_index("JAX_PROCESS_ID"),
                    EnvVar::new("JAX_COORDINATOR_ADDRESS", &coordinator_address),
                    EnvVar::new("JAX_COORDINATOR_PORT", policy.coordinator_port.to_string()),
                ],
            );
        }
        Ok(())
    }
}
