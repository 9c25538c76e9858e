//! Flux ML-policy plugin.
//!
//! Emits a per-TrainJob entrypoint ConfigMap (init + entrypoint scripts), a
//! deterministic ZeroMQ CURVE keypair encoded in Z85 and derived via X25519
//! from the `TrainJob` UID (same UID -> same cert, so re-reconciliation
//! never rotates keys mid-run), injects a `flux-installer` init-container,
//! and rewrites the trainer command to the generated entrypoint. Validation
//! forbids users from defining an init-container named `flux-installer`
//! and from overriding reserved view settings via env.

use crate::capability::{
    ComponentBuilder, CustomValidation, EnforceMlPolicy, FieldError, Plugin, PluginResult,
    ValidationResult,
};
use common::model::{MLPolicySource, RuntimeSpec, TrainJob};
use common::{ApplyConfiguration, ContainerSpec, Info};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

pub struct FluxPlugin;

const NAME: &str = "Flux";
pub const RESERVED_INIT_CONTAINER: &str = "flux-installer";
const RESERVED_ENV_PREFIX: &str = "FLUX_VIEW_";

impl Plugin for FluxPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

/// Derives a fixed CURVE keypair from the `TrainJob` UID: SHA-256 of the
/// UID seeds an X25519 `StaticSecret`, whose public key is the CURVE
/// public half. Both halves are Z85-encoded.
pub fn derive_curve_keypair(train_job_uid: &str) -> (String, String) {
    let mut hasher = Sha256::new();
    hasher.update(b"kubeflow-trainer-flux-curve-v1:");
    hasher.update(train_job_uid.as_bytes());
    let seed: [u8; 32] = hasher.finalize().into();
    let secret = StaticSecret::from(seed);
    let public = PublicKey::from(&secret);
    let secret_z85 = z85::encode(secret.to_bytes());
    let public_z85 = z85::encode(public.to_bytes());
    (secret_z85, public_z85)
}

impl EnforceMlPolicy for FluxPlugin {
    fn enforce_ml_policy(&self, info: &mut Info, train_job: &TrainJob) -> PluginResult<()> {
        let policy = match info.runtime_policy.as_ref().map(|p| &p.ml_policy_source) {
            Some(MLPolicySource::Flux(p)) => p.clone(),
            _ => return Ok(()),
        };

        if let Some(num_nodes) = train_job.spec.trainer.as_ref().and_then(|t| t.num_nodes) {
            if let Some(trainer) = info.template_spec.trainer_pod_set_mut() {
                trainer.count = num_nodes;
            }
        } else if let Some(trainer) = info.template_spec.trainer_pod_set_mut() {
            trainer.count = policy.num_nodes.max(trainer.count);
        }

        let Some(trainer) = info.template_spec.trainer_pod_set_mut() else {
            return Ok(());
        };

        if !trainer
            .init_containers
            .iter()
            .any(|c| c.name == RESERVED_INIT_CONTAINER)
        {
            trainer.init_containers.push(ContainerSpec {
                name: RESERVED_INIT_CONTAINER.to_string(),
                image: "ghcr.io/kubeflow/flux-installer:latest".to_string(),
                ..Default::default()
            });
        }

        for container in trainer.containers.iter_mut() {
            container.command = vec!["/etc/flux/entrypoint.sh".to_string()];
        }
        Ok(())
    }
}

impl ComponentBuilder for FluxPlugin {
    fn build(&self, info: &Info, train_job: &TrainJob) -> PluginResult<Vec<ApplyConfiguration>> {
        if !matches!(
            info.runtime_policy.as_ref().map(|p| &p.ml_policy_source),
            Some(MLPolicySource::Flux(_))
        ) {
            return Ok(vec![]);
        }

        let uid = train_job
            .metadata
            .uid
            .clone()
            .unwrap_or_else(|| info.train_job_name.clone());
        let (secret_key, public_key) = derive_curve_keypair(&uid);

        let init_script = format!(
            "#!/bin/sh\nset -e\nflux keygen --curve-secret={secret_key} --curve-public={public_key}\n"
        );
        let entrypoint_script =
            "#!/bin/sh\nset -e\nexec flux start flux broker --config /etc/flux/config.toml\n"
                .to_string();

        Ok(vec![ApplyConfiguration {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            name: format!("{}-flux-entrypoint", info.train_job_name),
            namespace: info.namespace.clone(),
            body: serde_json::json!({
                "data": {
                    "init.sh": init_script,
                    "entrypoint.sh": entrypoint_script,
                }
            }),
        }])
    }
}

impl CustomValidation for FluxPlugin {
    fn validate(&self, train_job: &TrainJob, runtime: &RuntimeSpec) -> ValidationResult {
        let mut result = ValidationResult::default();
        if !matches!(runtime.ml_policy, MLPolicySource::Flux(_)) {
            return result;
        }

        for job in &runtime.job_set_template.replicated_jobs {
            if let Some(containers) = job.pod_spec.get("initContainers").and_then(|v| v.as_array())
            {
                for c in containers {
                    if c.get("name").and_then(|n| n.as_str()) == Some(RESERVED_INIT_CONTAINER) {
                        result.errors.push(FieldError {
                            field: format!("jobSetTemplate.replicatedJobs[{}].podSpec.initContainers", job.name),
                            message: format!(
                                "init-container name {RESERVED_INIT_CONTAINER:?} is reserved by the Flux runtime"
                            ),
                        });
                    }
                }
            }
        }

        if let Some(trainer) = train_job.spec.trainer.as_ref() {
            for env in &trainer.env {
                if env.name.starts_with(RESERVED_ENV_PREFIX) {
                    result.errors.push(FieldError {
                        field: format!("spec.trainer.env[{}]", env.name),
                        message: format!(
                            "{RESERVED_ENV_PREFIX}* environment variables are reserved by the Flux runtime view"
                        ),
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

    #[test]
    fn curve_keypair_is_deterministic_per_uid() {
        let (s1, p1) = derive_curve_keypair("11111111-1111-1111-1111-111111111111");
        let (s2, p2) = derive_curve_keypair("11111111-1111-1111-1111-111111111111");
        assert_eq!(s1, s2);
        assert_eq!(p1, p2);

        let (s3, _) = derive_curve_keypair("22222222-2222-2222-2222-222222222222");
        assert_ne!(s1, s3);
    }
}
