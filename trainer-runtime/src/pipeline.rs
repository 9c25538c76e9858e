//! Ties runtime resolution, `Info` seeding, and the plugin pipeline
//! together into the single call the reconciler makes each pass.

use crate::error::RuntimeResult;
use crate::registry::{ResolvedRuntime, RuntimeRegistry};
use crate::seed::seed_info;
use common::model::{RuntimeSpec, TrainJob};
use common::{ApplyConfiguration, Info};
use trainer_plugins::capability::ValidationResult;
use trainer_plugins::Registry;

pub struct Pipeline {
    runtimes: RuntimeRegistry,
    plugins: Registry,
}

impl Pipeline {
    pub fn new(runtimes: RuntimeRegistry) -> Self {
        Self {
            runtimes,
            plugins: Registry::default(),
        }
    }

    /// Resolves `train_job`'s runtime, seeds an `Info`, and runs it through
    /// the full plugin pipeline, returning the apply-configurations to
    /// reconcile against the cluster and the `Info` itself (the reconciler
    /// still needs pod-set names/ancestors to interpret child status).
    pub async fn plan(&self, train_job: &TrainJob) -> RuntimeResult<(Info, Vec<ApplyConfiguration>)> {
        let namespace = train_job.metadata.namespace.clone().unwrap_or_default();
        let resolved = self
            .runtimes
            .resolve(&train_job.spec.runtime_ref, &namespace)
            .await?;

        let mut info = seed_info(train_job, &resolved.spec, resolved.labels, resolved.annotations);
        let objects = trainer_plugins::render(&self.plugins, &mut info, train_job)?;
        Ok((info, objects))
    }

    /// Resolves just the runtime template, for callers that only need the
    /// `ttlSecondsAfterFinished`/`activeDeadlineSeconds` defaults (terminal
    /// TrainJob garbage collection).
    pub async fn resolve_runtime(
        &self,
        train_job: &TrainJob,
        namespace: &str,
    ) -> RuntimeResult<ResolvedRuntime> {
        self.runtimes.resolve(&train_job.spec.runtime_ref, namespace).await
    }

    /// Runs every `CustomValidation` plugin against a resolved runtime.
    /// This workspace has no standalone admission webhook server, so the
    /// reconciler calls this itself before rendering apply-configurations.
    pub fn validate(&self, train_job: &TrainJob, runtime: &RuntimeSpec) -> ValidationResult {
        let mut result = ValidationResult::default();
        for plugin in &self.plugins.custom_validation {
            result.merge(plugin.validate(train_job, runtime));
        }
        result
    }
}
