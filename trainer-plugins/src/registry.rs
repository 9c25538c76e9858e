//! Typed registry of plugins partitioned by capability, composed in
//! fixed dependency order. Grounded directly on
//! `libscheduler::plugins::Registry`: one `Vec<Arc<dyn Trait>>` per
//! capability, a `Default` impl that wires in every concrete plugin this
//! workspace ships.

use crate::capability::{
    ComponentBuilder, CustomValidation, EnforceMlPolicy, EnforcePodGroupPolicy,
    IdentifyPodNetwork, PluginResult, TerminalCondition, TrainJobStatusPlugin, WatchExtension,
};
use crate::jobset::JobSetPlugin;
use crate::ml_policy::{flux::FluxPlugin, jax::JaxPlugin, mpi::MpiPlugin, torch::TorchPlugin, xgboost::XgBoostPlugin};
use crate::progress::ProgressPlugin;
use crate::scheduling::{coscheduling::CoschedulingPlugin, kai::KaiPlugin, volcano::VolcanoPlugin};
use common::model::TrainJob;
use common::{ApplyConfiguration, Info};
use std::sync::Arc;

/// Capability-partitioned plugin set. The framework short-circuits
/// capabilities no registered plugin implements.
#[derive(Clone)]
pub struct Registry {
    pub enforce_ml_policy: Vec<Arc<dyn EnforceMlPolicy>>,
    pub enforce_pod_group_policy: Vec<Arc<dyn EnforcePodGroupPolicy>>,
    pub identify_pod_network: Vec<Arc<dyn IdentifyPodNetwork>>,
    pub component_builder: Vec<Arc<dyn ComponentBuilder>>,
    pub custom_validation: Vec<Arc<dyn CustomValidation>>,
    pub terminal_condition: Vec<Arc<dyn TerminalCondition>>,
    pub watch_extension: Vec<Arc<dyn WatchExtension>>,
    pub train_job_status: Vec<Arc<dyn TrainJobStatusPlugin>>,
}

impl Default for Registry {
    fn default() -> Self {
        let torch = Arc::new(TorchPlugin);
        let mpi = Arc::new(MpiPlugin);
        let xgboost = Arc::new(XgBoostPlugin);
        let jax = Arc::new(JaxPlugin);
        let flux = Arc::new(FluxPlugin);

        let volcano = Arc::new(VolcanoPlugin);
        let coscheduling = Arc::new(CoschedulingPlugin);
        let kai = Arc::new(KaiPlugin);

        let jobset = Arc::new(JobSetPlugin);
        let progress = Arc::new(ProgressPlugin);

        Self {
            enforce_ml_policy: vec![
                torch.clone(),
                mpi.clone(),
                xgboost.clone(),
                jax.clone(),
                flux.clone(),
                progress.clone(),
            ],
            enforce_pod_group_policy: vec![volcano.clone(), coscheduling.clone(), kai.clone()],
            identify_pod_network: vec![jobset.clone()],
            component_builder: vec![
                jobset.clone(),
                volcano.clone(),
                coscheduling.clone(),
                kai.clone(),
                mpi.clone(),
                flux.clone(),
            ],
            custom_validation: vec![jobset.clone(), flux.clone(), xgboost.clone()],
            terminal_condition: vec![jobset.clone()],
            watch_extension: vec![jobset.clone(), volcano.clone()],
            train_job_status: vec![jobset.clone()],
        }
    }
}

/// Runs the fixed-order rendering sequence against an already-seeded
/// `Info`, returning the collected apply-configurations. Every plugin in
/// this call chain must be re-entrant: running the same `(Info,
/// TrainJob)` through it twice must produce byte-identical output.
pub fn render(
    registry: &Registry,
    info: &mut Info,
    train_job: &TrainJob,
) -> PluginResult<Vec<ApplyConfiguration>> {
    for plugin in &registry.enforce_ml_policy {
        plugin.enforce_ml_policy(info, train_job)?;
    }
    for plugin in &registry.enforce_pod_group_policy {
        plugin.enforce_pod_group_policy(info, train_job)?;
    }
    for plugin in &registry.identify_pod_network {
        plugin.identify_pod_network(info)?;
    }
    let mut objects = Vec::new();
    for plugin in &registry.component_builder {
        objects.extend(plugin.build(info, train_job)?);
    }
    Ok(objects)
}
