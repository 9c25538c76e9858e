//! The eight plugin capabilities the reconciler calls into.
//! Grounded directly on `libscheduler::plugins`: a marker `Plugin` trait,
//! one capability trait per concern, `Status`/`Code`-style error reporting
//! so a failing plugin can be attributed by name.

use common::model::{Condition, RuntimeSpec, TrainJob};
use common::{ApplyConfiguration, Info};
use std::collections::BTreeMap;
use thiserror::Error;

/// Every plugin implements this; capability traits are additionally
/// implemented depending on what the plugin contributes.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("[{plugin}] reserved environment variable {name:?} may not be set by the user")]
    ReservedEnvForbidden { plugin: &'static str, name: String },
    #[error("[{plugin}] invalid TrainJob: {message}")]
    InvalidTrainJob { plugin: &'static str, message: String },
    #[error("[{plugin}] {message}")]
    Internal { plugin: &'static str, message: String },
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Mutates `Info` in place; may add env, ports, volumes, mounts to the
/// trainer pod-set. Called in registry order.
pub trait EnforceMlPolicy: Plugin {
    fn enforce_ml_policy(&self, info: &mut Info, train_job: &TrainJob) -> PluginResult<()>;
}

/// Stamps `Info.Scheduler.PodLabels` to expose the job to the selected
/// gang-scheduler.
pub trait EnforcePodGroupPolicy: Plugin {
    fn enforce_pod_group_policy(&self, info: &mut Info, train_job: &TrainJob) -> PluginResult<()>;
}

/// Computes per-pod DNS endpoints based on the JobSet naming convention.
pub trait IdentifyPodNetwork: Plugin {
    fn identify_pod_network(&self, info: &mut Info) -> PluginResult<()>;
}

/// Pure function `(Info, TrainJob) -> Vec<ApplyConfiguration>`. MUST NOT
/// mutate `Info`: the trait only ever hands out `&Info`.
pub trait ComponentBuilder: Plugin {
    fn build(
        &self,
        info: &Info,
        train_job: &TrainJob,
    ) -> PluginResult<Vec<ApplyConfiguration>>;
}

#[derive(Debug, Clone, Default)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<FieldError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Pure function returning structured field errors + warnings; invoked
/// from the admission webhook.
pub trait CustomValidation: Plugin {
    fn validate(&self, train_job: &TrainJob, runtime: &RuntimeSpec) -> ValidationResult;
}

/// Per-replicated-job status counters plus the raw downstream conditions
/// the reconciler observed on the JobSet, handed to `TerminalCondition`
/// and `TrainJobStatus` plugins.
#[derive(Debug, Clone, Default)]
pub struct ChildStatusSnapshot {
    pub replicated_jobs: BTreeMap<String, ReplicatedJobCounters>,
    pub job_set_conditions: Vec<DownstreamCondition>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicatedJobCounters {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub suspended: i32,
}

#[derive(Debug, Clone)]
pub struct DownstreamCondition {
    pub type_: String,
    pub status_true: bool,
}

/// Maps downstream JobSet conditions to `TrainJob` terminal conditions.
pub trait TerminalCondition: Plugin {
    fn terminal_condition(&self, snapshot: &ChildStatusSnapshot) -> Option<Condition>;
}

#[derive(Debug, Clone)]
pub struct WatchDeclaration {
    pub group: String,
    pub kind: String,
}

/// Declares extra watches the controller must register to trigger
/// reconciliation.
pub trait WatchExtension: Plugin {
    fn watches(&self) -> Vec<WatchDeclaration>;
}

/// Derives a synthesized `TrainJob.status` from aggregated child-job
/// status counters.
pub trait TrainJobStatusPlugin: Plugin {
    fn synthesize_status(
        &self,
        snapshot: &ChildStatusSnapshot,
    ) -> BTreeMap<String, common::model::ReplicatedJobStatus>;
}
