//! The user- and admin-facing data model: `TrainJob`, `TrainingRuntime`,
//! `ClusterTrainingRuntime`, and the status types they share.
//!
//! Field names use the same casing Kubernetes CRDs expect so `serde`
//! round-trips without custom renames beyond what `#[kube(...)]` already
//! emits.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which kind of runtime a `TrainJob` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RuntimeKind {
    TrainingRuntime,
    ClusterTrainingRuntime,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RuntimeRef {
    pub name: String,
    pub kind: RuntimeKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainerOverride {
    pub image: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    pub num_nodes: Option<i32>,
    /// Resource requests/limits applied to every trainer container on a
    /// single pod. Kept as raw quantity strings (e.g. `"4"`, `"16Gi"`) so
    /// this crate does not need to depend on `k8s-openapi`'s quantity
    /// parsing beyond what it re-exports.
    #[serde(default)]
    pub resources_per_node: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitializerOverride {
    pub dataset: Option<SourceRef>,
    pub model: Option<SourceRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub uri: String,
    pub secret_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            value_from: None,
        }
    }

    /// An env var sourced from the Job completion-index annotation, used
    /// by Torch (`PET_NODE_RANK`) and XGBoost (`DMLC_TASK_ID`) to derive
    /// per-pod rank from the pod's position in its replicated job.
    pub fn from_completion_index(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            value_from: Some(EnvVarSource::FieldRef {
                field_path: "metadata.annotations['batch.kubernetes.io/job-completion-index']"
                    .to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum EnvVarSource {
    FieldRef { field_path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContainerPort {
    pub container_port: i32,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Volume {
    pub name: String,
    /// Opaque volume-source payload (ConfigMap/Secret/projected/emptyDir);
    /// this crate does not need to discriminate it further.
    pub source: serde_json::Value,
}

/// `TrainJob.spec`.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "trainer.kubeflow.org",
    version = "v1alpha1",
    kind = "TrainJob",
    namespaced,
    status = "TrainJobStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TrainJobSpec {
    pub runtime_ref: RuntimeRef,
    #[serde(default)]
    pub trainer: Option<TrainerOverride>,
    #[serde(default)]
    pub initializer: Option<InitializerOverride>,
    #[serde(default)]
    pub pod_spec_overrides: Vec<serde_json::Value>,
    #[serde(default)]
    pub suspend: bool,
    pub active_deadline_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainJobStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub replicated_jobs_status: BTreeMap<String, ReplicatedJobStatus>,
    pub trainer_status: Option<TrainerStatus>,
    pub progression_status: Option<ProgressionStatus>,
}

/// Condition types a `TrainJob` can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    Created,
    Suspended,
    Running,
    Complete,
    Failed,
}

impl ConditionType {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConditionType::Complete | ConditionType::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub observed_generation: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedJobStatus {
    #[serde(default)]
    pub active: i32,
    #[serde(default)]
    pub succeeded: i32,
    #[serde(default)]
    pub failed: i32,
    #[serde(default)]
    pub suspended: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainerStatus {
    pub progress_percentage: Option<i32>,
    pub estimated_remaining_seconds: Option<i32>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metric {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionStatus {
    pub last_progress_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------
// Runtime templates
// ---------------------------------------------------------------------

/// Discriminated union over framework-specific ML policy sources.
/// Modelled as a tagged enum rather than a struct of `Option`s so no code
/// path can ever observe two variants set at once.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MLPolicySource {
    Torch(TorchPolicy),
    Mpi(MpiPolicy),
    XgBoost(XgBoostPolicy),
    Jax(JaxPolicy),
    Flux(FluxPolicy),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TorchPolicy {
    #[serde(default)]
    pub num_nodes: i32,
    #[serde(default = "default_master_port")]
    pub master_port: u16,
    #[serde(default = "default_nproc_per_node")]
    pub num_proc_per_node: i32,
}

impl Default for TorchPolicy {
    fn default() -> Self {
        Self {
            num_nodes: 1,
            master_port: default_master_port(),
            num_proc_per_node: default_nproc_per_node(),
        }
    }
}

fn default_master_port() -> u16 {
    29500
}

fn default_nproc_per_node() -> i32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MpiPolicy {
    #[serde(default)]
    pub num_nodes: i32,
    #[serde(default)]
    pub run_launcher_as_node: bool,
    #[serde(default = "default_mpi_slots")]
    pub slots_per_worker: i32,
}

fn default_mpi_slots() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct XgBoostPolicy {
    #[serde(default)]
    pub num_nodes: i32,
    #[serde(default = "default_xgb_workers_per_node")]
    pub num_workers_per_node: i32,
    #[serde(default = "default_master_port")]
    pub tracker_port: u16,
}

impl Default for XgBoostPolicy {
    fn default() -> Self {
        Self {
            num_nodes: 1,
            num_workers_per_node: default_xgb_workers_per_node(),
            tracker_port: default_master_port(),
        }
    }
}

fn default_xgb_workers_per_node() -> i32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JaxPolicy {
    #[serde(default)]
    pub num_nodes: i32,
    #[serde(default = "default_jax_port")]
    pub coordinator_port: u16,
}

fn default_jax_port() -> u16 {
    6123
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FluxPolicy {
    #[serde(default)]
    pub num_nodes: i32,
}

/// Discriminated union over gang-scheduler sources.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PodGroupPolicySource {
    Volcano(VolcanoPolicy),
    Coscheduling(CoschedulingPolicy),
    Kai(KaiPolicy),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolcanoPolicy {
    pub queue: Option<String>,
    pub priority_class_name: Option<String>,
    pub network_topology: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoschedulingPolicy {
    #[serde(default = "default_schedule_timeout")]
    pub schedule_timeout_seconds: i64,
}

fn default_schedule_timeout() -> i64 {
    60
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KaiPolicy {
    #[serde(default)]
    pub queue: String,
}

/// One entry of a runtime's JobSet template: the name the replicated job
/// will carry, the ancestor tag used to find the trainer pod-set, the
/// default pod count, and a raw pod-spec payload plugins mutate through
/// `Info`/`PodSet` rather than this template directly.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedJobTemplate {
    pub name: String,
    pub ancestor: Option<PodSetAncestor>,
    pub count: i32,
    pub pod_spec: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PodSetAncestor {
    Trainer,
    DatasetInitializer,
    ModelInitializer,
    Launcher,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSetTemplate {
    pub replicated_jobs: Vec<ReplicatedJobTemplate>,
    #[serde(default)]
    pub subdomain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub ml_policy: MLPolicySource,
    #[serde(default)]
    pub pod_group_policy: Option<PodGroupPolicySource>,
    pub job_set_template: JobSetTemplate,
    pub ttl_seconds_after_finished: Option<i64>,
    pub active_deadline_seconds: Option<i64>,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "trainer.kubeflow.org",
    version = "v1alpha1",
    kind = "TrainingRuntime",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRuntimeSpec {
    #[serde(flatten)]
    pub template: RuntimeSpec,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "trainer.kubeflow.org",
    version = "v1alpha1",
    kind = "ClusterTrainingRuntime",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTrainingRuntimeSpec {
    #[serde(flatten)]
    pub template: RuntimeSpec,
}

// ---------------------------------------------------------------------
// Progress update envelope
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub trainer_status: TrainerStatus,
}
