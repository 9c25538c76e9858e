//! `Info`: the ephemeral, per-reconciliation staging object threaded
//! through the plugin pipeline.
//!
//! Kept as plain, directly-mutable structs — no trait objects, no interior
//! mutability — the same way `libscheduler::models` keeps `PodInfo`/
//! `NodeInfo` as bare structs plugins read and write by reference.

use crate::model::{
    ContainerPort, EnvVar, MLPolicySource, PodGroupPolicySource, PodSetAncestor, Volume,
    VolumeMount,
};
use std::collections::BTreeMap;

/// One container inside a pod-set, mutated in place by `EnforceMLPolicy`
/// and `Progress` plugins via the apply utilities in [`crate::apply`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    pub ports: Vec<ContainerPort>,
    pub volume_mounts: Vec<VolumeMount>,
}

/// A lazily-produced sequence of stable per-pod DNS endpoints for one
/// pod-set. Consumers that need a slice call `.collect::<Vec<_>>()`; the
/// `JobSet` plugin consumes it directly without materializing.
#[derive(Debug, Clone)]
pub struct PodSetEndpoints {
    job_name: String,
    replicated_job_name: String,
    subdomain: String,
    count: i32,
    next: i32,
}

impl PodSetEndpoints {
    pub fn new(job_name: &str, replicated_job_name: &str, subdomain: &str, count: i32) -> Self {
        Self {
            job_name: job_name.to_string(),
            replicated_job_name: replicated_job_name.to_string(),
            subdomain: subdomain.to_string(),
            count,
            next: 0,
        }
    }
}

impl Iterator for PodSetEndpoints {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next >= self.count {
            return None;
        }
        let pod_index = self.next;
        self.next += 1;
        // {jobName}-{replicatedJobName}-{jobIndex}-{podIndex}.{subdomain}
        // jobIndex is always 0: this workspace does not model JobSet's
        // multi-Job-per-replicatedJob (`replicas`) axis, only the pod axis.
        Some(format!(
            "{}-{}-0-{}.{}",
            self.job_name, self.replicated_job_name, pod_index, self.subdomain
        ))
    }
}

/// One replicated-job's worth of pod-level configuration.
#[derive(Debug, Clone)]
pub struct PodSet {
    pub name: String,
    pub ancestor: Option<PodSetAncestor>,
    pub count: i32,
    pub containers: Vec<ContainerSpec>,
    pub init_containers: Vec<ContainerSpec>,
    pub volumes: Vec<Volume>,
    /// Sum of container resource requests for a single pod in this
    /// pod-set, capped by init-container maxima.
    pub per_pod_resource_request: BTreeMap<String, i64>,
}

impl PodSet {
    pub fn container_mut(&mut self, name: &str) -> Option<&mut ContainerSpec> {
        self.containers.iter_mut().find(|c| c.name == name)
    }

    pub fn init_container_mut(&mut self, name: &str) -> Option<&mut ContainerSpec> {
        self.init_containers.iter_mut().find(|c| c.name == name)
    }

    /// The rank-0 trainer pod's DNS name, computed the same way the
    /// `JobSet` plugin computes it. Used by ML-policy plugins that need
    /// the rank-0 address without waiting for `IdentifyPodNetwork` to run.
    pub fn rank_zero_endpoint(&self, job_name: &str, subdomain: &str) -> String {
        format!("{job_name}-{}-0-0.{subdomain}", self.name)
    }

    pub fn endpoints(&self, job_name: &str, subdomain: &str) -> PodSetEndpoints {
        PodSetEndpoints::new(job_name, &self.name, subdomain, self.count)
    }
}

/// Copied verbatim from the resolved runtime at the start of a
/// reconciliation.
#[derive(Debug, Clone)]
pub struct RuntimePolicy {
    pub ml_policy_source: MLPolicySource,
    pub pod_group_policy_source: Option<PodGroupPolicySource>,
}

/// Hints a scheduling plugin stamps for fusion into every pod spec.
#[derive(Debug, Clone, Default)]
pub struct SchedulerHints {
    pub pod_labels: BTreeMap<String, String>,
    pub pod_annotations: BTreeMap<String, String>,
}

/// One apply-configuration a `ComponentBuilder` plugin emits: a JobSet,
/// PodGroup, ConfigMap, or Secret, kept generic over `serde_json::Value`
/// so this crate does not need one typed builder per downstream CRD.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApplyConfiguration {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub body: serde_json::Value,
}

/// The authoritative JobSet apply-configuration under construction,
/// together with the `PodSets` projection plugins actually mutate.
#[derive(Debug, Clone, Default)]
pub struct TemplateSpec {
    pub pod_sets: Vec<PodSet>,
    pub obj_apply: Option<ApplyConfiguration>,
}

impl TemplateSpec {
    pub fn pod_set_mut(&mut self, name: &str) -> Option<&mut PodSet> {
        self.pod_sets.iter_mut().find(|p| p.name == name)
    }

    pub fn trainer_pod_set(&self) -> Option<&PodSet> {
        self.pod_sets
            .iter()
            .find(|p| p.ancestor == Some(PodSetAncestor::Trainer))
    }

    pub fn trainer_pod_set_mut(&mut self) -> Option<&mut PodSet> {
        self.pod_sets
            .iter_mut()
            .find(|p| p.ancestor == Some(PodSetAncestor::Trainer))
    }
}

/// The mutable working state a single reconciliation threads through every
/// plugin. Created at the start of a reconcile, discarded at its end —
/// never persisted, never shared across workers.
#[derive(Debug, Clone, Default)]
pub struct Info {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub runtime_policy: Option<RuntimePolicy>,
    pub template_spec: TemplateSpec,
    pub scheduler: SchedulerHints,
    pub train_job_name: String,
    pub namespace: String,
    pub subdomain: String,
}

impl Info {
    /// Seeds an `Info` from a runtime's JobSet template: propagation
    /// labels/annotations are the runtime's, later overridden by the
    /// `TrainJob`'s own.
    pub fn seed(
        train_job_name: &str,
        namespace: &str,
        runtime_policy: RuntimePolicy,
        runtime_labels: BTreeMap<String, String>,
        runtime_annotations: BTreeMap<String, String>,
        pod_sets: Vec<PodSet>,
    ) -> Self {
        Self {
            labels: runtime_labels,
            annotations: runtime_annotations,
            runtime_policy: Some(runtime_policy),
            template_spec: TemplateSpec {
                pod_sets,
                obj_apply: None,
            },
            scheduler: SchedulerHints::default(),
            train_job_name: train_job_name.to_string(),
            namespace: namespace.to_string(),
            subdomain: train_job_name.to_string(),
        }
    }

    /// Overrides propagated labels/annotations with the `TrainJob`'s own.
    pub fn apply_trainjob_overrides(
        &mut self,
        trainjob_labels: &BTreeMap<String, String>,
        trainjob_annotations: &BTreeMap<String, String>,
    ) {
        for (k, v) in trainjob_labels {
            self.labels.insert(k.clone(), v.clone());
        }
        for (k, v) in trainjob_annotations {
            self.annotations.insert(k.clone(), v.clone());
        }
    }
}
