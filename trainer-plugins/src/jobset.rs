//! JobSet plugin: materializes the `Info` into a JobSet
//! apply-configuration.

use crate::capability::{
    ChildStatusSnapshot, ComponentBuilder, CustomValidation, FieldError, IdentifyPodNetwork,
    Plugin, PluginResult, TerminalCondition, TrainJobStatusPlugin, ValidationResult,
    WatchDeclaration, WatchExtension,
};
use chrono::Utc;
use common::model::{
    Condition, ConditionStatus, ConditionType, PodSetAncestor, ReplicatedJobStatus, RuntimeSpec,
    TrainJob,
};
use common::{ApplyConfiguration, Info};
use std::collections::BTreeMap;

pub struct JobSetPlugin;

const NAME: &str = "JobSet";
pub const DATASET_INITIALIZER_JOB: &str = "dataset-initializer";
pub const MODEL_INITIALIZER_JOB: &str = "model-initializer";

impl Plugin for JobSetPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

impl IdentifyPodNetwork for JobSetPlugin {
    fn identify_pod_network(&self, info: &mut Info) -> PluginResult<()> {
        if info.subdomain.is_empty() {
            info.subdomain = info.train_job_name.clone();
        }
        Ok(())
    }
}

fn owner_reference(train_job: &TrainJob) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "trainer.kubeflow.org/v1alpha1",
        "kind": "TrainJob",
        "name": train_job.metadata.name,
        "uid": train_job.metadata.uid,
        "controller": true,
        "blockOwnerDeletion": true,
    })
}

impl ComponentBuilder for JobSetPlugin {
    fn build(&self, info: &Info, train_job: &TrainJob) -> PluginResult<Vec<ApplyConfiguration>> {
        let mut replicated_jobs = Vec::new();
        for pod_set in &info.template_spec.pod_sets {
            // Trainer uses the trainer pod-set count for both parallelism
            // and completions; initializers run with parallelism 1.
            let (parallelism, completions) = match pod_set.ancestor {
                Some(PodSetAncestor::DatasetInitializer) | Some(PodSetAncestor::ModelInitializer) => {
                    (1, 1)
                }
                _ => (pod_set.count, pod_set.count),
            };
            replicated_jobs.push(serde_json::json!({
                "name": pod_set.name,
                "replicas": 1,
                "template": {
                    "spec": {
                        "parallelism": parallelism,
                        "completions": completions,
                        "template": {
                            "metadata": {
                                "labels": info.scheduler.pod_labels,
                                "annotations": info.scheduler.pod_annotations,
                            },
                            "spec": {
                                "containers": pod_set.containers,
                                "initContainers": pod_set.init_containers,
                                "volumes": pod_set.volumes,
                            }
                        }
                    }
                }
            }));
        }

        let body = serde_json::json!({
            "metadata": {
                "name": info.train_job_name,
                "namespace": info.namespace,
                "labels": info.labels,
                "annotations": info.annotations,
                "ownerReferences": [owner_reference(train_job)],
            },
            "spec": {
                "suspend": train_job.spec.suspend,
                "network": { "subdomain": info.subdomain },
                "replicatedJobs": replicated_jobs,
            }
        });

        Ok(vec![ApplyConfiguration {
            api_version: "jobset.x-k8s.io/v1alpha2".to_string(),
            kind: "JobSet".to_string(),
            name: info.train_job_name.clone(),
            namespace: info.namespace.clone(),
            body,
        }])
    }
}

impl TerminalCondition for JobSetPlugin {
    fn terminal_condition(&self, snapshot: &ChildStatusSnapshot) -> Option<Condition> {
        let completed = snapshot
            .job_set_conditions
            .iter()
            .any(|c| c.type_ == "Completed" && c.status_true);
        let failed = snapshot
            .job_set_conditions
            .iter()
            .any(|c| c.type_ == "Failed" && c.status_true);

        if completed {
            Some(Condition {
                type_: ConditionType::Complete,
                status: ConditionStatus::True,
                reason: "TrainJobComplete".to_string(),
                message: "JobSet completed successfully".to_string(),
                last_transition_time: Utc::now(),
                observed_generation: 0,
            })
        } else if failed {
            Some(Condition {
                type_: ConditionType::Failed,
                status: ConditionStatus::True,
                reason: "TrainJobFailed".to_string(),
                message: "JobSet reported a failed condition".to_string(),
                last_transition_time: Utc::now(),
                observed_generation: 0,
            })
        } else {
            None
        }
    }
}

impl WatchExtension for JobSetPlugin {
    fn watches(&self) -> Vec<WatchDeclaration> {
        vec![WatchDeclaration {
            group: "jobset.x-k8s.io".to_string(),
            kind: "JobSet".to_string(),
        }]
    }
}

impl TrainJobStatusPlugin for JobSetPlugin {
    fn synthesize_status(
        &self,
        snapshot: &ChildStatusSnapshot,
    ) -> BTreeMap<String, ReplicatedJobStatus> {
        snapshot
            .replicated_jobs
            .iter()
            .map(|(name, counters)| {
                (
                    name.clone(),
                    ReplicatedJobStatus {
                        active: counters.active,
                        succeeded: counters.succeeded,
                        failed: counters.failed,
                        suspended: counters.suspended,
                    },
                )
            })
            .collect()
    }
}

impl CustomValidation for JobSetPlugin {
    fn validate(&self, train_job: &TrainJob, runtime: &RuntimeSpec) -> ValidationResult {
        let mut result = ValidationResult::default();

        let has_job = |name: &str| {
            runtime
                .job_set_template
                .replicated_jobs
                .iter()
                .any(|j| {
                    j.name == name
                        && j.pod_spec
                            .get("containers")
                            .and_then(|v| v.as_array())
                            .map(|containers| {
                                containers.iter().any(|c| {
                                    c.get("name").and_then(|n| n.as_str()) == Some(name)
                                })
                            })
                            .unwrap_or(false)
                })
        };

        if let Some(initializer) = train_job.spec.initializer.as_ref() {
            if initializer.dataset.is_some() && !has_job(DATASET_INITIALIZER_JOB) {
                result.errors.push(FieldError {
                    field: "spec.initializer.dataset".to_string(),
                    message: format!(
                        "runtime has no replicated job {DATASET_INITIALIZER_JOB:?} with a matching container"
                    ),
                });
            }
            if initializer.model.is_some() && !has_job(MODEL_INITIALIZER_JOB) {
                result.errors.push(FieldError {
                    field: "spec.initializer.model".to_string(),
                    message: format!(
                        "runtime has no replicated job {MODEL_INITIALIZER_JOB:?} with a matching container"
                    ),
                });
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{DownstreamCondition, ReplicatedJobCounters};

    #[test]
    fn completed_jobset_maps_to_traincomplete() {
        let snapshot = ChildStatusSnapshot {
            replicated_jobs: BTreeMap::new(),
            job_set_conditions: vec![DownstreamCondition {
                type_: "Completed".to_string(),
                status_true: true,
            }],
        };
        let condition = JobSetPlugin.terminal_condition(&snapshot).unwrap();
        assert_eq!(condition.type_, ConditionType::Complete);
        assert_eq!(condition.reason, "TrainJobComplete");
    }

    #[test]
    fn failed_jobset_maps_to_trainfailed() {
        let snapshot = ChildStatusSnapshot {
            replicated_jobs: BTreeMap::new(),
            job_set_conditions: vec![DownstreamCondition {
                type_: "Failed".to_string(),
                status_true: true,
            }],
        };
        let condition = JobSetPlugin.terminal_condition(&snapshot).unwrap();
        assert_eq!(condition.type_, ConditionType::Failed);
    }

    #[test]
    fn running_jobset_has_no_terminal_condition() {
        let snapshot = ChildStatusSnapshot {
            replicated_jobs: BTreeMap::from([(
                "node".to_string(),
                ReplicatedJobCounters {
                    active: 2,
                    ..Default::default()
                },
            )]),
            job_set_conditions: vec![],
        };
        assert!(JobSetPlugin.terminal_condition(&snapshot).is_none());
    }
}
