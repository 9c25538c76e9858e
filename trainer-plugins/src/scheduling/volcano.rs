//! Volcano gang-scheduling plugin.
//!
//! Stamps pod annotation `scheduling.volcano.sh/queue-name` when present in
//! `Info.Annotations`. Emits a `PodGroup` with `minMember` = sum of
//! pod-set counts and `minResources` = sum over pod-sets of
//! `count * singlePodRequests`. Whether this apply-configuration is
//! actually written is the reconciler's call: scheduler constraints do
//! not change while jobs are running.

use super::{min_member, min_resources};
use crate::capability::{
    ComponentBuilder, EnforcePodGroupPolicy, Plugin, PluginResult, WatchDeclaration,
    WatchExtension,
};
use common::model::{PodGroupPolicySource, TrainJob};
use common::{ApplyConfiguration, Info};

pub struct VolcanoPlugin;

const NAME: &str = "Volcano";
const QUEUE_ANNOTATION: &str = "scheduling.volcano.sh/queue-name";

impl Plugin for VolcanoPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

impl EnforcePodGroupPolicy for VolcanoPlugin {
    fn enforce_pod_group_policy(&self, info: &mut Info, _train_job: &TrainJob) -> PluginResult<()> {
        if !matches!(
            info.runtime_policy.as_ref().and_then(|p| p.pod_group_policy_source.as_ref()),
            Some(PodGroupPolicySource::Volcano(_))
        ) {
            return Ok(());
        }
        if let Some(queue) = info.annotations.get(QUEUE_ANNOTATION).cloned() {
            info.scheduler
                .pod_annotations
                .insert(QUEUE_ANNOTATION.to_string(), queue);
        }
        Ok(())
    }
}

impl ComponentBuilder for VolcanoPlugin {
    fn build(&self, info: &Info, _train_job: &TrainJob) -> PluginResult<Vec<ApplyConfiguration>> {
        let policy = match info
            .runtime_policy
            .as_ref()
            .and_then(|p| p.pod_group_policy_source.as_ref())
        {
            Some(PodGroupPolicySource::Volcano(p)) => p.clone(),
            _ => return Ok(vec![]),
        };

        let min_member = min_member(info);
        let min_resources = min_resources(info);

        Ok(vec![ApplyConfiguration {
            api_version: "scheduling.volcano.sh/v1beta1".to_string(),
            kind: "PodGroup".to_string(),
            name: info.train_job_name.clone(),
            namespace: info.namespace.clone(),
            body: serde_json::json!({
                "spec": {
                    "minMember": min_member,
                    "minResources": min_resources,
                    "queue": policy.queue,
                    "priorityClassName": policy.priority_class_name,
                    "networkTopology": policy.network_topology,
                }
            }),
        }])
    }
}

impl WatchExtension for VolcanoPlugin {
    fn watches(&self) -> Vec<WatchDeclaration> {
        vec![WatchDeclaration {
            group: "scheduling.volcano.sh".to_string(),
            kind: "PodGroup".to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::info::{ContainerSpec, PodSet, RuntimePolicy};
    use common::model::{MLPolicySource, PodSetAncestor, VolcanoPolicy};
    use std::collections::BTreeMap;

    fn pod_set(name: &str, count: i32, cpu_millicores: i64) -> PodSet {
        PodSet {
            name: name.to_string(),
            ancestor: None,
            count,
            containers: vec![ContainerSpec {
                name: "main".to_string(),
                ..Default::default()
            }],
            init_containers: vec![],
            volumes: vec![],
            per_pod_resource_request: BTreeMap::from([("cpu".to_string(), cpu_millicores)]),
        }
    }

    #[test]
    fn gang_scheduled_job_seed_scenario() {
        let info = Info::seed(
            "t1",
            "default",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::Torch(Default::default()),
                pod_group_policy_source: Some(PodGroupPolicySource::Volcano(VolcanoPolicy::default())),
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![pod_set("launcher", 1, 300), pod_set("worker", 4, 500)],
        );
        let train_job = super::tests_support::minimal_trainjob();
        let objects = VolcanoPlugin.build(&info, &train_job).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].body["spec"]["minMember"], 5);
        assert_eq!(objects[0].body["spec"]["minResources"]["cpu"], 2300);
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use common::model::{RuntimeKind, RuntimeRef, TrainJob, TrainJobSpec};
    use kube::core::ObjectMeta;

    pub fn minimal_trainjob() -> TrainJob {
        TrainJob {
            metadata: ObjectMeta::default(),
            spec: TrainJobSpec {
                runtime_ref: RuntimeRef {
                    name: "r".to_string(),
                    kind: RuntimeKind::TrainingRuntime,
                },
                trainer: None,
                initializer: None,
                pod_spec_overrides: vec![],
                suspend: false,
                active_deadline_seconds: None,
            },
            status: None,
        }
    }
}
