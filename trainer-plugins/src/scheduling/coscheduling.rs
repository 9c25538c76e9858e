//! scheduler-plugins coscheduling gang-scheduling plugin.
//!
//! Emits a scheduler-plugins `PodGroup`; stamps the pod label
//! `scheduling.x-k8s.io/pod-group = trainJobName`; sets
//! `scheduleTimeoutSeconds` from policy.

use super::min_member;
use crate::capability::{ComponentBuilder, EnforcePodGroupPolicy, Plugin, PluginResult};
use common::model::{PodGroupPolicySource, TrainJob};
use common::{ApplyConfiguration, Info};

pub struct CoschedulingPlugin;

const NAME: &str = "Coscheduling";
const POD_GROUP_LABEL: &str = "scheduling.x-k8s.io/pod-group";

impl Plugin for CoschedulingPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

impl EnforcePodGroupPolicy for CoschedulingPlugin {
    fn enforce_pod_group_policy(&self, info: &mut Info, _train_job: &TrainJob) -> PluginResult<()> {
        if !matches!(
            info.runtime_policy
                .as_ref()
                .and_then(|p| p.pod_group_policy_source.as_ref()),
            Some(PodGroupPolicySource::Coscheduling(_))
        ) {
            return Ok(());
        }
        info.scheduler
            .pod_labels
            .insert(POD_GROUP_LABEL.to_string(), info.train_job_name.clone());
        Ok(())
    }
}

impl ComponentBuilder for CoschedulingPlugin {
    fn build(&self, info: &Info, _train_job: &TrainJob) -> PluginResult<Vec<ApplyConfiguration>> {
        let policy = match info
            .runtime_policy
            .as_ref()
            .and_then(|p| p.pod_group_policy_source.as_ref())
        {
            Some(PodGroupPolicySource::Coscheduling(p)) => p.clone(),
            _ => return Ok(vec![]),
        };

        Ok(vec![ApplyConfiguration {
            api_version: "scheduling.x-k8s.io/v1alpha1".to_string(),
            kind: "PodGroup".to_string(),
            name: info.train_job_name.clone(),
            namespace: info.namespace.clone(),
            body: serde_json::json!({
                "spec": {
                    "minMember": min_member(info),
                    "scheduleTimeoutSeconds": policy.schedule_timeout_seconds,
                }
            }),
        }])
    }
}
