//! KAI queue gang-scheduling plugin.
//!
//! Stamps `kai.scheduler/queue` when a non-empty queue is declared; an
//! empty queue means "use the scheduler default" and no label is written.

use crate::capability::{EnforcePodGroupPolicy, Plugin, PluginResult};
use common::model::{PodGroupPolicySource, TrainJob};
use common::Info;

pub struct KaiPlugin;

const NAME: &str = "KAI";
const QUEUE_LABEL: &str = "kai.scheduler/queue";

impl Plugin for KaiPlugin {
    fn name(&self) -> &'static str {
        NAME
    }
}

impl EnforcePodGroupPolicy for KaiPlugin {
    fn enforce_pod_group_policy(&self, info: &mut Info, _train_job: &TrainJob) -> PluginResult<()> {
        let policy = match info
            .runtime_policy
            .as_ref()
            .and_then(|p| p.pod_group_policy_source.as_ref())
        {
            Some(PodGroupPolicySource::Kai(p)) => p.clone(),
            _ => return Ok(()),
        };
        if !policy.queue.is_empty() {
            info.scheduler
                .pod_labels
                .insert(QUEUE_LABEL.to_string(), policy.queue);
        }
        Ok(())
    }
}

// KAI queueing relies entirely on the pod label above; no separate
// component is built, since the cluster scheduler resolves
// `kai.scheduler/queue` without an accompanying CRD.
impl crate::capability::ComponentBuilder for KaiPlugin {
    fn build(
        &self,
        _info: &common::Info,
        _train_job: &TrainJob,
    ) -> PluginResult<Vec<common::ApplyConfiguration>> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::info::RuntimePolicy;
    use common::model::{KaiPolicy, MLPolicySource};
    use std::collections::BTreeMap;

    #[test]
    fn empty_queue_writes_no_label() {
        let mut info = Info::seed(
            "t1",
            "default",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::Torch(Default::default()),
                pod_group_policy_source: Some(PodGroupPolicySource::Kai(KaiPolicy::default())),
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![],
        );
        KaiPlugin
            .enforce_pod_group_policy(&mut info, &crate::scheduling::volcano::tests_support::minimal_trainjob())
            .unwrap();
        assert!(info.scheduler.pod_labels.is_empty());
    }

    #[test]
    fn named_queue_writes_label() {
        let mut info = Info::seed(
            "t1",
            "default",
            RuntimePolicy {
                ml_policy_source: MLPolicySource::Torch(Default::default()),
                pod_group_policy_source: Some(PodGroupPolicySource::Kai(KaiPolicy {
                    queue: "team-a".to_string(),
                })),
            },
            BTreeMap::new(),
            BTreeMap::new(),
            vec![],
        );
        KaiPlugin
            .enforce_pod_group_policy(&mut info, &crate::scheduling::volcano::tests_support::minimal_trainjob())
            .unwrap();
        assert_eq!(info.scheduler.pod_labels.get(QUEUE_LABEL).unwrap(), "team-a");
    }
}
