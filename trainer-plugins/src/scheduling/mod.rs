//! One gang-scheduling plugin per supported scheduler.

pub mod coscheduling;
pub mod kai;
pub mod volcano;

/// Shared helper: `minMember`/`minResources` computation for a `PodGroup`.
pub(crate) fn min_member(info: &common::Info) -> i32 {
    info.template_spec.pod_sets.iter().map(|p| p.count).sum()
}

pub(crate) fn min_resources(info: &common::Info) -> std::collections::BTreeMap<String, i64> {
    let mut total = std::collections::BTreeMap::new();
    for pod_set in &info.template_spec.pod_sets {
        for (resource, qty) in &pod_set.per_pod_resource_request {
            *total.entry(resource.clone()).or_insert(0) += qty * pod_set.count as i64;
        }
    }
    total
}
