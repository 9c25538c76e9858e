//! The `TrainJob` reconcile loop: suspend/resume, the
//! plugin pipeline, terminal-condition propagation, active-deadline
//! enforcement, and TTL-after-finished garbage collection.

use crate::context::SharedContext;
use crate::error::ReconcileError;
use crate::metrics::{
    ACTIVE_TRAIN_JOBS, DEADLINE_EXCEEDED_TOTAL, JOBS_CREATED_TOTAL, JOBS_DELETED_TOTAL,
    JOBS_FAILED_TOTAL, JOBS_RESTARTED_TOTAL, JOBS_SUCCESSFUL_TOTAL, RECONCILE_DURATION_SECONDS,
    RECONCILE_TOTAL, TTL_DELETIONS_TOTAL,
};
use chrono::Utc;
use common::model::{
    Condition, ConditionStatus, ConditionType, MLPolicySource, RuntimeSpec, TrainJob,
    TrainJobStatus,
};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use trainer_plugins::capability::ChildStatusSnapshot;

const FIELD_MANAGER: &str = "trainer-controller";

pub async fn reconcile(
    train_job: Arc<TrainJob>,
    ctx: SharedContext,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let name = train_job.name_any();
    let namespace = train_job
        .namespace()
        .ok_or_else(|| ReconcileError::MissingNamespace { name: name.clone() })?;

    tracing::info!(trainjob = %name, namespace = %namespace, "reconciling");

    let result = reconcile_inner(&train_job, &ctx, &namespace).await;

    if let Err(ReconcileError::Kube(kube::Error::Api(ref resp))) = result {
        if resp.code == 409 {
            record_conflict_event(&ctx, &train_job, &resp.message).await;
        }
    }

    let outcome = if result.is_ok() { "success" } else { "error" };
    RECONCILE_TOTAL.with_label_values(&[outcome]).inc();
    RECONCILE_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());

    result
}

/// Persistent SSA conflicts on a child object surface as a Kubernetes
/// `Event` on the `TrainJob` rather than only a log line, so they are
/// visible via `kubectl describe`.
async fn record_conflict_event(ctx: &SharedContext, train_job: &TrainJob, message: &str) {
    let recorder = Recorder::new(
        ctx.client.clone(),
        Reporter::from(FIELD_MANAGER.to_string()),
        train_job.object_ref(&()),
    );
    let event = Event {
        type_: EventType::Warning,
        reason: "ChildConflict".to_string(),
        note: Some(message.to_string()),
        action: "Reconcile".to_string(),
        secondary: None,
    };
    if let Err(err) = recorder.publish(event).await {
        tracing::warn!(error = %err, "failed to record ChildConflict event");
    }
}

/// Maps a resolved ML policy to the `framework` metric label.
fn framework_label(policy: Option<&MLPolicySource>) -> &'static str {
    match policy {
        Some(MLPolicySource::Torch(_)) => "torch",
        Some(MLPolicySource::Mpi(_)) => "mpi",
        Some(MLPolicySource::XgBoost(_)) => "xgboost",
        Some(MLPolicySource::Jax(_)) => "jax",
        Some(MLPolicySource::Flux(_)) => "flux",
        None => "unknown",
    }
}

async fn reconcile_inner(
    train_job: &TrainJob,
    ctx: &SharedContext,
    namespace: &str,
) -> Result<Action, ReconcileError> {
    let requeue = Duration::from_secs(ctx.config.requeue_after_seconds);
    let status = train_job.status.clone().unwrap_or_default();
    let name = train_job.name_any();

    if terminal(&status) {
        return reconcile_terminal(train_job, ctx, namespace, &status, requeue).await;
    }

    if train_job.spec.suspend {
        return suspend(train_job, ctx, namespace, status, requeue).await;
    }

    let resolved = ctx.pipeline.resolve_runtime(train_job, namespace).await?;
    let framework = framework_label(Some(&resolved.spec.ml_policy));

    if active_deadline_exceeded(train_job, &status, &resolved.spec) {
        let mut next = status.clone();
        push_condition(
            &mut next,
            ConditionType::Failed,
            "DeadlineExceeded",
            "activeDeadlineSeconds elapsed before the TrainJob completed",
        );
        patch_status(train_job, ctx, namespace, &next).await?;
        DEADLINE_EXCEEDED_TOTAL.with_label_values(&[namespace]).inc();
        JOBS_FAILED_TOTAL.with_label_values(&[namespace, framework]).inc();
        ACTIVE_TRAIN_JOBS.dec();
        return Ok(Action::await_change());
    }

    let validation = ctx.pipeline.validate(train_job, &resolved.spec);
    if !validation.is_valid() {
        let message = validation
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        let mut next = status.clone();
        push_condition(&mut next, ConditionType::Failed, "InvalidTrainJob", &message);
        patch_status(train_job, ctx, namespace, &next).await?;
        JOBS_FAILED_TOTAL.with_label_values(&[namespace, framework]).inc();
        ACTIVE_TRAIN_JOBS.dec();
        return Ok(Action::await_change());
    }

    let (_info, objects) = ctx.pipeline.plan(train_job).await?;
    let created = apply_children(ctx, &objects, train_job.spec.suspend).await?;
    if created {
        JOBS_CREATED_TOTAL.with_label_values(&[namespace, framework]).inc();
    }

    let snapshot = fetch_child_status_snapshot(ctx, namespace, &name).await;
    let registry = trainer_plugins::Registry::default();
    let mut next = status.clone();

    let was_suspended = has_condition(&next, ConditionType::Suspended);
    next.conditions.retain(|c| c.type_ != ConditionType::Suspended);

    for plugin in &registry.terminal_condition {
        if let Some(condition) = plugin.terminal_condition(&snapshot) {
            next.conditions.retain(|c| c.type_ != condition.type_);
            next.conditions.push(condition);
        }
    }
    if !has_condition(&next, ConditionType::Running) && !terminal(&next) {
        push_condition(&mut next, ConditionType::Running, "Reconciling", "TrainJob is running");
    }
    for plugin in &registry.train_job_status {
        next.replicated_jobs_status = plugin.synthesize_status(&snapshot);
    }

    if was_suspended && !terminal(&next) {
        JOBS_RESTARTED_TOTAL.with_label_values(&[namespace, framework]).inc();
    }
    if !has_condition(&status, ConditionType::Complete) && has_condition(&next, ConditionType::Complete) {
        JOBS_SUCCESSFUL_TOTAL.with_label_values(&[namespace, framework]).inc();
    }
    if !has_condition(&status, ConditionType::Failed) && has_condition(&next, ConditionType::Failed) {
        JOBS_FAILED_TOTAL.with_label_values(&[namespace, framework]).inc();
    }

    if next != status {
        patch_status(train_job, ctx, namespace, &next).await?;
    }

    ACTIVE_TRAIN_JOBS.set(1);
    Ok(Action::requeue(requeue))
}

/// Renders and, while the object exists and the TrainJob is running,
/// leaves it untouched: child apply-configurations are (re-)emitted only
/// on first creation or while the TrainJob is suspended. Returns whether
/// any object was newly created this pass.
async fn apply_children(
    ctx: &SharedContext,
    objects: &[common::ApplyConfiguration],
    suspended: bool,
) -> Result<bool, ReconcileError> {
    let mut created = false;
    for object in objects {
        let exists = object_exists(ctx, object).await?;
        if !exists {
            created = true;
        }
        if suspended || !exists {
            tracing::debug!(
                kind = %object.kind,
                name = %object.name,
                existed = exists,
                suspended,
                "applying apply-configuration"
            );
            apply_dynamic(ctx, object).await?;
        }
    }
    Ok(created)
}

async fn suspend(
    train_job: &TrainJob,
    ctx: &SharedContext,
    namespace: &str,
    mut status: TrainJobStatus,
    requeue: Duration,
) -> Result<Action, ReconcileError> {
    let (_info, objects) = ctx.pipeline.plan(train_job).await?;
    apply_children(ctx, &objects, true).await?;

    if !has_condition(&status, ConditionType::Suspended) {
        push_condition(&mut status, ConditionType::Suspended, "Suspended", "TrainJob is suspended");
        status.conditions.retain(|c| c.type_ != ConditionType::Running);
        patch_status(train_job, ctx, namespace, &status).await?;
    }
    ACTIVE_TRAIN_JOBS.set(0);
    Ok(Action::requeue(requeue))
}

async fn reconcile_terminal(
    train_job: &TrainJob,
    ctx: &SharedContext,
    namespace: &str,
    status: &TrainJobStatus,
    requeue: Duration,
) -> Result<Action, ReconcileError> {
    let resolved = ctx.pipeline.resolve_runtime(train_job, namespace).await;
    let Ok(runtime) = resolved else {
        return Ok(Action::requeue(requeue));
    };

    let Some(ttl) = runtime.spec.ttl_seconds_after_finished else {
        return Ok(Action::await_change());
    };

    let Some(last_transition) = status
        .conditions
        .iter()
        .find(|c| c.type_.is_terminal())
        .map(|c| c.last_transition_time)
    else {
        return Ok(Action::await_change());
    };

    let elapsed = Utc::now().signed_duration_since(last_transition);
    if elapsed.num_seconds() >= ttl {
        let name = train_job.name_any();
        tracing::info!(trainjob = %name, "ttlSecondsAfterFinished elapsed, deleting TrainJob");
        delete_trainjob(ctx, namespace, &name).await?;
        let framework = framework_label(Some(&runtime.spec.ml_policy));
        TTL_DELETIONS_TOTAL.with_label_values(&[namespace]).inc();
        JOBS_DELETED_TOTAL.with_label_values(&[namespace, framework]).inc();
        return Ok(Action::await_change());
    }

    let remaining = ttl - elapsed.num_seconds();
    Ok(Action::requeue(Duration::from_secs(remaining.max(1) as u64)))
}

fn terminal(status: &TrainJobStatus) -> bool {
    status.conditions.iter().any(|c| {
        c.type_.is_terminal() && c.status == ConditionStatus::True
    })
}

fn has_condition(status: &TrainJobStatus, kind: ConditionType) -> bool {
    status
        .conditions
        .iter()
        .any(|c| c.type_ == kind && c.status == ConditionStatus::True)
}

fn push_condition(status: &mut TrainJobStatus, kind: ConditionType, reason: &str, message: &str) {
    status.conditions.retain(|c| c.type_ != kind);
    status.conditions.push(Condition {
        type_: kind,
        status: ConditionStatus::True,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Utc::now(),
        observed_generation: 0,
    });
}

/// `needsDeadline ⟺ (trainJob.activeDeadlineSeconds ≠ nil ∨
/// runtime.activeDeadlineSeconds ≠ nil) ∧ ¬finished`, with the TrainJob's
/// own field taking precedence over the runtime's default when both are
/// set.
fn active_deadline_exceeded(
    train_job: &TrainJob,
    status: &TrainJobStatus,
    runtime: &RuntimeSpec,
) -> bool {
    let Some(deadline_seconds) = train_job
        .spec
        .active_deadline_seconds
        .or(runtime.active_deadline_seconds)
    else {
        return false;
    };
    let Some(started) = status
        .conditions
        .iter()
        .find(|c| c.type_ == ConditionType::Running)
        .map(|c| c.last_transition_time)
        .or_else(|| train_job.creation_timestamp().map(|t| t.0))
    else {
        return false;
    };
    let elapsed = Utc::now().signed_duration_since(started);
    elapsed.num_seconds() >= deadline_seconds
}

async fn patch_status(
    train_job: &TrainJob,
    ctx: &SharedContext,
    namespace: &str,
    status: &TrainJobStatus,
) -> Result<(), ReconcileError> {
    let api: Api<TrainJob> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        &train_job.name_any(),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}

fn plural_for(kind: &str) -> String {
    match kind {
        "JobSet" => "jobsets".to_string(),
        "PodGroup" => "podgroups".to_string(),
        other => format!("{}s", other.to_lowercase()),
    }
}

fn api_resource_for(api_version: &str, kind: &str) -> kube::discovery::ApiResource {
    let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
    kube::discovery::ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        plural: plural_for(kind),
    }
}

/// Applies one plugin-produced apply-configuration via server-side apply.
/// Core `v1` kinds go through the typed client; everything else (JobSet,
/// PodGroup, ...) goes through the dynamic (unstructured) API, since this
/// workspace doesn't carry typed bindings for every downstream CRD.
async fn apply_dynamic(
    ctx: &SharedContext,
    object: &common::ApplyConfiguration,
) -> Result<(), ReconcileError> {
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};

    match object.kind.as_str() {
        "ConfigMap" => {
            apply_typed::<ConfigMap>(ctx, object).await?;
        }
        "Secret" => {
            apply_typed::<Secret>(ctx, object).await?;
        }
        _ => {
            apply_unstructured(ctx, object).await?;
        }
    }
    Ok(())
}

/// Whether `object` already exists in the cluster. Used to gate
/// re-application of children that must not be retargeted mid-run.
async fn object_exists(
    ctx: &SharedContext,
    object: &common::ApplyConfiguration,
) -> Result<bool, ReconcileError> {
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};

    match object.kind.as_str() {
        "ConfigMap" => typed_exists::<ConfigMap>(ctx, object).await,
        "Secret" => typed_exists::<Secret>(ctx, object).await,
        _ => unstructured_exists(ctx, object).await,
    }
}

async fn typed_exists<K>(ctx: &SharedContext, object: &common::ApplyConfiguration) -> Result<bool, ReconcileError>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned
        + 'static,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(ctx.client.clone(), &object.namespace);
    match api.get(&object.name).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn unstructured_exists(ctx: &SharedContext, object: &common::ApplyConfiguration) -> Result<bool, ReconcileError> {
    use kube::api::DynamicObject;

    let api_resource = api_resource_for(&object.api_version, &object.kind);
    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), &object.namespace, &api_resource);
    match api.get(&object.name).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn apply_typed<K>(ctx: &SharedContext, object: &common::ApplyConfiguration) -> Result<(), ReconcileError>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned
        + 'static,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(ctx.client.clone(), &object.namespace);
    let data = annotated_body(object);
    api.patch(
        &object.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(data),
    )
    .await?;
    Ok(())
}

async fn apply_unstructured(ctx: &SharedContext, object: &common::ApplyConfiguration) -> Result<(), ReconcileError> {
    use kube::api::DynamicObject;

    let api_resource = api_resource_for(&object.api_version, &object.kind);
    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), &object.namespace, &api_resource);
    let data = annotated_body(object);
    api.patch(
        &object.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(data),
    )
    .await?;
    Ok(())
}

fn annotated_body(object: &common::ApplyConfiguration) -> serde_json::Value {
    let mut data = object.body.clone();
    if let Some(map) = data.as_object_mut() {
        map.insert("apiVersion".to_string(), serde_json::Value::String(object.api_version.clone()));
        map.insert("kind".to_string(), serde_json::Value::String(object.kind.clone()));
        let metadata = map
            .entry("metadata")
            .or_insert_with(|| serde_json::json!({}));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert("name".to_string(), serde_json::Value::String(object.name.clone()));
            metadata.insert(
                "namespace".to_string(),
                serde_json::Value::String(object.namespace.clone()),
            );
        }
    }
    data
}

/// Reads the owned JobSet's `status` and projects it into the shape the
/// plugin pipeline's `TerminalCondition`/`TrainJobStatus` capabilities
/// expect. A missing JobSet (not yet created, or already GC'd) yields an
/// empty snapshot rather than an error.
async fn fetch_child_status_snapshot(
    ctx: &SharedContext,
    namespace: &str,
    name: &str,
) -> ChildStatusSnapshot {
    use kube::api::DynamicObject;
    use trainer_plugins::capability::{DownstreamCondition, ReplicatedJobCounters};

    let api_resource = api_resource_for("jobset.x-k8s.io/v1alpha2", "JobSet");
    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), namespace, &api_resource);
    let Ok(jobset) = api.get(name).await else {
        return ChildStatusSnapshot::default();
    };

    let status = jobset.data.get("status").cloned().unwrap_or_default();
    let mut snapshot = ChildStatusSnapshot::default();

    if let Some(conditions) = status.get("conditions").and_then(|c| c.as_array()) {
        for condition in conditions {
            let type_ = condition
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string();
            let status_true = condition.get("status").and_then(|s| s.as_str()) == Some("True");
            snapshot
                .job_set_conditions
                .push(DownstreamCondition { type_, status_true });
        }
    }

    if let Some(replicated) = status.get("replicatedJobsStatus").and_then(|r| r.as_array()) {
        for entry in replicated {
            let name = entry
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string();
            let as_i32 = |field: &str| entry.get(field).and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            snapshot.replicated_jobs.insert(
                name,
                ReplicatedJobCounters {
                    active: as_i32("active"),
                    succeeded: as_i32("succeeded"),
                    failed: as_i32("failed"),
                    suspended: as_i32("suspended"),
                },
            );
        }
    }

    snapshot
}

async fn delete_trainjob(ctx: &SharedContext, namespace: &str, name: &str) -> Result<(), ReconcileError> {
    let api: Api<TrainJob> = Api::namespaced(ctx.client.clone(), namespace);
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub fn error_policy(
    _train_job: Arc<TrainJob>,
    error: &ReconcileError,
    _ctx: SharedContext,
) -> Action {
    tracing::error!(error = %error, "reconcile failed");
    Action::requeue(Duration::from_secs(15))
}
