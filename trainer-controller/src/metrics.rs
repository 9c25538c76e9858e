//! Process-wide Prometheus counters/histograms, registered once via
//! `once_cell::sync::Lazy`.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

pub static RECONCILE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trainer_reconcile_total",
        "Total TrainJob reconciliations, partitioned by outcome",
        &["outcome"]
    )
    .expect("trainer_reconcile_total registration")
});

pub static RECONCILE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "trainer_reconcile_duration_seconds",
        "TrainJob reconciliation latency",
        &["outcome"]
    )
    .expect("trainer_reconcile_duration_seconds registration")
});

pub static ACTIVE_TRAIN_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "trainer_active_train_jobs",
        "TrainJobs currently in a non-terminal condition"
    )
    .expect("trainer_active_train_jobs registration")
});

pub static JOBS_CREATED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "training_operator_jobs_created_total",
        "TrainJobs for which child workloads were first created",
        &["namespace", "framework"]
    )
    .expect("training_operator_jobs_created_total registration")
});

pub static JOBS_DELETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "training_operator_jobs_deleted_total",
        "TrainJobs deleted, for any reason",
        &["namespace", "framework"]
    )
    .expect("training_operator_jobs_deleted_total registration")
});

pub static JOBS_SUCCESSFUL_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "training_operator_jobs_successful_total",
        "TrainJobs that reached the Complete condition",
        &["namespace", "framework"]
    )
    .expect("training_operator_jobs_successful_total registration")
});

pub static JOBS_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "training_operator_jobs_failed_total",
        "TrainJobs that reached the Failed condition",
        &["namespace", "framework"]
    )
    .expect("training_operator_jobs_failed_total registration")
});

pub static JOBS_RESTARTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "training_operator_jobs_restarted_total",
        "TrainJobs resumed from Suspended back to Running",
        &["namespace", "framework"]
    )
    .expect("training_operator_jobs_restarted_total registration")
});

pub static TTL_DELETIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trainjob_ttl_deletions_total",
        "TrainJobs deleted by ttlSecondsAfterFinished garbage collection",
        &["namespace"]
    )
    .expect("trainjob_ttl_deletions_total registration")
});

pub static DEADLINE_EXCEEDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trainjob_deadline_exceeded_total",
        "TrainJobs failed because activeDeadlineSeconds elapsed",
        &["namespace"]
    )
    .expect("trainjob_deadline_exceeded_total registration")
});

pub fn encode() -> Vec<u8> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buf = Vec::new();
    let families = prometheus::gather();
    encoder
        .encode(&families, &mut buf)
        .expect("prometheus text encoding");
    buf
}
