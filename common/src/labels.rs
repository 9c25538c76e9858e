//! Label and audience constants shared between the crates that write
//! them (the plugin pipeline) and the crate that reads them back
//! (the progress-update HTTP plane), so the two sides can't drift.

/// Pod label stamped by the progress plugin, read by the progress
/// server to authorize a caller's own TrainJob.
pub const TRAINJOB_NAME_LABEL: &str = "trainer.kubeflow.org/trainjob-name";

/// Audience the projected service-account token is issued for and the
/// progress server requires when validating it via `TokenReview`.
pub const PROGRESS_TOKEN_AUDIENCE: &str = "trainer.kubeflow.org";
