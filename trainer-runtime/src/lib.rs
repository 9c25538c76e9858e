//! Resolves `TrainJob.spec.runtimeRef` against the cluster, seeds the
//! per-reconciliation `Info`, and drives the `trainer-plugins` pipeline —
//! the glue `trainer-controller`'s reconciler calls on every pass.

pub mod error;
pub mod pipeline;
pub mod registry;
pub mod seed;

pub use error::{RuntimeError, RuntimeResult};
pub use pipeline::Pipeline;
pub use registry::{ResolvedRuntime, RuntimeRegistry};
pub use seed::seed_info;
