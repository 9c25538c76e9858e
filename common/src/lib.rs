//! Shared data model, `Info` staging object, and apply utilities for the
//! Trainer control plane. Every other crate in this workspace depends on
//! `common` for its type vocabulary, the same way `rks`/`libscheduler`
//! depend on a shared `common` crate for `Pod`/`Node` shapes.

pub mod apply;
pub mod error;
pub mod info;
pub mod labels;
pub mod model;
pub mod resources;

pub use error::CommonError;
pub use info::{ApplyConfiguration, ContainerSpec, Info, PodSet, RuntimePolicy, SchedulerHints};
pub use model::*;
