//! Framework-agnostic plugin pipeline that turns a `TrainJob` plus its
//! resolved runtime into a set of downstream apply-configurations.
//! Every plugin is a small, independently testable unit implementing one
//! or more of the capability traits in [`capability`]; [`registry::Registry`]
//! composes them in a fixed order.

pub mod capability;
pub mod jobset;
pub mod ml_policy;
pub mod progress;
pub mod registry;
pub mod scheduling;

pub use capability::{Plugin, PluginError, PluginResult};
pub use registry::{render, Registry};
