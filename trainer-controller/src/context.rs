use crate::config::Config;
use kube::Client;
use std::sync::Arc;
use trainer_runtime::Pipeline;

/// Shared state every reconcile invocation borrows, constructed once at
/// startup.
pub struct Context {
    pub client: Client,
    pub pipeline: Pipeline,
    pub config: Config,
}

pub type SharedContext = Arc<Context>;
