//! Shared application state for the router server.

use std::sync::Arc;

use taskrouter::route::ConfiguredRouter;
use taskrouter::store::WorkflowStore;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Open-loop router; its calls block, so handlers run them off the runtime.
    pub router: Arc<ConfiguredRouter>,
    /// Closed-loop workflows, created by `POST /workflows`.
    pub store: Arc<WorkflowStore>,
}

impl AppState {
    pub fn new(router: ConfiguredRouter) -> Self {
        Self {
            router: Arc::new(router),
            store: Arc::new(WorkflowStore::new()),
        }
    }
}
