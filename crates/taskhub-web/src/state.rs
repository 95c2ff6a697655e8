//! Shared handler state.

use std::sync::Arc;

use taskhub_core::AuthConfig;
use taskhub_tracker::{
    Accounts, Clock, NotificationHub, SessionRegistry, TaskService, TaskStore,
};

/// Everything a handler needs, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<Accounts>,
    pub tasks: TaskService,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire the services over one store and notification hub.
    pub fn new(
        store: Arc<dyn TaskStore>,
        hub: NotificationHub,
        clock: Arc<dyn Clock>,
        auth: &AuthConfig,
    ) -> Self {
        let sessions = SessionRegistry::new(auth.session_ttl);
        let accounts = Arc::new(Accounts::new(store.clone(), sessions, clock.clone()));
        let tasks = TaskService::new(store, hub, clock.clone());
        Self {
            accounts,
            tasks,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        self.tasks.store()
    }
}
