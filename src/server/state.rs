//! Application state for the web server

use std::sync::Arc;

use crate::jobs::JobRunner;
use crate::tasks::TaskStore;

/// Shared state handed to every handler (cheap to clone)
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<JobRunner>,
}

impl AppState {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self { runner }
    }

    pub fn store(&self) -> &dyn TaskStore {
        self.runner.store().as_ref()
    }
}
