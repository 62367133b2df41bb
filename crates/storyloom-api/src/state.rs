//! Shared application state.

use std::sync::Arc;

use storyloom_rounds::coordinator::Coordinator;

use crate::connections::ConnectionRegistry;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The round coordinator.
    pub coordinator: Arc<Coordinator>,
    /// Live socket registry.
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(coordinator: Arc<Coordinator>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            coordinator,
            registry,
        }
    }
}
