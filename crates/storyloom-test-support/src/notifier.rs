//! Test notifier — records every published lobby event.

use std::sync::Mutex;

use async_trait::async_trait;
use storyloom_core::notify::{LobbyEvent, LobbyNotifier};

/// A notifier that captures all published events for later assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<LobbyEvent>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all events published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn published(&self) -> Vec<LobbyEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl LobbyNotifier for RecordingNotifier {
    async fn publish(&self, event: LobbyEvent) {
        self.events.lock().unwrap().push(event);
    }
}
