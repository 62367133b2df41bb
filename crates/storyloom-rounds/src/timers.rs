//! Keyed one-shot timer bookkeeping.
//!
//! One registry instance owns all pending timers of one kind (round
//! deadlines keyed by lobby code, disconnect graces keyed by user id).
//! Arming a key always aborts whatever was armed there before, so a lobby
//! can never accumulate duplicate timers.

use std::future::Future;

use dashmap::DashMap;
use tokio::task::JoinHandle;

/// Registry of pending abortable tasks, keyed by string.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    tasks: DashMap<String, JoinHandle<()>>,
}

impl TimerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` under `key`, aborting any task previously armed there.
    pub fn arm<F>(&self, key: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        if let Some(previous) = self.tasks.insert(key.to_owned(), handle) {
            previous.abort();
        }
    }

    /// Aborts and forgets the task armed under `key`, if any.
    pub fn cancel(&self, key: &str) {
        if let Some((_, handle)) = self.tasks.remove(key) {
            handle.abort();
        }
    }

    /// Whether a task is armed (and still running) under `key`.
    #[must_use]
    pub fn is_armed(&self, key: &str) -> bool {
        self.tasks
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Aborts everything; used on shutdown.
    pub fn cancel_all(&self) {
        for entry in &self.tasks {
            entry.value().abort();
        }
        self.tasks.clear();
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
