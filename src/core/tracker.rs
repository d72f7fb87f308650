//! # In-flight tracker.
//!
//! Knows which tasks still have a listener or watchdog running.
//!
//! ## Architecture
//! ```text
//! Dispatcher::submit_request ──► InFlightTracker::track(task_id)
//!        │ spawn
//!        ├─► listener::run(..).await ──► InFlightTracker::stopped(task_id, Listener)
//!        └─► Watchdog::run(..).await ──► InFlightTracker::stopped(task_id, Watchdog)
//!                                                  │
//!                                                  ▼
//!                                HashMap<task_id, Monitors{listener, watchdog}>
//! ```
//!
//! ## Rules
//! - Entries are written on the monitor tasks themselves, not through the
//!   event bus, so a lagging bus subscriber cannot leave an entry behind.
//! - `track` runs before either monitor is spawned.
//! - An entry is removed once both monitors have stopped.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// One of the two per-task monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Monitor {
    Listener,
    Watchdog,
}

#[derive(Debug, Clone)]
struct Monitors {
    listener: bool,
    watchdog: bool,
}

/// Thread-safe tracker of monitored tasks.
///
/// Used by [`Dispatcher::close_all`](crate::Dispatcher::close_all) to name the
/// tasks whose monitors did not stop within the grace period.
#[derive(Default)]
pub struct InFlightTracker {
    state: RwLock<HashMap<String, Monitors>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task whose listener and watchdog are about to start.
    pub(crate) async fn track(&self, task_id: &str) {
        self.state.write().await.insert(
            task_id.to_string(),
            Monitors {
                listener: true,
                watchdog: true,
            },
        );
    }

    /// Marks one monitor of `task_id` as stopped. Returns `true` if the task left.
    pub(crate) async fn stopped(&self, task_id: &str, monitor: Monitor) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.get_mut(task_id) else {
            return false;
        };
        match monitor {
            Monitor::Listener => entry.listener = false,
            Monitor::Watchdog => entry.watchdog = false,
        }
        if entry.listener || entry.watchdog {
            return false;
        }
        state.remove(task_id);
        true
    }

    /// Sorted ids of tasks with at least one monitor running.
    pub async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_in_flight(&self, task_id: &str) -> bool {
        self.state.read().await.contains_key(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn task_leaves_after_both_monitors_stop() {
        let t = InFlightTracker::new();
        t.track("a").await;
        t.track("b").await;
        assert_eq!(t.snapshot().await, vec!["a", "b"]);

        assert!(!t.stopped("a", Monitor::Watchdog).await);
        assert!(t.is_in_flight("a").await);
        assert!(t.stopped("a", Monitor::Listener).await);
        assert!(!t.is_in_flight("a").await);
        assert_eq!(t.snapshot().await, vec!["b"]);
    }

    #[tokio::test]
    async fn stops_for_unknown_or_finished_tasks_are_ignored() {
        let t = InFlightTracker::new();
        assert!(!t.stopped("ghost", Monitor::Listener).await);

        t.track("a").await;
        assert!(!t.stopped("a", Monitor::Listener).await);
        assert!(!t.stopped("a", Monitor::Listener).await);
        assert!(t.is_in_flight("a").await);
        assert!(t.stopped("a", Monitor::Watchdog).await);
        assert!(!t.stopped("a", Monitor::Watchdog).await);
        assert!(t.snapshot().await.is_empty());
    }
}
