//! # LogWriter — events as `tracing` records
//!
//! Renders every [`Event`] as a structured `tracing` record under the
//! `taskrelay` target. Failures are `warn`/`error`, lifecycle is `info`,
//! per-message noise is `debug`.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  taskrelay: task submitted task_id=9f.. status_id=41.. queue=task_queue
//! WARN  taskrelay: attempt failed task_id=9f.. retry_count=0 reason="worker heartbeat timeout: .."
//! INFO  taskrelay: task requeued task_id=9f.. retry_count=1 delay_ms=0
//! ERROR taskrelay: watchdog gave up task_id=9f.. reason="max retries (2) exceeded: .."
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task_id = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::TaskSubmitted => tracing::info!(
                target: "taskrelay",
                task_id,
                status_id = e.status_id.as_deref().unwrap_or("-"),
                queue = e.queue.unwrap_or("-"),
                timeout_ms = e.timeout_ms,
                "task submitted"
            ),
            EventKind::AssignmentObserved => tracing::info!(
                target: "taskrelay",
                task_id,
                worker_id = e.worker.as_deref().unwrap_or("-"),
                retry_count = e.attempt,
                "task assigned"
            ),
            EventKind::AttemptFailed => tracing::warn!(
                target: "taskrelay",
                task_id,
                retry_count = e.attempt,
                reason,
                "attempt failed"
            ),
            EventKind::TaskRequeued => tracing::info!(
                target: "taskrelay",
                task_id,
                retry_count = e.attempt,
                delay_ms = e.delay_ms,
                reason,
                "task requeued"
            ),
            EventKind::LivenessExtended => tracing::debug!(
                target: "taskrelay",
                task_id,
                worker_id = e.worker.as_deref().unwrap_or("-"),
                "worker heartbeat record vouched for silent task"
            ),
            EventKind::TerminalReceived => tracing::info!(
                target: "taskrelay",
                task_id,
                status = %e.status.map(|s| s.as_str()).unwrap_or("-"),
                reason,
                "terminal result received"
            ),
            EventKind::WatchdogFailed => tracing::error!(
                target: "taskrelay",
                task_id,
                retry_count = e.attempt,
                reason,
                "watchdog gave up"
            ),
            EventKind::TaskCancelled => {
                tracing::info!(target: "taskrelay", task_id, "task cancelled by caller")
            }
            EventKind::MonitorStopped => {
                tracing::debug!(target: "taskrelay", task_id, monitor = reason, "monitor stopped")
            }
            EventKind::UpdateDropped => tracing::debug!(
                target: "taskrelay",
                task_id,
                status = %e.status.map(|s| s.as_str()).unwrap_or("-"),
                "caller stream full; update dropped"
            ),
            EventKind::MessageIgnored => {
                tracing::debug!(target: "taskrelay", task_id, reason, "channel message ignored")
            }
            EventKind::CloseRequested => tracing::info!(target: "taskrelay", "close requested"),
            EventKind::AllStoppedWithin => {
                tracing::info!(target: "taskrelay", "all monitors stopped within grace")
            }
            EventKind::GraceExceeded => {
                tracing::warn!(target: "taskrelay", "close grace exceeded")
            }
            EventKind::SubscriberOverflow => tracing::warn!(
                target: "taskrelay",
                subscriber = task_id,
                reason,
                "subscriber dropped an event"
            ),
            EventKind::SubscriberPanicked => tracing::error!(
                target: "taskrelay",
                subscriber = task_id,
                info = reason,
                "subscriber panicked"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
