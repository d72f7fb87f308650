//! # Runtime events emitted by the dispatcher, listeners and watchdogs.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Submission events**: a task entered the system
//! - **Monitoring events**: assignment, attempt failures, requeues, terminal outcomes
//! - **Delivery events**: updates dropped or ignored on the way to the caller
//! - **Runtime events**: close/grace handling and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, task id,
//! reasons and retry counts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use taskrelay::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::AttemptFailed)
//!     .with_task("task-1")
//!     .with_reason("worker heartbeat timeout")
//!     .with_attempt(2);
//!
//! assert_eq!(ev.kind, EventKind::AttemptFailed);
//! assert_eq!(ev.task.as_deref(), Some("task-1"));
//! assert_eq!(ev.attempt, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::protocol::TaskStatus;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    // === Runtime events ===
    /// `Dispatcher::close_all` was called.
    CloseRequested,

    /// All monitors stopped within the close grace period.
    AllStoppedWithin,

    /// Close grace exceeded; some monitors were still running.
    GraceExceeded,

    // === Submission ===
    /// Envelope pushed and monitoring started.
    ///
    /// Sets:
    /// - `task`, `status_id`
    /// - `queue`: queue name
    /// - `timeout_ms`: per-attempt timeout
    TaskSubmitted,

    // === Monitoring ===
    /// Watchdog found the assignment record.
    ///
    /// Sets:
    /// - `task`, `worker`, `attempt` (retries so far)
    AssignmentObserved,

    /// Watchdog abandoned the current attempt.
    ///
    /// Sets:
    /// - `task`, `attempt`
    /// - `reason`: failure message
    AttemptFailed,

    /// Envelope pushed again after a failed attempt.
    ///
    /// Sets:
    /// - `task`, `status_id`, `queue`
    /// - `attempt`: new retry count
    /// - `delay_ms`: requeue delay applied
    /// - `reason`: why the previous attempt was abandoned
    TaskRequeued,

    /// Worker heartbeat record kept a silent task alive.
    ///
    /// Sets:
    /// - `task`, `worker`
    LivenessExtended,

    /// A terminal result arrived from the update channel.
    ///
    /// Sets:
    /// - `task`, `status`
    /// - `reason`: `data.error` for error results
    TerminalReceived,

    /// Watchdog gave up and synthesized a terminal error.
    ///
    /// Sets:
    /// - `task`, `attempt`
    /// - `reason`: terminal error text
    WatchdogFailed,

    /// Caller cancelled the handle.
    ///
    /// Sets:
    /// - `task`
    TaskCancelled,

    /// Listener or watchdog for a task exited.
    ///
    /// Sets:
    /// - `task`
    /// - `reason`: "listener" or "watchdog"
    MonitorStopped,

    // === Delivery ===
    /// Caller stream was full (or gone); the update was dropped.
    ///
    /// Sets:
    /// - `task`, `status`
    UpdateDropped,

    /// A channel message was discarded (foreign task id or undecodable).
    ///
    /// Sets:
    /// - `task`
    /// - `reason`: why it was ignored
    MessageIgnored,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task id (or subscriber name for subscriber events).
    pub task: Option<Arc<str>>,
    /// Update channel id.
    pub status_id: Option<Arc<str>>,
    /// Worker id from the assignment record.
    pub worker: Option<Arc<str>>,
    /// Queue name.
    pub queue: Option<&'static str>,
    /// Task status carried by an update.
    pub status: Option<TaskStatus>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Retry count at the time of the event (0 for the first attempt).
    pub attempt: Option<u32>,
    /// Per-attempt timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Requeue delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            status_id: None,
            worker: None,
            queue: None,
            status: None,
            reason: None,
            attempt: None,
            timeout_ms: None,
            delay_ms: None,
        }
    }

    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    #[inline]
    pub fn with_status_id(mut self, status_id: impl Into<Arc<str>>) -> Self {
        self.status_id = Some(status_id.into());
        self
    }

    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    #[inline]
    pub fn with_queue(mut self, queue: &'static str) -> Self {
        self.queue = Some(queue);
        self
    }

    #[inline]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a requeue delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::TaskSubmitted);
        let b = Event::new(EventKind::TaskSubmitted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn durations_are_clamped() {
        let ev = Event::new(EventKind::TaskRequeued).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
