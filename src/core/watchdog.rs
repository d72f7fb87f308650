//! # Watchdog: supervises one task across all of its attempts.
//!
//! ```text
//!            ┌──────────────────────────────────────────────────────────┐
//!            ▼                                                          │
//! WaitingForAssignment ──found──► Supervising ──terminal seen──► exit   │
//!   │ poll every `assignment_poll_interval`   │ tick every `heartbeat_interval`
//!   │ up to `assignment_timeout`              │ execution timeout / never started / worker dead
//!   └──────────── AttemptFailure ─────────────┘
//!                        │
//!                        ▼
//!        retries >= max_retries ? ──yes──► synthesize `error` result, exit
//!                        │no
//!                        ▼
//!   delete assignment → backoff → push same envelope (retry_count+1) ─────┘
//! ```
//!
//! ## Rules
//! - Every wait selects on context, cancellation and the finished signal
//!   first (`biased`), so cancellation always beats a pending retry.
//! - Only infrastructure failures count against the budget. A worker-reported
//!   `error` arrives as a terminal result and ends the watchdog like success.
//! - Requeues keep `task_id` and `status_id`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::core::config::DispatcherConfig;
use crate::core::handle::TaskState;
use crate::error::AttemptFailure;
use crate::events::{Event, EventKind};
use crate::protocol::names::{assignment_key, heartbeat_key};
use crate::protocol::{TaskAssignment, TaskEnvelope, TaskUpdate, UpdateMessage, WorkerHeartbeat};

/// Why an attempt stopped being supervised.
enum Exit {
    /// Terminal seen, cancelled, or context ended.
    Stopped,
    Failed(AttemptFailure),
}

impl From<AttemptFailure> for Exit {
    fn from(f: AttemptFailure) -> Self {
        Exit::Failed(f)
    }
}

enum Requeue {
    Pushed,
    Stopped,
    Failed(AttemptFailure),
}

/// Per-task supervisor.
pub(crate) struct Watchdog {
    pub(crate) state: Arc<TaskState>,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) cfg: Arc<DispatcherConfig>,
    pub(crate) envelope: TaskEnvelope,
    pub(crate) max_retries: u32,
    pub(crate) timeout: Duration,
    pub(crate) tx: mpsc::Sender<TaskUpdate>,
}

impl Watchdog {
    /// Runs until a terminal outcome, cancellation, or `ctx` ends.
    pub(crate) async fn run(self, ctx: CancellationToken) {
        let mut retries: u32 = 0;
        let mut pending: Option<AttemptFailure> = None;

        loop {
            let failure = match pending.take() {
                Some(f) => f,
                None => match self.attempt(&ctx, retries).await {
                    Exit::Stopped => break,
                    Exit::Failed(f) => f,
                },
            };
            self.state.bus().publish(
                Event::new(EventKind::AttemptFailed)
                    .with_task(self.state.task_id())
                    .with_attempt(retries)
                    .with_reason(failure.to_string()),
            );

            if retries >= self.max_retries {
                self.give_up(retries, &failure);
                break;
            }
            let next = retries + 1;
            match self.requeue(&ctx, next, &failure).await {
                Requeue::Stopped => break,
                Requeue::Pushed => {}
                Requeue::Failed(f) => pending = Some(f),
            }
            retries = next;
        }

        self.state.bus().publish(
            Event::new(EventKind::MonitorStopped)
                .with_task(self.state.task_id())
                .with_reason("watchdog"),
        );
    }

    async fn attempt(&self, ctx: &CancellationToken, retries: u32) -> Exit {
        match self.wait_for_assignment(ctx, retries).await {
            Ok(assignment) => self.supervise(ctx, &assignment).await,
            Err(exit) => exit,
        }
    }

    async fn wait_for_assignment(
        &self,
        ctx: &CancellationToken,
        retries: u32,
    ) -> Result<TaskAssignment, Exit> {
        let waited = self.cfg.assignment_timeout;
        let deadline = Instant::now() + waited;
        let key = assignment_key(self.state.task_id());
        let mut poll = time::interval(self.cfg.poll_interval_clamped());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(Exit::Stopped),
                _ = self.state.cancel.cancelled() => return Err(Exit::Stopped),
                _ = self.state.finished.cancelled() => return Err(Exit::Stopped),
                _ = time::sleep_until(deadline) => {
                    return Err(AttemptFailure::AssignmentTimeout { waited }.into());
                }
                _ = poll.tick() => {}
            }

            let Some(raw) = self.broker.get(&key).await.map_err(AttemptFailure::from)? else {
                continue;
            };
            let assignment: TaskAssignment =
                serde_json::from_slice(&raw).map_err(|e| AttemptFailure::InvalidAssignment {
                    reason: e.to_string(),
                })?;
            self.state.bus().publish(
                Event::new(EventKind::AssignmentObserved)
                    .with_task(self.state.task_id())
                    .with_worker(assignment.worker_id.as_str())
                    .with_attempt(retries),
            );
            return Ok(assignment);
        }
    }

    async fn supervise(&self, ctx: &CancellationToken, assignment: &TaskAssignment) -> Exit {
        let Some(started_at) = assignment.started_at() else {
            return AttemptFailure::InvalidAssignment {
                reason: format!("unparsable started_at {:?}", assignment.started_at),
            }
            .into();
        };
        let age = (Utc::now() - started_at).to_std().unwrap_or(Duration::ZERO);
        let now = Instant::now();
        let started = now.checked_sub(age).unwrap_or(now);

        let period = self.cfg.tick_interval();
        let window = self.cfg.heartbeat_miss_window();
        let mut tick = time::interval_at(now + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Exit::Stopped,
                _ = self.state.cancel.cancelled() => return Exit::Stopped,
                _ = self.state.finished.cancelled() => return Exit::Stopped,
                _ = tick.tick() => {}
            }

            let elapsed = started.elapsed();
            if elapsed > self.timeout {
                return AttemptFailure::ExecutionTimeout {
                    timeout: self.timeout,
                }
                .into();
            }
            if !self.state.is_running() {
                if elapsed > self.cfg.startup_grace {
                    return AttemptFailure::NeverStarted {
                        grace: self.cfg.startup_grace,
                    }
                    .into();
                }
                continue;
            }

            let silence = self.state.silence().unwrap_or(elapsed);
            if silence <= window {
                continue;
            }
            if self.vouched_by_worker(&assignment.worker_id, window).await {
                self.state.touch(false);
                self.state.bus().publish(
                    Event::new(EventKind::LivenessExtended)
                        .with_task(self.state.task_id())
                        .with_worker(assignment.worker_id.as_str()),
                );
                continue;
            }
            return AttemptFailure::WorkerDead { silence }.into();
        }
    }

    /// Secondary liveness: the worker's own heartbeat record names this task.
    async fn vouched_by_worker(&self, worker_id: &str, window: Duration) -> bool {
        let Ok(Some(raw)) = self.broker.get(&heartbeat_key(worker_id)).await else {
            return false;
        };
        serde_json::from_slice::<WorkerHeartbeat>(&raw)
            .map(|hb| hb.vouches_for(self.state.task_id(), window, Utc::now()))
            .unwrap_or(false)
    }

    async fn requeue(&self, ctx: &CancellationToken, next: u32, failure: &AttemptFailure) -> Requeue {
        let task_id = self.state.task_id();
        if let Err(err) = self.broker.delete(&assignment_key(task_id)).await {
            tracing::debug!(target: "taskrelay", task_id, error = %err, "stale assignment not deleted");
        }

        let delay = self.cfg.requeue_backoff.delay_for(next);
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Requeue::Stopped,
                _ = self.state.cancel.cancelled() => return Requeue::Stopped,
                _ = self.state.finished.cancelled() => return Requeue::Stopped,
                _ = time::sleep(delay) => {}
            }
        }
        if ctx.is_cancelled() || self.state.cancel.is_cancelled() || self.state.finished.is_cancelled() {
            return Requeue::Stopped;
        }

        let reason = failure.to_string();
        let envelope = self.envelope.for_retry(next, &reason, self.cfg.retry_payload);
        let bytes = match envelope.to_vec() {
            Ok(bytes) => bytes,
            Err(err) => {
                return Requeue::Failed(AttemptFailure::Broker {
                    message: format!("envelope encoding failed: {err}"),
                });
            }
        };

        self.state.reset_liveness();
        if let Err(err) = self.broker.push(envelope.queue_name(), bytes).await {
            return Requeue::Failed(err.into());
        }
        self.state.bus().publish(
            Event::new(EventKind::TaskRequeued)
                .with_task(task_id)
                .with_status_id(envelope.status_id.as_str())
                .with_queue(envelope.queue_name())
                .with_attempt(next)
                .with_delay(delay)
                .with_reason(reason),
        );
        Requeue::Pushed
    }

    /// Budget exhausted: delivers a locally synthesized `error` result.
    fn give_up(&self, retries: u32, failure: &AttemptFailure) {
        let reason = if failure.is_assignment_failure() {
            format!(
                "failed to get task assignment after max retries ({})",
                self.max_retries
            )
        } else {
            format!("max retries ({}) exceeded: {failure}", self.max_retries)
        };
        let msg = UpdateMessage::watchdog_failure(
            self.state.task_id(),
            &reason,
            failure.as_label(),
            retries,
        );
        if self.state.deliver_terminal(&self.tx, TaskUpdate::from_message(&msg)) {
            self.state.bus().publish(
                Event::new(EventKind::WatchdogFailed)
                    .with_task(self.state.task_id())
                    .with_attempt(retries)
                    .with_reason(reason),
            );
        }
    }
}
