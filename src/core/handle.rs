//! # Task handle: the caller's view of one submitted task.
//!
//! ```text
//! Listener ──try_send──┐
//!                      ├──► mpsc(update_buffer) ──► TaskHandle::{next_update, updates, wait*}
//! Watchdog ──try_send──┘
//!
//! CancelHandle::cancel() ──► records `cancelled` terminal ──► cancel token ──► Listener/Watchdog exit
//! ```
//!
//! ## Rules
//! - The stream ends once both producers have exited.
//! - At most one terminal update is ever delivered: the first producer to fill
//!   the terminal slot wins, later ones are discarded. Only that update ends
//!   `wait`; an intermediate `update` carrying a terminal status does not.
//! - Producers never block on the stream; a full buffer drops the update.
//! - Dropping a handle does not cancel the task. Monitoring (and requeueing)
//!   continues until a terminal outcome.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::AwaitError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{TaskStatus, TaskUpdate};

/// The two ids that name a task. Stable across retries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TaskIdentity {
    /// Identity of the unit of work; keys the assignment record.
    pub task_id: String,
    /// Names the update channel `task_status:{status_id}`.
    pub status_id: String,
}

/// State shared by a handle, its cancel handles, its listener and its watchdog.
pub(crate) struct TaskState {
    pub(crate) identity: TaskIdentity,
    /// Fired by the caller.
    pub(crate) cancel: CancellationToken,
    /// Fired once a terminal update has been delivered.
    pub(crate) finished: CancellationToken,
    cancelled: AtomicBool,
    terminal: OnceLock<TaskUpdate>,
    running: AtomicBool,
    last_seen: Mutex<Option<Instant>>,
    bus: Bus,
}

impl TaskState {
    pub(crate) fn new(identity: TaskIdentity, bus: Bus) -> Self {
        Self {
            identity,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            cancelled: AtomicBool::new(false),
            terminal: OnceLock::new(),
            running: AtomicBool::new(false),
            last_seen: Mutex::new(None),
            bus,
        }
    }

    pub(crate) fn task_id(&self) -> &str {
        &self.identity.task_id
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    pub(crate) fn terminal(&self) -> Option<TaskUpdate> {
        self.terminal.get().cloned()
    }

    /// Claims the terminal slot and forwards `update` to the caller.
    ///
    /// Returns `false` (and sends nothing) if another terminal already won.
    pub(crate) fn deliver_terminal(&self, tx: &mpsc::Sender<TaskUpdate>, update: TaskUpdate) -> bool {
        if self.terminal.set(update.clone()).is_err() {
            return false;
        }
        self.forward(tx, update);
        self.finished.cancel();
        true
    }

    /// Try-sends an update, reporting drops on the bus.
    pub(crate) fn forward(&self, tx: &mpsc::Sender<TaskUpdate>, update: TaskUpdate) {
        let status = update.status;
        if tx.try_send(update).is_err() {
            self.bus.publish(
                Event::new(EventKind::UpdateDropped)
                    .with_task(self.task_id())
                    .with_status(status),
            );
        }
    }

    /// Records a sign of life. `running` marks that execution has begun.
    pub(crate) fn touch(&self, running: bool) {
        *self.last_seen.lock() = Some(Instant::now());
        if running {
            self.running.store(true, Ordering::Release);
        }
    }

    /// Forgets liveness of the previous attempt.
    pub(crate) fn reset_liveness(&self) {
        self.running.store(false, Ordering::Release);
        *self.last_seen.lock() = None;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Time since the last sign of life, or `None` if nothing was seen this attempt.
    pub(crate) fn silence(&self) -> Option<Duration> {
        self.last_seen.lock().map(|at| at.elapsed())
    }

    fn cancel_once(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.terminal.set(TaskUpdate::cancelled(self.task_id()));
        self.cancel.cancel();
        self.bus.publish(
            Event::new(EventKind::TaskCancelled)
                .with_task(self.task_id())
                .with_status_id(self.identity.status_id.as_str()),
        );
    }
}

/// Cloneable cancel capability for a task.
///
/// Lets one task cancel while another is blocked in [`TaskHandle::wait`].
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<TaskState>,
}

impl CancelHandle {
    /// Stops local monitoring of the task and resolves pending waits with `cancelled`.
    ///
    /// Idempotent: only the first call has an effect. The remote worker is not
    /// told; it may still finish the task.
    pub fn cancel(&self) {
        self.state.cancel_once();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("task_id", &self.state.identity.task_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Handle to one submitted task.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use taskrelay::{Dispatcher, MemoryBroker, Priority, TaskStatus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dispatcher = Dispatcher::builder(Arc::new(MemoryBroker::new())).build();
/// let mut handle = dispatcher.submit_request(
///     taskrelay::TaskRequest::new("backtest").with_priority(Priority::High),
/// ).await?;
///
/// let first = handle.next_update().await.expect("queued update");
/// assert_eq!(first.status, TaskStatus::Queued);
///
/// handle.cancel();
/// let last = handle.wait(&CancellationToken::new()).await?;
/// assert_eq!(last.status, TaskStatus::Cancelled);
/// # Ok(())
/// # }
/// ```
pub struct TaskHandle {
    rx: mpsc::Receiver<TaskUpdate>,
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(rx: mpsc::Receiver<TaskUpdate>, state: Arc<TaskState>) -> Self {
        Self { rx, state }
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.state.identity
    }

    pub fn task_id(&self) -> &str {
        &self.state.identity.task_id
    }

    pub fn status_id(&self) -> &str {
        &self.state.identity.status_id
    }

    /// Returns a cloneable cancel capability.
    pub fn canceller(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// See [`CancelHandle::cancel`].
    pub fn cancel(&self) {
        self.state.cancel_once();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Next caller-visible update; `None` once monitoring has ended.
    pub async fn next_update(&mut self) -> Option<TaskUpdate> {
        self.rx.recv().await
    }

    /// Stream view over [`next_update`](Self::next_update).
    pub fn updates(&mut self) -> impl Stream<Item = TaskUpdate> + '_ {
        futures::stream::poll_fn(move |cx| self.rx.poll_recv(cx))
    }

    /// Waits for the terminal update.
    ///
    /// Intermediate updates are consumed and discarded, including `update`
    /// messages that carry a terminal status: only the update recorded in the
    /// terminal slot ends the wait. Returns `Ok` for every terminal status,
    /// including `error` and `cancelled`.
    ///
    /// # Errors
    /// - [`AwaitError::ContextCancelled`] if `ctx` fires first.
    /// - [`AwaitError::NoFinalResult`] if monitoring ended without a terminal update.
    pub async fn wait(&mut self, ctx: &CancellationToken) -> Result<TaskUpdate, AwaitError> {
        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(AwaitError::ContextCancelled),
                _ = self.state.cancel.cancelled() => {
                    return Ok(self
                        .state
                        .terminal()
                        .unwrap_or_else(|| TaskUpdate::cancelled(self.task_id())));
                }
                next = self.rx.recv() => match next {
                    Some(update) if self.is_recorded_terminal(&update) => return Ok(update),
                    Some(_) => continue,
                    None => return self.state.terminal().ok_or(AwaitError::NoFinalResult),
                },
            }
        }
    }

    fn is_recorded_terminal(&self, update: &TaskUpdate) -> bool {
        update.is_terminal() && self.state.terminal.get() == Some(update)
    }

    /// Waits, then decodes a `completed` result into `out`.
    ///
    /// `out` is left untouched on error.
    pub async fn wait_into<T: DeserializeOwned>(
        &mut self,
        ctx: &CancellationToken,
        out: &mut T,
    ) -> Result<(), AwaitError> {
        *out = self.wait_typed(ctx).await?;
        Ok(())
    }

    /// Waits, then decodes a `completed` result as `T`.
    ///
    /// # Errors
    /// Everything [`wait`](Self::wait) returns, plus
    /// [`AwaitError::TaskFailed`], [`AwaitError::TaskCancelled`],
    /// [`AwaitError::UnexpectedStatus`] and [`AwaitError::Decode`].
    pub async fn wait_typed<T: DeserializeOwned>(
        &mut self,
        ctx: &CancellationToken,
    ) -> Result<T, AwaitError> {
        decode(self.wait(ctx).await?)
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("identity", &self.state.identity)
            .finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(update: TaskUpdate) -> Result<T, AwaitError> {
    match update.status {
        TaskStatus::Completed => Ok(serde_json::from_value(update.data)?),
        TaskStatus::Error => Err(AwaitError::TaskFailed {
            reason: update.error.unwrap_or_else(|| update.data.to_string()),
        }),
        TaskStatus::Cancelled => Err(AwaitError::TaskCancelled),
        status => Err(AwaitError::UnexpectedStatus { status }),
    }
}
