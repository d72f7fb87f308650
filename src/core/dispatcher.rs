//! # Dispatcher: submits tasks, spawns their monitors, and owns shutdown.
//!
//! The [`Dispatcher`] owns the event bus, a [`SubscriberSet`], the
//! [`InFlightTracker`] and a [`TaskTracker`] over every listener and watchdog
//! it has spawned. The broker is injected; the dispatcher never creates one.
//!
//! ## High-level architecture
//! ```text
//! submit_request(req)
//!   ├─► resolve defaults, validate               (DispatchError::InvalidRequest)
//!   ├─► task_id, status_id = uuid v4
//!   ├─► broker.subscribe(task_status:{status_id}) (before the push: no early message is lost)
//!   ├─► broker.push(queue, envelope)               (not retried)
//!   ├─► try_send(queued) into the handle's stream
//!   ├─► Bus.publish(TaskSubmitted), InFlightTracker::track
//!   └─► monitors.spawn(listener::run)  ──┐   ctx = runtime_token.child_token()
//!       monitors.spawn(Watchdog::run) ───┘   each marks itself stopped in the tracker on exit
//!
//! Event flow:
//!   Listener/Watchdog/Handle ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                           └─► SubscriberSet::emit
//!
//! Shutdown path (close_all):
//!   Bus.publish(CloseRequested)
//!   runtime_token.cancel()            → every listener and watchdog exits
//!   timeout(grace, monitors.wait()):
//!      ├─ Ok   → Bus.publish(AllStoppedWithin)
//!      └─ Err  → Bus.publish(GraceExceeded), RuntimeError::GraceExceeded { stuck }
//!   broker.close()
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::broker::Broker;
use crate::core::builder::DispatcherBuilder;
use crate::core::config::DispatcherConfig;
use crate::core::handle::{TaskHandle, TaskIdentity, TaskState};
use crate::core::listener;
use crate::core::tracker::{InFlightTracker, Monitor};
use crate::core::watchdog::Watchdog;
use crate::error::{BrokerError, DispatchError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::protocol::names::{assignment_key, heartbeat_key, status_channel};
use crate::protocol::{Priority, TaskAssignment, TaskEnvelope, TaskUpdate, WorkerHeartbeat};
use crate::subscribers::SubscriberSet;
use crate::tasks::TaskRequest;

/// Entry point for submitting and monitoring tasks.
pub struct Dispatcher {
    cfg: Arc<DispatcherConfig>,
    broker: Arc<dyn Broker>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    tracker: Arc<InFlightTracker>,
    runtime_token: CancellationToken,
    monitors: TaskTracker,
}

impl Dispatcher {
    /// Starts building a dispatcher over `broker`.
    pub fn builder(broker: Arc<dyn Broker>) -> DispatcherBuilder {
        DispatcherBuilder::new(broker)
    }

    pub(crate) fn new_internal(
        cfg: DispatcherConfig,
        broker: Arc<dyn Broker>,
        bus: Bus,
        subs: Arc<SubscriberSet>,
    ) -> Self {
        Self {
            cfg: Arc::new(cfg),
            broker,
            bus,
            subs,
            tracker: Arc::new(InFlightTracker::new()),
            runtime_token: CancellationToken::new(),
            monitors: TaskTracker::new(),
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    pub(crate) fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "taskrelay", skipped, "event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Submits a task and returns its handle immediately.
    ///
    /// `priority` accepts a [`Priority`] or a `bool` (`true` = high).
    ///
    /// # Errors
    /// Invalid input, payload serialization failure, or a broker failure on the
    /// initial subscribe/push. No monitoring is started in that case.
    pub async fn submit<T: Serialize + ?Sized>(
        &self,
        task_type: impl Into<String>,
        payload: &T,
        priority: impl Into<Priority>,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<TaskHandle, DispatchError> {
        let req = TaskRequest::new(task_type)
            .with_payload(payload)?
            .with_priority(priority)
            .with_max_retries(max_retries)
            .with_timeout(timeout);
        self.submit_request(req).await
    }

    /// Submits a builder-style request; unset fields use the config defaults.
    pub async fn submit_request(&self, req: TaskRequest) -> Result<TaskHandle, DispatchError> {
        let req = req.resolve(&self.cfg)?;
        if self.runtime_token.is_cancelled() {
            return Err(BrokerError::Closed.into());
        }

        let identity = TaskIdentity {
            task_id: Uuid::new_v4().to_string(),
            status_id: Uuid::new_v4().to_string(),
        };
        let envelope = TaskEnvelope::new(
            identity.task_id.as_str(),
            identity.status_id.as_str(),
            req.task_type,
            req.kwargs,
            req.priority,
            self.cfg.heartbeat_interval_secs(),
        );
        let bytes = envelope.to_vec()?;

        let sub = self
            .broker
            .subscribe(&status_channel(&identity.status_id))
            .await?;
        self.broker.push(envelope.queue_name(), bytes).await?;

        let (tx, rx) = mpsc::channel(self.cfg.update_buffer_clamped());
        let _ = tx.try_send(TaskUpdate::queued(identity.task_id.as_str()));
        let state = Arc::new(TaskState::new(identity, self.bus.clone()));

        self.bus.publish(
            Event::new(EventKind::TaskSubmitted)
                .with_task(state.task_id())
                .with_status_id(state.identity.status_id.as_str())
                .with_queue(envelope.queue_name())
                .with_attempt(0)
                .with_timeout(req.timeout),
        );

        self.tracker.track(state.task_id()).await;

        let ctx = self.runtime_token.child_token();
        let tracker = Arc::clone(&self.tracker);
        let listener_state = Arc::clone(&state);
        let listener_tx = tx.clone();
        let listener_ctx = ctx.clone();
        self.monitors.spawn(async move {
            let task_id = listener_state.task_id().to_string();
            listener::run(listener_state, sub, listener_tx, listener_ctx).await;
            tracker.stopped(&task_id, Monitor::Listener).await;
        });
        let watchdog = Watchdog {
            state: Arc::clone(&state),
            broker: Arc::clone(&self.broker),
            cfg: Arc::clone(&self.cfg),
            envelope,
            max_retries: req.max_retries,
            timeout: req.timeout,
            tx,
        };
        let tracker = Arc::clone(&self.tracker);
        let task_id = state.task_id().to_string();
        self.monitors.spawn(async move {
            watchdog.run(ctx).await;
            tracker.stopped(&task_id, Monitor::Watchdog).await;
        });

        Ok(TaskHandle::new(rx, state))
    }

    /// Reads the assignment record of `task_id`, if a worker has claimed it.
    pub async fn assignment(&self, task_id: &str) -> Result<Option<TaskAssignment>, DispatchError> {
        match self.broker.get(&assignment_key(task_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Reads the heartbeat record a worker maintains for itself.
    pub async fn worker_heartbeat(
        &self,
        worker_id: &str,
    ) -> Result<Option<WorkerHeartbeat>, DispatchError> {
        match self.broker.get(&heartbeat_key(worker_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Sorted ids of tasks whose monitors are still running.
    pub async fn in_flight(&self) -> Vec<String> {
        self.tracker.snapshot().await
    }

    /// Receiver of runtime events published after this call.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.cfg
    }

    /// Stops every monitor, waits up to `grace`, then closes the broker.
    ///
    /// Handles still held by callers see their streams end; pending
    /// [`TaskHandle::wait`] calls resolve with the recorded terminal update or
    /// [`AwaitError::NoFinalResult`](crate::AwaitError::NoFinalResult).
    /// Later submissions fail with [`BrokerError::Closed`].
    ///
    /// # Errors
    /// [`RuntimeError::GraceExceeded`] naming the tasks still monitored.
    pub async fn close_all(&self, grace: Duration) -> Result<(), RuntimeError> {
        self.bus.publish(Event::new(EventKind::CloseRequested));
        self.runtime_token.cancel();
        self.monitors.close();

        let res = match tokio::time::timeout(grace, self.monitors.wait()).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                self.bus.publish(Event::new(EventKind::GraceExceeded));
                let stuck = self.tracker.snapshot().await;
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        };

        if let Err(err) = self.broker.close().await {
            tracing::warn!(target: "taskrelay", error = %err, label = err.as_label(), "broker close failed");
        }
        res
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cfg", &self.cfg)
            .field("subscribers", &self.subs.len())
            .field("monitors", &self.monitors.len())
            .finish_non_exhaustive()
    }
}
