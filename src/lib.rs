//! # taskrelay
//!
//! **Taskrelay** hands long-running, possibly-failing units of work to an
//! external worker pool through a shared broker, then tracks each one to
//! completion without blocking the caller.
//!
//! Submission returns a [`TaskHandle`] immediately. Behind it, one listener
//! consumes the task's update channel and one watchdog waits for a worker to
//! claim the task, supervises its heartbeats and timeouts, and requeues it
//! (bounded by `max_retries`) when the worker disappears.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller
//!     │ submit(task_type, payload, priority, max_retries, timeout)
//!     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Dispatcher                                                       │
//! │  - Bus (broadcast events)                                         │
//! │  - InFlightTracker (which tasks still have monitors)              │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - TaskTracker (every listener/watchdog, joined by close_all)     │
//! └──────┬──────────────────────────┬──────────────────────────┬──────┘
//!        │ subscribe + push          │ spawn                    │ spawn
//!        ▼                          ▼                          ▼
//! ┌──────────────┐          ┌──────────────┐           ┌──────────────┐
//! │    Broker    │◄─ get ───│   Watchdog   │           │   Listener   │
//! │ queue / kv / │◄─ push ──│ (per task)   │           │  (per task)  │
//! │   pub/sub    │── msgs ──┼──────────────┼──────────►│              │
//! └──────▲───────┘          └──────┬───────┘           └──────┬───────┘
//!        │                         │ try_send                 │ try_send
//!   worker pool                    └────────────┬─────────────┘
//!   (external)                                  ▼
//!                                  TaskHandle (bounded, lossy stream)
//!                                  next_update / wait / wait_typed / cancel
//! ```
//!
//! ### Lifecycle
//! ```text
//! submit ──► push envelope ──► WaitingForAssignment ──► Supervising ──► result ──► done
//!                                   ▲        │ timeout        │ dead / timeout / never started
//!                                   │        ▼                ▼
//!                                   └──── requeue (same task_id, status_id, retry_count+1)
//!                                            │ budget exhausted
//!                                            ▼
//!                                 synthesized `error` result ──► done
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Dispatch**      | Submit work, inspect worker records, shut down.               | [`Dispatcher`], [`TaskRequest`]             |
//! | **Handles**       | Stream updates, await (typed) results, cancel.                | [`TaskHandle`], [`CancelHandle`]            |
//! | **Broker**        | Queue, key/value and pub/sub transport.                       | [`Broker`], [`MemoryBroker`]                |
//! | **Protocol**      | Wire types shared with workers.                               | [`TaskEnvelope`], [`UpdateMessage`]         |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom).          | [`Subscribe`], [`LogWriter`]                |
//! | **Policies**      | Pace requeues.                                                | [`BackoffPolicy`], [`JitterPolicy`]         |
//! | **Errors**        | Typed errors for submission, awaiting and brokers.            | [`DispatchError`], [`AwaitError`]           |
//! | **Configuration** | Timings, buffers and defaults, with env overlay.              | [`DispatcherConfig`]                        |
//!
//! ## Optional features
//! - `redis`: exports `RedisBroker` over the `redis` crate.
//! - `redis-tests`: runs broker tests against `REDIS_URL`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use taskrelay::{
//!     Broker, Dispatcher, DispatcherConfig, LogWriter, MemoryBroker, Subscribe, TaskStatus,
//!     UpdateMessage, protocol::names,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Arc::new(MemoryBroker::new());
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let dispatcher = Dispatcher::builder(broker.clone())
//!         .with_config(DispatcherConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let mut handle = dispatcher
//!         .submit("backtest", &json!({"symbol": "AAPL"}), false, 3, Duration::from_secs(600))
//!         .await?;
//!
//!     // Play the worker: answer on the task's update channel.
//!     let channel = names::status_channel(handle.status_id());
//!     let done = UpdateMessage::result(handle.task_id(), TaskStatus::Completed, json!({"pnl": 1.5}));
//!     broker.publish(&channel, done.to_vec()?).await?;
//!
//!     #[derive(serde::Deserialize)]
//!     struct Outcome { pnl: f64 }
//!     let out: Outcome = handle.wait_typed(&CancellationToken::new()).await?;
//!     assert_eq!(out.pnl, 1.5);
//!
//!     dispatcher.close_all(Duration::from_secs(1)).await?;
//!     Ok(())
//! }
//! ```
mod broker;
mod core;
mod error;
mod events;
mod policies;
pub mod protocol;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use broker::{Broker, MemoryBroker, Subscription};
pub use core::{
    CancelHandle, Dispatcher, DispatcherBuilder, DispatcherConfig, InFlightTracker, TaskHandle,
    TaskIdentity,
};
pub use error::{AttemptFailure, AwaitError, BrokerError, DispatchError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use protocol::{
    MessageType, Priority, RetryPayload, TaskAssignment, TaskEnvelope, TaskStatus, TaskUpdate,
    UpdateMessage, WorkerHeartbeat,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::TaskRequest;

// Optional: Redis-backed broker.
// Enable with: `--features redis`
#[cfg(feature = "redis")]
pub use broker::RedisBroker;
