//! Wire protocol shared with the worker pool.
//!
//! Field names of every type in this module are an external contract: workers
//! in other processes (and other languages) read and write them verbatim.
//!
//! ## Contents
//! - [`TaskEnvelope`], [`Priority`], [`RetryPayload`]: the unit pushed onto a work queue
//! - [`UpdateMessage`], [`MessageType`], [`TaskStatus`]: events on `task_status:{status_id}`
//! - [`TaskUpdate`]: the caller-visible form of an update
//! - [`TaskAssignment`], [`WorkerHeartbeat`]: worker-owned key/value records
//! - [`names`]: queue, key and channel naming

mod envelope;
mod message;
pub mod names;
mod records;
mod update;

pub use envelope::{Priority, RetryPayload, TaskEnvelope};
pub use message::{MessageType, TaskStatus, UpdateMessage};
pub use records::{TaskAssignment, WorkerHeartbeat};
pub use update::TaskUpdate;
