//! Runtime core: dispatch, monitoring and shutdown.
//!
//! The public API from this module is [`Dispatcher`] (built with
//! [`DispatcherBuilder`]), the [`TaskHandle`] it returns, and
//! [`DispatcherConfig`].
//!
//! Internal modules:
//! - [`dispatcher`]: submission, inspection helpers and `close_all`;
//! - [`handle`]: caller handle, cancel capability and shared task state;
//! - [`listener`]: per-task update channel consumer;
//! - [`watchdog`]: per-task assignment wait, liveness supervision and requeue;
//! - [`tracker`]: which tasks still have monitors running.

mod builder;
mod config;
mod dispatcher;
mod handle;
mod listener;
mod tracker;
mod watchdog;


pub use builder::DispatcherBuilder;
pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use handle::{CancelHandle, TaskHandle, TaskIdentity};
pub use tracker::InFlightTracker;
