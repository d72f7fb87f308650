//! # Event subscribers.
//!
//! ## Architecture
//! ```text
//! Listener / Watchdog ── publish(Event) ──► Bus ──► Dispatcher::subscriber_listener
//!                                                        │
//!                                                        └──► SubscriberSet::emit
//!                                                                 ├──► LogWriter
//!                                                                 ├──► Metrics
//!                                                                 └──► Custom ...
//! ```
//!
//! - [`Subscribe`]: trait for custom event handlers.
//! - [`SubscriberSet`]: per-subscriber queues and workers.
//! - [`LogWriter`]: built-in `tracing` renderer.

mod embedded;
mod subscriber;
mod subscriber_set;

pub use embedded::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
