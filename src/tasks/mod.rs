//! # Task submission requests.
//!
//! - [`TaskRequest`] - builder bundling task type, payload, priority, retry
//!   budget and per-attempt timeout.

mod request;

pub use request::TaskRequest;
