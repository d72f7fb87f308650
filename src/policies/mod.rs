//! Requeue pacing policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how requeue delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid a requeue stampede
//!
//! ## Quick wiring
//! ```text
//! DispatcherConfig { requeue_backoff: BackoffPolicy, .. }
//!      └─► core::watchdog uses backoff.delay_for(retry_count) before each push
//! ```
//!
//! ## Defaults
//! - `DispatcherConfig::default()` uses `BackoffPolicy::immediate()` (no delay).
//! - `BackoffPolicy::default()` → first=500ms, factor=2.0, max=30s, jitter=Equal.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
