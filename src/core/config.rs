//! # Dispatcher configuration.
//!
//! Provides [`DispatcherConfig`], the settings shared by every handle a
//! [`Dispatcher`](crate::Dispatcher) creates.
//!
//! Config is used in two ways:
//! 1. **Dispatcher creation**: `Dispatcher::builder(broker).with_config(cfg).build()`
//! 2. **Request defaults**: `TaskRequest` fields left unset inherit
//!    `default_max_retries` / `default_timeout`.
//!
//! ## Sentinel values
//! - `heartbeat_miss_factor = 0` → treated as `1`
//! - `update_buffer = 0`, `bus_capacity = 0` → clamped to `1`
//! - `assignment_poll_interval = 0s` → clamped to 1ms
//!
//! ## Environment overlay
//! [`DispatcherConfig::from_env`] starts from [`Default`] and overrides every
//! field whose `TASKRELAY_*` variable is set and parses:
//!
//! | Variable                             | Field                      | Unit    |
//! |--------------------------------------|----------------------------|---------|
//! | `TASKRELAY_HEARTBEAT_INTERVAL_SECS`  | `heartbeat_interval`       | seconds |
//! | `TASKRELAY_ASSIGNMENT_POLL_MS`       | `assignment_poll_interval` | millis  |
//! | `TASKRELAY_ASSIGNMENT_TIMEOUT_SECS`  | `assignment_timeout`       | seconds |
//! | `TASKRELAY_STARTUP_GRACE_SECS`       | `startup_grace`            | seconds |
//! | `TASKRELAY_HEARTBEAT_MISS_FACTOR`    | `heartbeat_miss_factor`    | count   |
//! | `TASKRELAY_UPDATE_BUFFER`            | `update_buffer`            | count   |
//! | `TASKRELAY_BUS_CAPACITY`             | `bus_capacity`             | count   |
//! | `TASKRELAY_DEFAULT_MAX_RETRIES`      | `default_max_retries`      | count   |
//! | `TASKRELAY_DEFAULT_TIMEOUT_SECS`     | `default_timeout`          | seconds |
//! | `TASKRELAY_RETRY_PAYLOAD`            | `retry_payload`            | `preserve` / `replace` |

use std::str::FromStr;
use std::time::Duration;

use crate::policies::BackoffPolicy;
use crate::protocol::RetryPayload;

/// Configuration for the dispatcher and every watchdog it spawns.
///
/// ## Field semantics
/// - `heartbeat_interval`: advertised to workers in the envelope and used as the
///   watchdog tick (whole seconds on the wire, minimum 1)
/// - `heartbeat_miss_factor × heartbeat_interval`: silence after which a running
///   worker is declared dead
/// - `assignment_poll_interval` / `assignment_timeout`: assignment wait loop
/// - `startup_grace`: how long a claimed task may stay silent before `running`
/// - `update_buffer`: capacity of each handle's update stream (lossy)
///
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Interval workers are asked to heartbeat at; also the watchdog tick.
    pub heartbeat_interval: Duration,

    /// How often the watchdog looks for the assignment record.
    pub assignment_poll_interval: Duration,

    /// How long the watchdog waits for any worker to claim the task.
    pub assignment_timeout: Duration,

    /// Maximum time between assignment and the first `running` update.
    pub startup_grace: Duration,

    /// Missed heartbeats tolerated before a running worker is declared dead.
    pub heartbeat_miss_factor: u32,

    /// Capacity of each handle's update stream.
    ///
    /// Producers never block: when the buffer is full the update is dropped.
    pub update_buffer: usize,

    /// Capacity of the internal event bus ring buffer.
    pub bus_capacity: usize,

    /// Retry budget used when a request does not set one.
    pub default_max_retries: u32,

    /// Per-attempt timeout used when a request does not set one.
    pub default_timeout: Duration,

    /// Delay applied before each requeue.
    pub requeue_backoff: BackoffPolicy,

    /// What a requeued envelope carries in `kwargs`.
    pub retry_payload: RetryPayload,
}

impl DispatcherConfig {
    /// Reads `TASKRELAY_*` variables over the defaults.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let secs = |key: &str| parse_var::<u64>(&lookup, key).map(Duration::from_secs);

        if let Some(v) = secs("TASKRELAY_HEARTBEAT_INTERVAL_SECS") {
            cfg.heartbeat_interval = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "TASKRELAY_ASSIGNMENT_POLL_MS") {
            cfg.assignment_poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = secs("TASKRELAY_ASSIGNMENT_TIMEOUT_SECS") {
            cfg.assignment_timeout = v;
        }
        if let Some(v) = secs("TASKRELAY_STARTUP_GRACE_SECS") {
            cfg.startup_grace = v;
        }
        if let Some(v) = parse_var(&lookup, "TASKRELAY_HEARTBEAT_MISS_FACTOR") {
            cfg.heartbeat_miss_factor = v;
        }
        if let Some(v) = parse_var(&lookup, "TASKRELAY_UPDATE_BUFFER") {
            cfg.update_buffer = v;
        }
        if let Some(v) = parse_var(&lookup, "TASKRELAY_BUS_CAPACITY") {
            cfg.bus_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "TASKRELAY_DEFAULT_MAX_RETRIES") {
            cfg.default_max_retries = v;
        }
        if let Some(v) = secs("TASKRELAY_DEFAULT_TIMEOUT_SECS") {
            cfg.default_timeout = v;
        }
        match lookup("TASKRELAY_RETRY_PAYLOAD").as_deref() {
            None => {}
            Some("preserve") => cfg.retry_payload = RetryPayload::Preserve,
            Some("replace") => cfg.retry_payload = RetryPayload::Replace,
            Some(other) => tracing::warn!(
                target: "taskrelay",
                key = "TASKRELAY_RETRY_PAYLOAD",
                value = other,
                "ignoring unparsable config variable"
            ),
        }
        cfg
    }

    /// Heartbeat interval in whole seconds, as written into envelopes (min 1).
    #[inline]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs().max(1)
    }

    /// Watchdog tick period, matching what workers were told.
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs())
    }

    /// Silence after which a running worker is considered dead.
    #[inline]
    pub fn heartbeat_miss_window(&self) -> Duration {
        self.tick_interval() * self.heartbeat_miss_factor.max(1)
    }

    #[inline]
    pub fn poll_interval_clamped(&self) -> Duration {
        self.assignment_poll_interval.max(Duration::from_millis(1))
    }

    #[inline]
    pub fn update_buffer_clamped(&self) -> usize {
        self.update_buffer.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for DispatcherConfig {
    /// Default configuration:
    ///
    /// - `heartbeat_interval = 5s`, `heartbeat_miss_factor = 3` (dead after 15s of silence)
    /// - `assignment_poll_interval = 1s`, `assignment_timeout = 30s`
    /// - `startup_grace = 120s`
    /// - `update_buffer = 10`, `bus_capacity = 1024`
    /// - `default_max_retries = 3`, `default_timeout = 1h`
    /// - `requeue_backoff = BackoffPolicy::immediate()`
    /// - `retry_payload = RetryPayload::Preserve`
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            assignment_poll_interval: Duration::from_secs(1),
            assignment_timeout: Duration::from_secs(30),
            startup_grace: Duration::from_secs(120),
            heartbeat_miss_factor: 3,
            update_buffer: 10,
            bus_capacity: 1024,
            default_max_retries: 3,
            default_timeout: Duration::from_secs(3600),
            requeue_backoff: BackoffPolicy::immediate(),
            retry_payload: RetryPayload::Preserve,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(
                target: "taskrelay",
                key,
                value = raw.as_str(),
                "ignoring unparsable config variable"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_worker_contract() {
        let cfg = DispatcherConfig::default();
        assert_eq!(cfg.heartbeat_interval_secs(), 5);
        assert_eq!(cfg.heartbeat_miss_window(), Duration::from_secs(15));
        assert_eq!(cfg.assignment_timeout, Duration::from_secs(30));
        assert_eq!(cfg.startup_grace, Duration::from_secs(120));
        assert_eq!(cfg.update_buffer, 10);
        assert_eq!(cfg.retry_payload, RetryPayload::Preserve);
    }

    #[test]
    fn sentinels_are_clamped() {
        let cfg = DispatcherConfig {
            heartbeat_interval: Duration::from_millis(200),
            heartbeat_miss_factor: 0,
            update_buffer: 0,
            bus_capacity: 0,
            assignment_poll_interval: Duration::ZERO,
            ..DispatcherConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval_secs(), 1);
        assert_eq!(cfg.heartbeat_miss_window(), Duration::from_secs(1));
        assert_eq!(cfg.update_buffer_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.poll_interval_clamped(), Duration::from_millis(1));
    }

    #[test]
    fn env_overlay_overrides_parsed_values_only() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TASKRELAY_HEARTBEAT_INTERVAL_SECS", "2"),
            ("TASKRELAY_ASSIGNMENT_POLL_MS", "250"),
            ("TASKRELAY_DEFAULT_MAX_RETRIES", "not-a-number"),
            ("TASKRELAY_RETRY_PAYLOAD", "replace"),
        ]);
        let cfg = DispatcherConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(cfg.assignment_poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.default_max_retries, 3);
        assert_eq!(cfg.retry_payload, RetryPayload::Replace);
        assert_eq!(cfg.assignment_timeout, Duration::from_secs(30));
    }
}
