//! # Requeue pacing.
//!
//! [`BackoffPolicy`] decides how long the watchdog waits between abandoning an
//! attempt and pushing the envelope again. Requeue `n` (1-based) waits
//! `first × factor^(n-1)`, clamped to `max`, then spread by [`JitterPolicy`].
//!
//! The base delay depends only on `n`; jitter output never feeds back into the
//! next computation.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use taskrelay::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(8),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
//! assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
//! assert_eq!(backoff.delay_for(10), Duration::from_secs(8));
//! assert_eq!(BackoffPolicy::immediate().delay_for(5), Duration::ZERO);
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Delay schedule for requeues.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first requeue.
    pub first: Duration,
    /// Upper bound for any requeue delay.
    pub max: Duration,
    /// Multiplicative growth per requeue (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 500ms`, `max = 30s`, `factor = 2.0`, equal jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Requeue without waiting.
    pub const fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Constant delay between requeues.
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Delay before requeue number `retry` (1-based; `0` is treated as `1`).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if secs.is_finite() && secs >= 0.0 && secs <= self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };
        self.jitter.spread(base, self.first.min(self.max), self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn grows_exponentially_then_caps() {
        let p = exp(JitterPolicy::None);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(4), Duration::from_millis(800));
        assert_eq!(p.delay_for(30), Duration::from_secs(10));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn first_above_max_is_clamped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(60),
            ..exp(JitterPolicy::None)
        };
        assert_eq!(p.delay_for(1), Duration::from_secs(10));
    }

    #[test]
    fn immediate_and_fixed() {
        assert_eq!(BackoffPolicy::immediate().delay_for(3), Duration::ZERO);
        let fixed = BackoffPolicy::fixed(Duration::from_secs(2));
        assert_eq!(fixed.delay_for(1), fixed.delay_for(9));
    }

    #[test]
    fn jittered_delays_stay_within_base() {
        for jitter in [JitterPolicy::Full, JitterPolicy::Equal] {
            let p = exp(jitter);
            for retry in 1..12 {
                let base = exp(JitterPolicy::None).delay_for(retry);
                let d = p.delay_for(retry);
                assert!(d <= base, "{jitter:?} retry {retry}: {d:?} > {base:?}");
                if jitter == JitterPolicy::Equal {
                    assert!(d >= base / 2, "{jitter:?} retry {retry}: {d:?} < half");
                }
            }
        }
    }

    #[test]
    fn decorrelated_stays_between_floor_and_max() {
        let p = exp(JitterPolicy::Decorrelated);
        for _ in 0..100 {
            let d = p.delay_for(6);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_secs(10));
        }
    }
}
