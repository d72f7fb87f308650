//! # Jitter for requeue delays.
//!
//! Spreads requeues of many tasks that failed together (for example when one
//! worker host dies) so they do not hit the queue in lockstep.

use std::time::Duration;

use rand::Rng;

/// Randomization applied to a computed requeue delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
    /// Uniform in `[floor, min(delay × 3, max)]`.
    Decorrelated,
}

impl JitterPolicy {
    /// Applies the policy to `delay`. `floor` and `max` bound decorrelated jitter.
    pub fn spread(self, delay: Duration, floor: Duration, max: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full if ms == 0 => Duration::ZERO,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=half))
            }
            JitterPolicy::Decorrelated => {
                let lo = floor.as_millis() as u64;
                let hi = ms.saturating_mul(3).min(max.as_millis() as u64).max(lo);
                Duration::from_millis(rng.random_range(lo..=hi))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(1234);
        assert_eq!(JitterPolicy::None.spread(d, Duration::ZERO, d), d);
    }

    #[test]
    fn zero_delay_stays_zero() {
        for p in [JitterPolicy::Full, JitterPolicy::Equal] {
            assert_eq!(p.spread(Duration::ZERO, Duration::ZERO, Duration::ZERO), Duration::ZERO);
        }
    }
}
