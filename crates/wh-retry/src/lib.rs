// SPDX-License-Identifier: MIT OR Apache-2.0
//! wh-retry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Exponential backoff with jitter for webhook delivery retries.
//!
//! `base = min(initial_delay * 2^retry_count, max_delay)`, computed
//! overflow-safely (`retry_count >= 62` clamps to `max_delay` directly
//! rather than computing `2^62`), then widened by uniform multiplicative
//! jitter in `[-20%, +20%)` and floored at 1ms.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// The multiplicative jitter factor applied to the base delay: the final
/// delay lands in `[base * (1 - JITTER_FACTOR), base * (1 + JITTER_FACTOR))`.
const JITTER_FACTOR: f64 = 0.20;

/// The retry-count threshold above which `2^retry_count` is not computed at
/// all — the base delay is clamped to `max_delay` directly.
const OVERFLOW_CLAMP_THRESHOLD: u32 = 62;

/// Errors raised constructing a [`RetryPolicy`] or calling
/// [`RetryPolicy::try_calculate_delay`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    /// `initial_delay` or `max_delay` was zero, or `max_delay < initial_delay`.
    #[error("invalid retry policy: initial_delay and max_delay must be positive and max_delay >= initial_delay")]
    InvalidConfig,
    /// A negative retry count was supplied to the signed entry point.
    #[error("retry count must not be negative")]
    InvalidArgument,
}

/// Source of uniform randomness in `[-1.0, 1.0)`, injectable so tests can
/// assert the jitter bound precisely.
pub trait JitterSource {
    /// Draw one sample in `[-1.0, 1.0)`.
    fn unit(&mut self) -> f64;
}

/// Default jitter source: mixes monotonic-clock nanoseconds with the retry
/// count so concurrent retries of different notifications decorrelate,
/// without pulling in a dedicated RNG crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemJitter;

impl JitterSource for SystemJitter {
    fn unit(&mut self) -> f64 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        // Map [0, 1_000_000_000) -> [-1.0, 1.0).
        (nanos as f64 / 1_000_000_000.0) * 2.0 - 1.0
    }
}

/// A fixed-value jitter source for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn unit(&mut self) -> f64 {
        self.0
    }
}

/// Backoff configuration: the caller-facing knobs from §6
/// (`initialRetryDelay`, `maxRetryDelay`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Construct a policy. Both durations must be positive and
    /// `max_delay >= initial_delay`.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Result<Self, RetryError> {
        if initial_delay.is_zero() || max_delay.is_zero() || max_delay < initial_delay {
            return Err(RetryError::InvalidConfig);
        }
        Ok(Self {
            initial_delay,
            max_delay,
        })
    }

    /// `initial_delay` as configured.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// `max_delay` as configured.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// `base(k) = min(initial_delay * 2^k, max_delay)`, overflow-safe.
    pub fn base_delay(&self, retry_count: u32) -> Duration {
        if retry_count >= OVERFLOW_CLAMP_THRESHOLD {
            return self.max_delay;
        }
        let exp: u128 = 1u128 << retry_count;
        let candidate_nanos = self.initial_delay.as_nanos().saturating_mul(exp);
        let max_nanos = self.max_delay.as_nanos();
        let capped = candidate_nanos.min(max_nanos);
        let capped_u64 = u64::try_from(capped).unwrap_or(u64::MAX);
        Duration::from_nanos(capped_u64)
    }

    /// Compute the next-attempt delay for a non-negative retry count,
    /// jittered in `[0.8 * base, 1.2 * base)` and floored at 1ms.
    ///
    /// This is the hot path used by the worker, which always holds a
    /// `u32` retry count; it cannot be called with a negative count because
    /// the type makes that unrepresentable.
    pub fn calculate_delay(&self, retry_count: u32, jitter: &mut dyn JitterSource) -> Duration {
        let base = self.base_delay(retry_count);
        let base_ms = base.as_millis() as f64;
        let u = jitter.unit().clamp(-1.0, 1.0);
        let jittered_ms = base_ms + base_ms * JITTER_FACTOR * u;
        let floored_ms = jittered_ms.max(1.0);
        Duration::from_millis(floored_ms.round() as u64)
    }

    /// Signed entry point matching the literal `calculateDelay(k >= 0)`
    /// contract (negative `k` fails with `InvalidArgument`). Intended for
    /// direct contract tests; production callers should prefer
    /// [`Self::calculate_delay`].
    pub fn try_calculate_delay(
        &self,
        retry_count: i64,
        jitter: &mut dyn JitterSource,
    ) -> Result<Duration, RetryError> {
        if retry_count < 0 {
            return Err(RetryError::InvalidArgument);
        }
        let k = u32::try_from(retry_count).unwrap_or(u32::MAX);
        Ok(self.calculate_delay(k, jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1000), Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn rejects_zero_initial_delay() {
        assert_eq!(
            RetryPolicy::new(Duration::ZERO, Duration::from_secs(1)).unwrap_err(),
            RetryError::InvalidConfig
        );
    }

    #[test]
    fn rejects_max_less_than_initial() {
        assert_eq!(
            RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(1)).unwrap_err(),
            RetryError::InvalidConfig
        );
    }

    #[test]
    fn accepts_equal_initial_and_max() {
        assert!(RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn base_delay_doubles_each_retry() {
        let p = policy();
        assert_eq!(p.base_delay(0), Duration::from_millis(1000));
        assert_eq!(p.base_delay(1), Duration::from_millis(2000));
        assert_eq!(p.base_delay(2), Duration::from_millis(4000));
    }

    #[test]
    fn base_delay_caps_at_max() {
        let p = policy();
        // 1000ms * 2^12 = 4_096_000ms, far above the 3_600_000ms max.
        assert_eq!(p.base_delay(12), Duration::from_secs(3600));
    }

    #[test]
    fn base_delay_clamps_unconditionally_above_threshold() {
        let p = policy();
        assert_eq!(p.base_delay(62), Duration::from_secs(3600));
        assert_eq!(p.base_delay(1000), Duration::from_secs(3600));
    }

    #[test]
    fn base_delay_does_not_overflow_just_below_threshold() {
        // Must not panic: retry_count=61 computes 2^61, which is fine in a
        // u128 accumulator even though it would overflow u64 or f64 neatly.
        let p = policy();
        assert_eq!(p.base_delay(61), Duration::from_secs(3600));
    }

    #[test]
    fn jitter_zero_returns_exact_base() {
        let p = policy();
        let mut jitter = FixedJitter(0.0);
        let delay = p.calculate_delay(0, &mut jitter);
        assert_eq!(delay, Duration::from_millis(1000));
    }

    #[test]
    fn jitter_positive_one_returns_upper_bound() {
        let p = policy();
        let mut jitter = FixedJitter(1.0);
        let delay = p.calculate_delay(0, &mut jitter);
        assert_eq!(delay, Duration::from_millis(1200));
    }

    #[test]
    fn jitter_negative_one_returns_lower_bound() {
        let p = policy();
        let mut jitter = FixedJitter(-1.0);
        let delay = p.calculate_delay(0, &mut jitter);
        assert_eq!(delay, Duration::from_millis(800));
    }

    #[test]
    fn delay_is_never_below_one_millisecond() {
        let p = RetryPolicy::new(Duration::from_nanos(1), Duration::from_millis(1)).unwrap();
        let mut jitter = FixedJitter(-1.0);
        let delay = p.calculate_delay(0, &mut jitter);
        assert!(delay >= Duration::from_millis(1));
    }

    #[test]
    fn negative_retry_count_is_invalid_argument() {
        let p = policy();
        let mut jitter = FixedJitter(0.0);
        assert_eq!(
            p.try_calculate_delay(-1, &mut jitter).unwrap_err(),
            RetryError::InvalidArgument
        );
    }

    #[test]
    fn non_negative_retry_count_matches_unsigned_path() {
        let p = policy();
        let mut jitter = FixedJitter(0.0);
        let signed = p.try_calculate_delay(3, &mut jitter).unwrap();
        let unsigned = p.calculate_delay(3, &mut FixedJitter(0.0));
        assert_eq!(signed, unsigned);
    }

    #[test]
    fn system_jitter_draws_are_within_bounds() {
        let mut jitter = SystemJitter;
        for _ in 0..100 {
            let u = jitter.unit();
            assert!((-1.0..1.0).contains(&u));
        }
    }

    proptest::proptest! {
        #[test]
        fn delay_always_within_jitter_bound(
            retry_count in 0u32..200,
            jitter_draw in -1.0f64..1.0,
        ) {
            let p = RetryPolicy::new(Duration::from_millis(10), Duration::from_secs(60)).unwrap();
            let base = p.base_delay(retry_count);
            let base_ms = base.as_millis() as f64;
            let delay = p.calculate_delay(retry_count, &mut FixedJitter(jitter_draw));
            let lower = (base_ms * 0.8).max(1.0) - 1.0;
            let upper = base_ms * 1.2 + 1.0;
            let delay_ms = delay.as_millis() as f64;
            prop_assert!(delay_ms >= lower);
            prop_assert!(delay_ms <= upper);
        }

        #[test]
        fn base_delay_never_panics_for_any_retry_count(retry_count in 0u32..10_000) {
            let p = RetryPolicy::new(Duration::from_millis(1), Duration::from_secs(3600)).unwrap();
            let _ = p.base_delay(retry_count);
        }
    }
}
