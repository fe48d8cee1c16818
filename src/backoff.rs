//! Backoff between transport-level retries.
//!
//! `delay(n)` is the wait before the retry that follows the `n`th failed
//! exchange, so `delay(0)` is always zero. Rate-limit deferrals never go through
//! here; those waits come from server headers.
//!
//! ```rust
//! use std::time::Duration;
//! use tollgate::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(250))
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(1), Duration::from_millis(250));
//! assert_eq!(backoff.delay(3), Duration::from_secs(1));
//! assert_eq!(backoff.delay(9), Duration::from_secs(2));
//! ```

use std::time::Duration;

/// Ceiling applied when a computation would overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("with_max is only valid for linear or exponential backoff")]
    ConstantDoesNotSupportMax,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Constant,
    Linear,
    Exponential,
}

/// Delay schedule for retrying failed exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    shape: Shape,
    base: Duration,
    max: Option<Duration>,
}

impl Backoff {
    /// Retry immediately.
    pub fn none() -> Self {
        Self::constant(Duration::ZERO)
    }

    pub fn constant(delay: Duration) -> Self {
        Self { shape: Shape::Constant, base: delay, max: None }
    }

    /// `base * n` for the `n`th failure.
    pub fn linear(base: Duration) -> Self {
        Self { shape: Shape::Linear, base, max: None }
    }

    /// `base * 2^(n-1)` for the `n`th failure.
    pub fn exponential(base: Duration) -> Self {
        Self { shape: Shape::Exponential, base, max: None }
    }

    /// Cap a linear or exponential schedule.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        if self.shape == Shape::Constant {
            return Err(BackoffError::ConstantDoesNotSupportMax);
        }
        if max < self.base {
            return Err(BackoffError::MaxLessThanBase { base: self.base, max });
        }
        self.max = Some(max);
        Ok(self)
    }

    /// Delay before the retry following the `failures`th failed exchange.
    pub fn delay(&self, failures: usize) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let n = u32::try_from(failures).unwrap_or(u32::MAX);
        let raw = match self.shape {
            Shape::Constant => self.base,
            Shape::Linear => self.base.checked_mul(n).unwrap_or(MAX_BACKOFF),
            Shape::Exponential => {
                let factor = 2u128.saturating_pow(n - 1);
                let nanos = self.base.as_nanos().saturating_mul(factor);
                Duration::from_nanos(u64::try_from(nanos.min(MAX_BACKOFF.as_nanos())).unwrap_or(u64::MAX))
            }
        };
        self.max.map_or(raw, |max| raw.min(max)).min(MAX_BACKOFF)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_always_zero() {
        let backoff = Backoff::none();
        assert_eq!(backoff.delay(1), Duration::ZERO);
        assert_eq!(backoff.delay(40), Duration::ZERO);
    }

    #[test]
    fn zeroth_failure_never_waits() {
        for backoff in [
            Backoff::constant(Duration::from_secs(1)),
            Backoff::linear(Duration::from_secs(1)),
            Backoff::exponential(Duration::from_secs(1)),
        ] {
            assert_eq!(backoff.delay(0), Duration::ZERO);
        }
    }

    #[test]
    fn linear_grows_with_failures_and_caps() {
        let backoff =
            Backoff::linear(Duration::from_millis(100)).with_max(Duration::from_millis(250)).unwrap();
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(250));
    }

    #[test]
    fn exponential_doubles() {
        let backoff = Backoff::exponential(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn huge_failure_counts_saturate() {
        assert_eq!(Backoff::exponential(Duration::from_secs(1)).delay(1_000_000), MAX_BACKOFF);
        assert_eq!(Backoff::linear(Duration::from_secs(u64::MAX / 2)).delay(1_000), MAX_BACKOFF);
    }

    #[test]
    fn with_max_validation() {
        assert_eq!(
            Backoff::constant(Duration::from_secs(1)).with_max(Duration::from_secs(2)),
            Err(BackoffError::ConstantDoesNotSupportMax)
        );
        assert_eq!(
            Backoff::linear(Duration::from_secs(1)).with_max(Duration::ZERO),
            Err(BackoffError::MaxMustBePositive)
        );
        assert!(matches!(
            Backoff::exponential(Duration::from_secs(5)).with_max(Duration::from_secs(1)),
            Err(BackoffError::MaxLessThanBase { .. })
        ));
    }
}
