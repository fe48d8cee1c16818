//! Retry policy for transport-level failures.
//!
//! Semantics:
//! - `max_attempts` counts total exchanges for one request (initial try + retries).
//!   `None` retries forever.
//! - Only exchanges that produced no response count. Rate-limit deferrals and
//!   global-limit requeues never consume an attempt.
//! - After the `n`th failure the request waits `jitter(backoff.delay(n))`. A zero
//!   wait requeues it at the head of its bucket and redispatches immediately.
//!
//! ```rust
//! use std::time::Duration;
//! use tollgate::{Backoff, Jitter, RetryPolicy};
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(4)
//!     .backoff(Backoff::exponential(Duration::from_millis(100)))
//!     .with_jitter(Jitter::None)
//!     .build()
//!     .unwrap();
//! assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
//! assert_eq!(policy.next_delay(3), Some(Duration::from_millis(400)));
//! assert_eq!(policy.next_delay(4), None);
//! ```

use crate::error::BuildError;
use crate::{Backoff, Jitter};

/// Default total attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Bounds and pacing for retrying requests that never got a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<usize>,
    backoff: Backoff,
    jitter: Jitter,
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Retry forever with no delay.
    pub fn unbounded() -> Self {
        Self { max_attempts: None, backoff: Backoff::none(), jitter: Jitter::None }
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// How long to wait after the `failures`th failed exchange, or `None` once the
    /// request has used up its attempts.
    pub fn next_delay(&self, failures: usize) -> Option<std::time::Duration> {
        if self.max_attempts.is_some_and(|max| failures >= max) {
            return None;
        }
        Some(self.jitter.apply(self.backoff.delay(failures)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            backoff: Backoff::none(),
            jitter: Jitter::None,
        }
    }
}

/// Builder for `RetryPolicy`.
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<usize>,
    backoff: Backoff,
    jitter: Jitter,
}

impl RetryPolicyBuilder {
    /// Create a builder with the default policy's values.
    pub fn new() -> Self {
        let RetryPolicy { max_attempts, backoff, jitter } = RetryPolicy::default();
        Self { max_attempts, backoff, jitter }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Never give up.
    pub fn unbounded(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == Some(0) {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy { max_attempts: self.max_attempts, backoff: self.backoff, jitter: self.jitter })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
