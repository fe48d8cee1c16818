//! Clock abstractions used for rate-limit windows.
//!
//! Servers report bucket resets as Unix timestamps, so the clock speaks epoch
//! milliseconds rather than a process-relative monotonic offset.

use std::time::{SystemTime, UNIX_EPOCH};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The system wall clock, read on every call.
///
/// Reset times come from the server as Unix timestamps, so this follows
/// wall-clock steps and suspends rather than a monotonic source. Tests that
/// pause Tokio time should inject their own [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn system_clock_ignores_paused_tokio_time() {
        let clock = SystemClock::new();
        let before = clock.now_millis();
        tokio::time::advance(Duration::from_secs(3_600)).await;
        assert!(clock.now_millis() - before < 1_000);
    }

    #[tokio::test]
    async fn system_clock_is_near_wall_time() {
        let clock = SystemClock::new();
        let wall = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64;
        assert!(clock.now_millis().abs_diff(wall) < 1_000);
    }
}
