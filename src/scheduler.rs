//! Deferred callbacks on the Tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use crate::sleeper::Sleeper;

/// Runs callbacks once, no earlier than a given delay.
///
/// There is no cancellation. Callbacks that find nothing left to do return
/// without effect.
#[derive(Debug, Clone)]
pub struct Scheduler {
    sleeper: Arc<dyn Sleeper>,
}

impl Scheduler {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Spawn a task that waits `delay` and then runs `f`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn after<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sleep = self.sleeper.sleep(delay);
        tokio::spawn(async move {
            sleep.await;
            f();
        });
    }
}
