//! Per-key rate-limit state plus its FIFO queue.
//!
//! A bucket moves through three phases:
//!
//! ```text
//! Idle ──begin──▶ Dispatching ──release/requeue──▶ Idle
//!                      │
//!                     park
//!                      ▼
//!                   Waiting ──wake (scheduler only)──▶ Idle
//! ```
//!
//! Only `Idle` buckets hand out work, which is what keeps at most one exchange
//! per bucket on the wire.

use crate::request::OutboundRequest;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Reserved key for the account-wide bucket.
pub const GLOBAL_KEY: &str = "GLOBAL";

/// Where a bucket is in its dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in flight; the next queued request may be dispatched.
    Idle,
    /// One request is being admitted or exchanged.
    Dispatching,
    /// Rate limited or backing off; a scheduled wake-up will resume it.
    Waiting,
}

/// Outcome of the pre-dispatch check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Proceed,
    /// Window exhausted; resets after this long.
    Wait(Duration),
}

/// Point-in-time view of a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub key: String,
    pub limit: u64,
    pub remaining: u64,
    /// Unix milliseconds when the window resets, if known.
    pub reset_at: Option<u64>,
    pub queued: usize,
    pub phase: Phase,
}

impl BucketSnapshot {
    /// Whether a dispatch against this bucket would be held at `now`.
    pub fn is_exhausted_at(&self, now: u64) -> bool {
        self.remaining == 0 && self.reset_at.is_some_and(|at| at > now)
    }
}

/// One rate-limit bucket. Obtained from a [`BucketRegistry`](crate::BucketRegistry).
#[derive(Debug)]
pub struct Bucket {
    key: String,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    limit: u64,
    remaining: u64,
    reset_at: Option<u64>,
    queue: VecDeque<OutboundRequest>,
    phase: Phase,
}

impl BucketState {
    fn reset(&mut self) {
        self.remaining = self.limit;
        self.reset_at = None;
    }
}

impl Bucket {
    /// A fresh bucket is optimistic: full window, no reset pending.
    pub(crate) fn new(key: impl Into<String>, limit: u64) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(BucketState {
                limit,
                remaining: limit,
                reset_at: None,
                queue: VecDeque::new(),
                phase: Phase::Idle,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    // Every transition leaves the state consistent, so a poisoned lock is safe to reuse.
    fn state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn enqueue(&self, request: OutboundRequest) {
        let mut state = self.state();
        state.queue.push_back(request);
        debug!(target: "tollgate::bucket", bucket = %self.key, queued = state.queue.len(), "enqueued");
    }

    /// Take the next live request if the bucket is idle, marking it dispatching.
    pub(crate) fn begin(&self) -> Option<OutboundRequest> {
        let mut state = self.state();
        if state.phase != Phase::Idle {
            return None;
        }
        while let Some(request) = state.queue.pop_front() {
            if request.is_abandoned() {
                debug!(target: "tollgate::bucket", bucket = %self.key, path = %request.route.path(), "skipping abandoned request");
                continue;
            }
            state.phase = Phase::Dispatching;
            return Some(request);
        }
        None
    }

    /// The in-flight request finished; let the next one through.
    pub(crate) fn release(&self) {
        self.state().phase = Phase::Idle;
    }

    /// Put a request back at the head and go idle so it can be retried at once.
    pub(crate) fn requeue(&self, request: OutboundRequest) {
        let mut state = self.state();
        state.queue.push_front(request);
        state.phase = Phase::Idle;
    }

    /// Put a request back at the head and hold the bucket until [`Bucket::wake`].
    pub(crate) fn park(&self, request: OutboundRequest) {
        let mut state = self.state();
        state.queue.push_front(request);
        state.phase = Phase::Waiting;
    }

    pub(crate) fn wake(&self) {
        let mut state = self.state();
        if state.phase == Phase::Waiting {
            state.phase = Phase::Idle;
        }
    }

    /// Pre-dispatch check. A window whose reset time has passed is refilled here.
    pub(crate) fn admit(&self, now: u64) -> Admission {
        let mut state = self.state();
        if state.remaining > 0 {
            return Admission::Proceed;
        }
        match state.reset_at {
            Some(at) if at > now => Admission::Wait(Duration::from_millis(at - now)),
            _ => {
                state.reset();
                debug!(target: "tollgate::bucket", bucket = %self.key, remaining = state.remaining, "window reset");
                Admission::Proceed
            }
        }
    }

    /// Apply limits reported by the server.
    pub(crate) fn update(&self, limit: u64, remaining: u64, reset_at: u64) {
        let mut state = self.state();
        state.limit = limit;
        state.remaining = remaining.min(limit);
        state.reset_at = Some(reset_at);
    }

    /// The server rejected a request on this bucket; hold it until `reset_at` at least.
    pub(crate) fn exhaust(&self, reset_at: u64) {
        let mut state = self.state();
        state.remaining = 0;
        state.reset_at = Some(state.reset_at.map_or(reset_at, |at| at.max(reset_at)));
    }

    /// Close the bucket to a single request per window until `reset_at`.
    pub(crate) fn lock_until(&self, reset_at: u64) {
        let mut state = self.state();
        state.limit = 1;
        state.remaining = 0;
        state.reset_at = Some(reset_at);
    }

    pub fn snapshot(&self) -> BucketSnapshot {
        let state = self.state();
        BucketSnapshot {
            key: self.key.clone(),
            limit: state.limit,
            remaining: state.remaining,
            reset_at: state.reset_at,
            queued: state.queue.len(),
            phase: state.phase,
        }
    }
}
