//! Structured events emitted by the requester.
//!
//! Sinks are plain `tower::Service<RestEvent>` values, so they compose with
//! standard tower combinators. The requester stores one boxed [`EventSink`] and
//! emits through [`emit_best_effort`]: a sink that is not ready or fails simply
//! drops the event.
//!
//! ```rust
//! use tollgate::telemetry::{DeferReason, MemorySink, RestEvent};
//! use tower::Service;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut sink = MemorySink::with_capacity(2);
//! let event = RestEvent::Deferred {
//!     bucket: "/gateway".into(),
//!     delay: Duration::from_millis(500),
//!     reason: DeferReason::Bucket,
//! };
//! sink.call(event.clone()).await.unwrap();
//! assert_eq!(sink.events(), vec![event]);
//! # }
//! ```

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use http::StatusCode;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

use crate::error::BoxError;

/// Type-erased sink held by the requester.
pub type EventSink = BoxCloneSyncService<RestEvent, (), BoxError>;

/// Box any cloneable sink into an [`EventSink`].
pub fn boxed<S>(sink: S) -> EventSink
where
    S: Service<RestEvent, Response = ()> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(sink.map_err(|err: S::Error| -> BoxError { err.into() }))
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: RestEvent)
where
    S: Service<RestEvent, Response = ()>,
{
    if let Ok(mut ready) = sink.ready_oneshot().await {
        let _ = ready.call(event).await;
    }
}

/// Why a request was held back instead of dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The account-wide bucket is exhausted.
    Global,
    /// The request's own bucket is exhausted.
    Bucket,
    /// The retry policy asked for a pause after a transport failure.
    Backoff,
}

/// Something the requester did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestEvent {
    /// A request left for the transport.
    Dispatched {
        bucket: String,
        /// `METHOD path`
        route: String,
        /// 1-indexed exchange number for this request.
        attempt: usize,
    },
    /// The server answered and the caller was given the outcome.
    Completed { bucket: String, status: StatusCode },
    /// The request was parked and will be resubmitted after `delay`.
    Deferred { bucket: String, delay: Duration, reason: DeferReason },
    /// The server reported the account-wide limit.
    GlobalLimited { retry_after: Duration },
    /// The exchange produced no response.
    TransportFailed { bucket: String, attempt: usize, error: String },
    /// The retry policy gave up.
    Exhausted { bucket: String, attempts: usize },
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::Global => write!(f, "global"),
            DeferReason::Bucket => write!(f, "bucket"),
            DeferReason::Backoff => write!(f, "backoff"),
        }
    }
}

impl fmt::Display for RestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestEvent::Dispatched { bucket, route, attempt } => {
                write!(f, "Dispatched({route}, bucket={bucket}, attempt=#{attempt})")
            }
            RestEvent::Completed { bucket, status } => {
                write!(f, "Completed(bucket={bucket}, status={})", status.as_u16())
            }
            RestEvent::Deferred { bucket, delay, reason } => {
                write!(f, "Deferred(bucket={bucket}, delay={delay:?}, reason={reason})")
            }
            RestEvent::GlobalLimited { retry_after } => {
                write!(f, "GlobalLimited(retry_after={retry_after:?})")
            }
            RestEvent::TransportFailed { bucket, attempt, error } => {
                write!(f, "TransportFailed(bucket={bucket}, attempt=#{attempt}, error={error})")
            }
            RestEvent::Exhausted { bucket, attempts } => {
                write!(f, "Exhausted(bucket={bucket}, attempts={attempts})")
            }
        }
    }
}

type Ready = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

/// Discards every event.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<RestEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: RestEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

/// Logs each event at INFO through `tracing`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<RestEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RestEvent) -> Self::Future {
        tracing::info!(target: "tollgate::telemetry", event = %event, "rest_event");
        Box::pin(async { Ok(()) })
    }
}

/// Keeps the most recent events in memory. Oldest events are evicted once
/// `capacity` is reached.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<RestEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Bounded at 10,000 events.
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, VecDeque<RestEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<RestEvent> {
        self.guard().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<RestEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RestEvent) -> Self::Future {
        let mut guard = self.guard();
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(event);
        Box::pin(async { Ok(()) })
    }
}
