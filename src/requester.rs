//! The requester: queues calls per bucket and dispatches them within limits.
//!
//! Each bucket drains on its own task, one exchange at a time. Before every
//! exchange the global bucket and then the request's own bucket are checked;
//! an exhausted window parks the request at the head of its queue and the
//! [`Scheduler`] wakes the bucket once the window resets. Response headers
//! feed back into the bucket (or the global bucket) after each exchange.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::bucket::{Admission, Bucket, BucketSnapshot, GLOBAL_KEY};
use crate::clock::Clock;
use crate::config::{self, DynamicConfig, RequesterBuilder};
use crate::error::{RestError, TransportError};
use crate::headers::{self, RatelimitHeaders, RetryAfterUnit};
use crate::registry::BucketRegistry;
use crate::request::{OutboundRequest, Response, ResponseHandle};
use crate::retry::RetryPolicy;
use crate::route::Route;
use crate::scheduler::Scheduler;
use crate::telemetry::{emit_best_effort, DeferReason, EventSink, RestEvent};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Rate-limited REST client front end. Cheap to clone; clones share buckets.
#[derive(Clone)]
pub struct Requester {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: BucketRegistry,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) scheduler: Scheduler,
    pub(crate) retry: RetryPolicy,
    pub(crate) authorization: DynamicConfig<HeaderValue>,
    pub(crate) user_agent: HeaderValue,
    pub(crate) api_base: String,
    pub(crate) safety_margin: Duration,
    pub(crate) retry_after_unit: RetryAfterUnit,
    pub(crate) sink: EventSink,
}

/// What the bucket's driver should do after one dispatch.
enum Flow {
    /// The bucket is idle again; pull the next request.
    Continue,
    /// The bucket is waiting on the scheduler.
    Parked,
}

impl Requester {
    pub fn builder() -> RequesterBuilder {
        RequesterBuilder::new()
    }

    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// Queue a call and return a handle to its outcome.
    ///
    /// Never waits on the network or on a rate limit. Fails immediately if the
    /// route cannot be compiled from `params` or if there is no Tokio runtime
    /// to run the dispatch on.
    pub fn submit<I, K, V>(
        &self,
        route: &Route,
        params: I,
        body: Option<Value>,
    ) -> Result<ResponseHandle, RestError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if Handle::try_current().is_err() {
            return Err(RestError::RuntimeUnavailable);
        }
        let compiled = route.compile(params)?;
        let bucket = self.inner.registry.get_or_create(compiled.bucket())?;
        let (request, handle) = OutboundRequest::new(compiled, body);
        bucket.enqueue(request);
        self.inner.try_submit(bucket);
        Ok(handle)
    }

    /// Submit and wait for the outcome.
    pub async fn request<I, K, V>(
        &self,
        route: &Route,
        params: I,
        body: Option<Value>,
    ) -> Result<Response, RestError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.submit(route, params, body)?.await
    }

    /// Replace the token used for requests dispatched from now on.
    pub fn set_token(&self, token: &str) -> Result<(), RestError> {
        let value = config::authorization(token)?;
        self.inner.authorization.set(value);
        info!(target: "tollgate::requester", "token rotated");
        Ok(())
    }

    pub fn bucket(&self, key: &str) -> Option<BucketSnapshot> {
        self.inner.registry.get(key).map(|bucket| bucket.snapshot())
    }

    /// Every bucket, the global one included, sorted by key.
    pub fn buckets(&self) -> Vec<BucketSnapshot> {
        self.inner.registry.snapshot()
    }

    pub fn global(&self) -> BucketSnapshot {
        self.inner.registry.global().snapshot()
    }

    /// Whether the account-wide limit is currently holding back dispatches.
    pub fn globally_locked(&self) -> bool {
        self.global().is_exhausted_at(self.inner.clock.now_millis())
    }
}

impl fmt::Debug for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requester")
            .field("api_base", &self.inner.api_base)
            .field("buckets", &self.inner.registry.len())
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Start draining `bucket` if it is idle and has work.
    fn try_submit(self: &Arc<Self>, bucket: Arc<Bucket>) {
        if let Some(request) = bucket.begin() {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.drive(bucket, request).await });
        }
    }

    async fn drive(self: Arc<Self>, bucket: Arc<Bucket>, mut request: OutboundRequest) {
        let mut guard = DrainGuard { inner: Arc::clone(&self), bucket: Arc::clone(&bucket), armed: true };
        loop {
            if let Flow::Parked = self.dispatch(&bucket, request).await {
                break;
            }
            match bucket.begin() {
                Some(next) => request = next,
                None => break,
            }
        }
        guard.armed = false;
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    fn margin_ms(&self) -> u64 {
        duration_ms(self.safety_margin)
    }

    async fn emit(&self, event: RestEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }

    async fn dispatch(self: &Arc<Self>, bucket: &Arc<Bucket>, mut request: OutboundRequest) -> Flow {
        let now = self.now();
        if let Admission::Wait(wait) = self.registry.global().admit(now) {
            self.defer(bucket, request, wait + self.safety_margin, DeferReason::Global).await;
            return Flow::Parked;
        }
        if let Admission::Wait(wait) = bucket.admit(now) {
            self.defer(bucket, request, wait + self.safety_margin, DeferReason::Bucket).await;
            return Flow::Parked;
        }

        let http_request = match self.build_request(&request) {
            Ok(http_request) => http_request,
            Err(err) => {
                request.complete(Err(err));
                bucket.release();
                return Flow::Continue;
            }
        };

        let attempt = request.failures + 1;
        debug!(target: "tollgate::requester", bucket = %bucket.key(), route = %request.route, attempt, "dispatching");
        self.emit(RestEvent::Dispatched {
            bucket: bucket.key().to_string(),
            route: request.route.to_string(),
            attempt,
        })
        .await;

        match self.transport.send(http_request).await {
            Ok(response) => self.on_response(bucket, request, response).await,
            Err(err) => {
                request.failures = attempt;
                self.on_transport_failure(bucket, request, err).await
            }
        }
    }

    fn build_request(&self, request: &OutboundRequest) -> Result<HttpRequest, RestError> {
        let method = request.route.method().clone();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, (*self.authorization.get()).clone());
        headers.insert(USER_AGENT, self.user_agent.clone());

        let body = match &request.body {
            Some(body) if method != Method::GET => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Some(serde_json::to_vec(body)?)
            }
            _ => None,
        };

        Ok(HttpRequest {
            method,
            url: format!("{}{}", self.api_base, request.route.path()),
            headers,
            body,
        })
    }

    /// Park `request` on `bucket` and wake the bucket after `delay`.
    async fn defer(
        self: &Arc<Self>,
        bucket: &Arc<Bucket>,
        request: OutboundRequest,
        delay: Duration,
        reason: DeferReason,
    ) {
        debug!(
            target: "tollgate::requester",
            bucket = %bucket.key(),
            delay_ms = duration_ms(delay),
            %reason,
            "deferring"
        );
        bucket.park(request);
        self.emit(RestEvent::Deferred { bucket: bucket.key().to_string(), delay, reason }).await;

        let inner = Arc::clone(self);
        let bucket = Arc::clone(bucket);
        self.scheduler.after(delay, move || {
            bucket.wake();
            inner.try_submit(bucket);
        });
    }

    async fn on_transport_failure(
        self: &Arc<Self>,
        bucket: &Arc<Bucket>,
        request: OutboundRequest,
        err: TransportError,
    ) -> Flow {
        let attempts = request.failures;
        warn!(target: "tollgate::requester", bucket = %bucket.key(), attempt = attempts, error = %err, "transport failure");
        self.emit(RestEvent::TransportFailed {
            bucket: bucket.key().to_string(),
            attempt: attempts,
            error: err.to_string(),
        })
        .await;

        match self.retry.next_delay(attempts) {
            None => {
                error!(target: "tollgate::requester", bucket = %bucket.key(), attempts, "retries exhausted");
                self.emit(RestEvent::Exhausted { bucket: bucket.key().to_string(), attempts }).await;
                request.complete(Err(RestError::RetryExhausted { attempts, source: err }));
                bucket.release();
                Flow::Continue
            }
            Some(delay) if delay.is_zero() => {
                bucket.requeue(request);
                Flow::Continue
            }
            Some(delay) => {
                self.defer(bucket, request, delay, DeferReason::Backoff).await;
                Flow::Parked
            }
        }
    }

    async fn on_response(
        self: &Arc<Self>,
        bucket: &Arc<Bucket>,
        request: OutboundRequest,
        response: HttpResponse,
    ) -> Flow {
        let now = self.now();
        let limits = match RatelimitHeaders::parse(&response.headers, self.retry_after_unit) {
            Ok(limits) => limits,
            Err(err) => {
                warn!(target: "tollgate::requester", bucket = %bucket.key(), error = %err, "ignoring malformed rate-limit headers");
                RatelimitHeaders::None
            }
        };

        if let RatelimitHeaders::Global { retry_after } = limits {
            let reset_at = now.saturating_add(duration_ms(retry_after)).saturating_add(self.margin_ms());
            self.registry.global().lock_until(reset_at);
            info!(
                target: "tollgate::requester",
                bucket = GLOBAL_KEY,
                retry_after_ms = duration_ms(retry_after),
                reset_at,
                "global rate limit hit"
            );
            self.emit(RestEvent::GlobalLimited { retry_after }).await;
            bucket.requeue(request);
            return Flow::Continue;
        }

        if let RatelimitHeaders::Present { limit, remaining, reset_at, .. } = limits {
            bucket.update(limit, remaining, reset_at);
        }

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let hold_until = self.hold_until(now, &limits, &response.headers);
            warn!(
                target: "tollgate::requester",
                bucket = %bucket.key(),
                wait_ms = hold_until.saturating_sub(now),
                "rate limited by server"
            );
            bucket.exhaust(hold_until);
            bucket.requeue(request);
            return Flow::Continue;
        }

        let status = response.status;
        let outcome = if status.is_success() {
            parse_body(&response.body).map(|body| Response { status, headers: response.headers, body })
        } else {
            Err(RestError::Status { status, body: lenient_body(&response.body) })
        };
        debug!(target: "tollgate::requester", bucket = %bucket.key(), status = status.as_u16(), "completed");
        self.emit(RestEvent::Completed { bucket: bucket.key().to_string(), status }).await;
        request.complete(outcome);
        bucket.release();
        Flow::Continue
    }

    /// When a bucket rejected by the server may be tried again: the later of
    /// its reset and `Retry-After`, and never earlier than one margin from now.
    fn hold_until(&self, now: u64, limits: &RatelimitHeaders, headers: &HeaderMap) -> u64 {
        let (reset_at, retry_after) = match limits {
            RatelimitHeaders::Present { reset_at, retry_after, .. } => (Some(*reset_at), *retry_after),
            _ => (None, headers::retry_after(headers, self.retry_after_unit).unwrap_or(None)),
        };
        let retry_at = retry_after.map(|d| now.saturating_add(duration_ms(d)));
        match reset_at.max(retry_at) {
            Some(at) if at > now => at,
            _ => now.saturating_add(self.margin_ms()),
        }
    }
}

/// Hands a bucket back if its drain task unwinds mid-dispatch. The request in
/// flight is lost (its caller sees [`RestError::Dropped`]); the rest of the
/// queue keeps draining.
struct DrainGuard {
    inner: Arc<Inner>,
    bucket: Arc<Bucket>,
    armed: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!(target: "tollgate::requester", bucket = %self.bucket.key(), "dispatch task ended mid-exchange; releasing bucket");
        self.bucket.release();
        if Handle::try_current().is_ok() {
            self.inner.try_submit(Arc::clone(&self.bucket));
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

fn parse_body(body: &[u8]) -> Result<Value, RestError> {
    if is_blank(body) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Error bodies are passed through even when they are not JSON.
fn lenient_body(body: &[u8]) -> Value {
    if is_blank(body) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
