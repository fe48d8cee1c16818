//! Requester configuration.
//!
//! [`RequesterBuilder`] collects the static settings and validates them once.
//! Values that may change while requests are in flight, like the bot token,
//! live in a [`DynamicConfig`] so readers never block writers.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use http::HeaderValue;

use crate::clock::{Clock, SystemClock};
use crate::error::{BuildError, RestError};
use crate::headers::RetryAfterUnit;
use crate::registry::BucketRegistry;
use crate::requester::{Inner, Requester};
use crate::retry::RetryPolicy;
use crate::scheduler::Scheduler;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{self, EventSink, NullSink, RestEvent};
use crate::transport::Transport;

/// Base URL requests are sent to unless overridden.
pub const DEFAULT_API_BASE: &str = "https://discordapp.com/api/v6";

/// Added to every computed rate-limit wait.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_millis(500);

/// Requests a new bucket allows before the server has reported its real limit.
pub const DEFAULT_BUCKET_LIMIT: u64 = 5;

pub const DEFAULT_USER_AGENT: &str = concat!("tollgate/", env!("CARGO_PKG_VERSION"));

/// `DynamicConfig<T>` gives cheap reads and controlled updates for shared config.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Replace the value with `f(current)`.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.inner.load_full();
        self.inner.store(Arc::new(f(&current)));
    }
}

/// `Authorization` value for a bot token, marked sensitive so it stays out of
/// debug output.
pub(crate) fn authorization(token: &str) -> Result<HeaderValue, RestError> {
    let mut value =
        HeaderValue::from_str(&format!("Bot {token}")).map_err(|_| RestError::InvalidToken)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Builder for [`Requester`].
///
/// ```rust
/// use tollgate::{BuildError, Requester};
///
/// let err = Requester::builder().token("abc").build().unwrap_err();
/// assert_eq!(err, BuildError::MissingTransport);
/// ```
pub struct RequesterBuilder {
    token: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    api_base: String,
    user_agent: String,
    safety_margin: Duration,
    default_limit: u64,
    retry: RetryPolicy,
    retry_after_unit: RetryAfterUnit,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Arc<dyn Sleeper>,
    sink: EventSink,
}

impl RequesterBuilder {
    pub fn new() -> Self {
        Self {
            token: None,
            transport: None,
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            safety_margin: DEFAULT_SAFETY_MARGIN,
            default_limit: DEFAULT_BUCKET_LIMIT,
            retry: RetryPolicy::default(),
            retry_after_unit: RetryAfterUnit::default(),
            clock: None,
            sleeper: Arc::new(TokioSleeper),
            sink: telemetry::boxed(NullSink),
        }
    }

    /// Bot token, sent as `Authorization: Bot <token>`.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Prefix for every request path. A trailing `/` is ignored.
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Extra wait added on top of every server-reported reset.
    pub fn safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Limit assumed for a bucket before any response has been seen.
    pub fn default_bucket_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_after_unit(mut self, unit: RetryAfterUnit) -> Self {
        self.retry_after_unit = unit;
        self
    }

    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Where [`RestEvent`]s go. Defaults to [`NullSink`].
    pub fn sink<S>(mut self, sink: S) -> Self
    where
        S: tower::Service<RestEvent, Response = ()> + Clone + Send + Sync + 'static,
        S::Error: Into<crate::BoxError>,
        S::Future: Send + 'static,
    {
        self.sink = telemetry::boxed(sink);
        self
    }

    pub fn build(self) -> Result<Requester, BuildError> {
        let token = self.token.ok_or(BuildError::MissingToken)?;
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let authorization = authorization(&token).map_err(|_| BuildError::InvalidToken)?;
        let user_agent =
            HeaderValue::from_str(&self.user_agent).map_err(|_| BuildError::InvalidUserAgent)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        Ok(Requester::from_inner(Inner {
            transport,
            registry: BucketRegistry::new(self.default_limit),
            clock,
            scheduler: Scheduler::new(self.sleeper),
            retry: self.retry,
            authorization: DynamicConfig::new(authorization),
            user_agent,
            api_base: self.api_base.trim_end_matches('/').to_string(),
            safety_margin: self.safety_margin,
            retry_after_unit: self.retry_after_unit,
            sink: self.sink,
        }))
    }
}

impl Default for RequesterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequesterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequesterBuilder")
            .field("transport", &self.transport)
            .field("api_base", &self.api_base)
            .field("safety_margin", &self.safety_margin)
            .field("default_limit", &self.default_limit)
            .field("retry", &self.retry)
            .field("retry_after_unit", &self.retry_after_unit)
            .finish_non_exhaustive()
    }
}
