//! Convenient re-exports for common tollgate types.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    bucket::{BucketSnapshot, Phase},
    config::{RequesterBuilder, DEFAULT_API_BASE, DEFAULT_SAFETY_MARGIN},
    error::{BuildError, RestError, TransportError},
    headers::RetryAfterUnit,
    jitter::Jitter,
    request::{Response, ResponseHandle},
    requester::Requester,
    retry::{RetryPolicy, RetryPolicyBuilder},
    route::{CompiledRoute, Route},
    telemetry::{DeferReason, LogSink, MemorySink, NullSink, RestEvent},
    transport::{HttpRequest, HttpResponse, Transport},
};
