//! Error types for the requester.
//!
//! Only transport failures and rate limits are recovered internally. Everything
//! else reaches the caller's [`ResponseHandle`](crate::ResponseHandle) exactly
//! once.

use http::StatusCode;
use serde_json::Value;

/// Boxed error used for opaque transport causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The exchange produced no response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
    #[error(transparent)]
    Other(BoxError),
}

/// Failure delivered to a caller, or raised synchronously by `submit`.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// A route placeholder had no value in the supplied parameters.
    #[error("route {template:?} has no value for placeholder {{{name}}}")]
    UnboundParameter { template: String, name: String },
    /// A route template contains an unterminated `{`.
    #[error("route template {template:?} has an unterminated placeholder")]
    MalformedTemplate { template: String },
    /// A route's bucket template compiled to the reserved global key.
    #[error("bucket key {key:?} is reserved for the global limit")]
    ReservedBucket { key: String },
    /// `submit` was called outside a Tokio runtime.
    #[error("no Tokio runtime is available to drive the request")]
    RuntimeUnavailable,
    /// The server answered with a non-success status.
    #[error("server responded with {status}")]
    Status { status: StatusCode, body: Value },
    /// A request or response body was not valid JSON.
    #[error("invalid JSON body: {0}")]
    Body(#[from] serde_json::Error),
    /// The configured token cannot be sent as a header value.
    #[error("token is not a valid header value")]
    InvalidToken,
    /// The retry policy gave up on a request that kept failing in transport.
    #[error("retry exhausted after {attempts} attempts; last error: {source}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        source: TransportError,
    },
    /// The requester went away before the call completed.
    #[error("request was dropped before completion")]
    Dropped,
}

impl RestError {
    /// Status code for [`RestError::Status`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the call was rejected before entering any queue.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::UnboundParameter { .. }
                | Self::MalformedTemplate { .. }
                | Self::ReservedBucket { .. }
                | Self::RuntimeUnavailable
        )
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }
}

/// Errors produced while building a requester.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("a token is required")]
    MissingToken,
    #[error("a transport is required")]
    MissingTransport,
    #[error("token is not a valid header value")]
    InvalidToken,
    #[error("user agent is not a valid header value")]
    InvalidUserAgent,
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}
