//! Pending calls and the handles callers await.

use crate::error::RestError;
use crate::route::CompiledRoute;
use http::{HeaderMap, StatusCode};
use pin_project::pin_project;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// A successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body; `Value::Null` for an empty body.
    pub body: Value,
}

type Outcome = Result<Response, RestError>;

/// One pending call. Lives in exactly one bucket queue (or one in-flight
/// dispatch) until its outcome is sent.
#[derive(Debug)]
pub(crate) struct OutboundRequest {
    pub(crate) route: CompiledRoute,
    pub(crate) body: Option<Value>,
    /// Exchanges that ended without a response.
    pub(crate) failures: usize,
    tx: oneshot::Sender<Outcome>,
}

impl OutboundRequest {
    pub(crate) fn new(route: CompiledRoute, body: Option<Value>) -> (Self, ResponseHandle) {
        let (tx, rx) = oneshot::channel();
        (Self { route, body, failures: 0, tx }, ResponseHandle { rx })
    }

    /// Consumes the request, so the outcome is delivered at most once.
    pub(crate) fn complete(self, outcome: Outcome) {
        // The caller may have dropped its handle; nobody is left to tell.
        let _ = self.tx.send(outcome);
    }

    /// The caller dropped its handle.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Resolves once with the outcome of a submitted call.
///
/// Dropping the handle abandons the call: if it has not been dispatched yet it
/// never will be.
#[pin_project]
#[derive(Debug)]
#[must_use = "dropping a ResponseHandle abandons the request"]
pub struct ResponseHandle {
    #[pin]
    rx: oneshot::Receiver<Outcome>,
}

impl Future for ResponseHandle {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().rx.poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RestError::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}
