//! The HTTP exchange seam.
//!
//! The requester never talks to the network itself. It hands a fully built
//! [`HttpRequest`] to a [`Transport`] and interprets whatever comes back. Any
//! response, whatever its status, is `Ok`; `Err` means no response was
//! obtained and the request is eligible for retry.

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};

use crate::error::TransportError;

/// A request ready for the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A response as received.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug + 'static {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use super::*;

    /// [`Transport`] backed by a `reqwest::Client`.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl From<reqwest::Error> for TransportError {
        fn from(err: reqwest::Error) -> Self {
            if err.is_timeout() {
                TransportError::Timeout
            } else if err.is_connect() {
                TransportError::Connection(err.to_string())
            } else {
                TransportError::Other(Box::new(err))
            }
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut builder =
                self.client.request(request.method, &request.url).headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?.to_vec();
            Ok(HttpResponse { status, headers, body })
        }
    }
}
