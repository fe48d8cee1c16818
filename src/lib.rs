#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # tollgate
//!
//! Client-side rate limiting for bucketed REST APIs.
//!
//! Calls are grouped into buckets by route. Each bucket is a FIFO queue that
//! sends one request at a time and learns its limits from the server's
//! `X-RateLimit-*` headers. An exhausted bucket, or an account-wide global
//! limit, holds requests back until the window resets instead of letting them
//! hit the server. Requests that never get a response are retried under a
//! [`RetryPolicy`].
//!
//! ## Features
//!
//! - **Route buckets** compiled from path templates with `{placeholders}`
//! - **Single-flight, FIFO dispatch** per bucket; buckets run independently
//! - **Global limit** handling through a reserved `GLOBAL` bucket
//! - **Bounded retries** with optional backoff and jitter
//! - **Pluggable transport**, with an optional `reqwest` implementation
//! - **Telemetry** as `tower::Service` sinks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use http::Method;
//! use serde_json::json;
//! use tollgate::{Requester, Route};
//! # use tollgate::transport::{HttpRequest, HttpResponse, Transport};
//! # use tollgate::TransportError;
//! # #[derive(Debug)]
//! # struct MyTransport;
//! # #[async_trait::async_trait]
//! # impl Transport for MyTransport {
//! #     async fn send(&self, _: HttpRequest) -> Result<HttpResponse, TransportError> {
//! #         Err(TransportError::Timeout)
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let requester = Requester::builder()
//!         .token("my-bot-token")
//!         .transport(MyTransport)
//!         .build()?;
//!
//!     let create_message = Route::new(Method::POST, "/channels/{channel.id}/messages");
//!     let response = requester
//!         .request(&create_message, [("channel.id", "1234")], Some(json!({ "content": "hi" })))
//!         .await?;
//!     println!("{}", response.body);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod headers;
pub mod jitter;
pub mod prelude;
pub mod registry;
pub mod request;
pub mod requester;
pub mod retry;
pub mod route;
pub mod scheduler;
pub mod sleeper;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use backoff::Backoff;
pub use bucket::{Bucket, BucketSnapshot, Phase, GLOBAL_KEY};
pub use clock::{Clock, SystemClock};
pub use config::{DynamicConfig, RequesterBuilder};
pub use error::{BoxError, BuildError, RestError, TransportError};
pub use headers::RetryAfterUnit;
pub use jitter::Jitter;
pub use registry::BucketRegistry;
pub use request::{Response, ResponseHandle};
pub use requester::Requester;
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use route::{CompiledRoute, Route};
pub use scheduler::Scheduler;
pub use sleeper::{Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::Transport;
