#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use tokio::time::Instant;
use tollgate::transport::{HttpRequest, HttpResponse, Transport};
use tollgate::{Clock, Requester, RequesterBuilder, TrackingSleeper, TransportError};

pub const API_BASE: &str = "http://api.test";

/// Epoch milliseconds the test clock starts at. A whole second, so reset
/// headers in seconds convert exactly.
pub const EPOCH_MS: u64 = 1_600_000_000_000;

/// Clock pinned to `EPOCH_MS` at creation and advanced by Tokio time.
#[derive(Debug, Clone)]
pub struct TestClock {
    start: Instant,
}

impl TestClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for TestClock {
    fn now_millis(&self) -> u64 {
        EPOCH_MS + self.start.elapsed().as_millis() as u64
    }
}

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond { status: StatusCode, headers: Vec<(String, String)>, body: String },
    Refused,
    Timeout,
    /// The transport itself panics mid-exchange.
    Panic,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Respond { status: StatusCode::OK, headers: Vec::new(), body: body.to_string() }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn with_headers(mut self, extra: Vec<(String, String)>) -> Self {
        if let Reply::Respond { headers, .. } = &mut self {
            headers.extend(extra);
        }
        self
    }
}

/// `X-RateLimit-*` headers with `reset_after_ms` measured from `EPOCH_MS`.
pub fn limits(limit: u64, remaining: u64, reset_after_ms: u64) -> Vec<(String, String)> {
    let reset = (EPOCH_MS + reset_after_ms) as f64 / 1000.0;
    vec![
        ("X-RateLimit-Limit".into(), limit.to_string()),
        ("X-RateLimit-Remaining".into(), remaining.to_string()),
        ("X-RateLimit-Reset".into(), reset.to_string()),
    ]
}

pub fn global(retry_after_ms: u64) -> Vec<(String, String)> {
    vec![
        ("X-RateLimit-Global".into(), "true".into()),
        ("Retry-After".into(), retry_after_ms.to_string()),
    ]
}

/// What the transport saw.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct State {
    replies: HashMap<String, VecDeque<Reply>>,
    calls: Vec<Call>,
    latency: Duration,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Transport replaying per-path scripts. Unscripted calls get `200 {}`.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().latency = latency;
        transport
    }

    pub fn push(&self, path: &str, reply: Reply) {
        self.state.lock().unwrap().replies.entry(path.to_string()).or_default().push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }

    /// Most exchanges ever concurrently in flight for `path`.
    pub fn max_in_flight(&self, path: &str) -> usize {
        self.state.lock().unwrap().max_in_flight.get(path).copied().unwrap_or(0)
    }
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = request.url.strip_prefix(API_BASE).unwrap_or(&request.url).to_string();
        let (reply, latency) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call {
                method: request.method.clone(),
                path: path.clone(),
                body: request.body.as_deref().map(|b| serde_json::from_slice(b).unwrap()),
                authorization: header(&request.headers, AUTHORIZATION),
                content_type: header(&request.headers, CONTENT_TYPE),
                at: Instant::now(),
            });
            let in_flight = {
                let n = state.in_flight.entry(path.clone()).or_default();
                *n += 1;
                *n
            };
            let max = state.max_in_flight.entry(path.clone()).or_default();
            *max = (*max).max(in_flight);
            let reply = state.replies.get_mut(&path).and_then(VecDeque::pop_front);
            (reply.unwrap_or_else(|| Reply::ok("{}")), state.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        *self.state.lock().unwrap().in_flight.get_mut(&path).unwrap() -= 1;

        match reply {
            Reply::Respond { status, headers, body } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.insert(
                        HeaderName::from_bytes(name.as_bytes()).unwrap(),
                        HeaderValue::from_str(&value).unwrap(),
                    );
                }
                Ok(HttpResponse { status, headers: map, body: body.into_bytes() })
            }
            Reply::Refused => Err(TransportError::Connection("connection reset by peer".into())),
            Reply::Timeout => Err(TransportError::Timeout),
            Reply::Panic => panic!("transport panicked"),
        }
    }
}

pub fn builder(transport: &MockTransport, sleeper: &TrackingSleeper) -> RequesterBuilder {
    Requester::builder()
        .token("test-token")
        .transport(transport.clone())
        .api_base(API_BASE)
        .clock(TestClock::new())
        .sleeper(sleeper.clone())
}

pub fn requester(transport: &MockTransport) -> Requester {
    builder(transport, &TrackingSleeper::new()).build().unwrap()
}

/// Milliseconds between `start` and `call`.
pub fn elapsed_ms(start: Instant, call: &Call) -> u128 {
    (call.at - start).as_millis()
}
