use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// The token handed out when no response has been scripted.
pub const DEFAULT_TOKEN: &str = "abc123";

/// A scripted response of the token endpoint.
#[derive(Clone, Debug)]
pub enum TokenResponse {
    /// `200 OK` with `{"access_token": <token>}`.
    Token(String),
    /// An empty response with the given status.
    Status(StatusCode),
    /// `200 OK` with a raw body.
    Body(String),
    /// Resets the connection without responding.
    Drop,
}

/// One server-sent event.
#[derive(Clone, Debug)]
pub struct SseFrame {
    event: Option<&'static str>,
    data: String,
}

impl SseFrame {
    /// A batch of envelopes.
    pub fn batch(envelopes: Vec<Value>) -> Self {
        Self {
            event: None,
            data: serde_json::json!({ "batch": envelopes }).to_string(),
        }
    }

    /// A keep-alive event without envelopes.
    pub fn heartbeat() -> Self {
        Self {
            event: Some("heartbeat"),
            data: "{}".to_owned(),
        }
    }

    /// The end-of-stream marker.
    pub fn closing() -> Self {
        Self {
            event: Some("closing"),
            data: "{}".to_owned(),
        }
    }

    /// An event with arbitrary data.
    pub fn raw(data: &str) -> Self {
        Self {
            event: None,
            data: data.to_owned(),
        }
    }

    fn encode(&self) -> Bytes {
        let mut out = String::new();
        if let Some(event) = self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        for line in self.data.lines() {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        Bytes::from(out)
    }
}

/// A scripted response of the stream endpoint.
#[derive(Clone, Debug)]
pub enum StreamResponse {
    /// An empty response with the given status.
    Status(StatusCode),
    /// Sends the frames, then keeps the connection open if `hold` is set or closes it otherwise.
    Frames {
        /// The frames to send.
        frames: Vec<SseFrame>,
        /// Keep the connection open after the last frame.
        hold: bool,
    },
}

impl StreamResponse {
    /// Sends the frames and keeps the connection open afterwards.
    pub fn open(frames: Vec<SseFrame>) -> Self {
        Self::Frames { frames, hold: true }
    }

    /// Sends the frames and closes the connection afterwards.
    pub fn closed(frames: Vec<SseFrame>) -> Self {
        Self::Frames {
            frames,
            hold: false,
        }
    }
}

/// A request received by the token endpoint.
#[derive(Clone, Debug)]
pub struct CapturedTokenRequest {
    /// The decoded form body.
    pub form: HashMap<String, String>,
}

/// A request received by the stream endpoint.
#[derive(Clone, Debug)]
pub struct CapturedStreamRequest {
    /// The `Authorization` header, if any.
    pub authorization: Option<String>,
    /// The query parameters. Key-only parameters map to an empty string.
    pub query: HashMap<String, String>,
}

/// A request received by the series endpoint.
#[derive(Clone, Debug)]
pub struct CapturedSeries {
    /// The query parameters.
    pub query: HashMap<String, String>,
    /// The JSON body.
    pub body: Value,
}

impl CapturedSeries {
    /// Returns the series with the given metric name and tag, if any.
    pub fn find(&self, metric: &str, tag: &str) -> Option<&Value> {
        self.body["series"].as_array()?.iter().find(|series| {
            series["metric"] == metric
                && series["tags"]
                    .as_array()
                    .is_some_and(|tags| tags.iter().any(|t| t == tag))
        })
    }

    /// Returns the value of the single point of the matching series.
    pub fn value(&self, metric: &str, tag: &str) -> Option<i64> {
        self.find(metric, tag)?["points"][0][1].as_i64()
    }
}

#[derive(Default)]
struct MockState {
    tokens: VecDeque<TokenResponse>,
    streams: VecDeque<StreamResponse>,
    series_statuses: VecDeque<StatusCode>,
    ingress_statuses: VecDeque<StatusCode>,
    token_requests: Vec<CapturedTokenRequest>,
    stream_requests: Vec<CapturedStreamRequest>,
    series: Vec<CapturedSeries>,
    ingress: Vec<Value>,
}

type SharedState = Arc<Mutex<MockState>>;

/// An in-process mock of the token issuer, the log stream gateway and the metrics backend.
///
/// The gateway also accepts envelope batches on its ingress endpoint.
///
/// Responses are scripted per endpoint and consumed in order. Once a script runs out, the token
/// endpoint hands out [`DEFAULT_TOKEN`], the stream endpoint answers `503`, and the series and
/// ingress endpoints answer `202`.
pub struct MockUpstream {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    /// Binds to an ephemeral local port and starts serving.
    pub async fn start() -> Self {
        let state = SharedState::default();

        let router = Router::new()
            .route("/oauth/token", post(handle_token))
            .route("/v2/read", get(handle_stream))
            .route("/v2/write", post(handle_ingress))
            .route("/api/v1/series", post(handle_series))
            .with_state(state.clone());

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// The base URL of the server, without a trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Appends a response to the token endpoint's script.
    pub fn push_token(&self, response: TokenResponse) -> &Self {
        self.state.lock().tokens.push_back(response);
        self
    }

    /// Appends a response to the stream endpoint's script.
    pub fn push_stream(&self, response: StreamResponse) -> &Self {
        self.state.lock().streams.push_back(response);
        self
    }

    /// Appends a status to the series endpoint's script.
    pub fn push_series_status(&self, status: StatusCode) -> &Self {
        self.state.lock().series_statuses.push_back(status);
        self
    }

    /// Appends a status to the ingress endpoint's script.
    pub fn push_ingress_status(&self, status: StatusCode) -> &Self {
        self.state.lock().ingress_statuses.push_back(status);
        self
    }

    /// All requests received by the token endpoint so far.
    pub fn token_requests(&self) -> Vec<CapturedTokenRequest> {
        self.state.lock().token_requests.clone()
    }

    /// All requests received by the stream endpoint so far.
    pub fn stream_requests(&self) -> Vec<CapturedStreamRequest> {
        self.state.lock().stream_requests.clone()
    }

    /// All payloads received by the series endpoint so far.
    pub fn series(&self) -> Vec<CapturedSeries> {
        self.state.lock().series.clone()
    }

    /// Waits until at least `n` series payloads have arrived.
    pub async fn wait_for_series(&self, n: usize, timeout: Duration) -> Vec<CapturedSeries> {
        self.wait_until(timeout, |state| state.series.len() >= n)
            .await;
        self.series()
    }

    /// All envelopes accepted by the ingress endpoint so far, flattened across batches.
    ///
    /// Envelopes of rejected batches are not recorded.
    pub fn ingress_envelopes(&self) -> Vec<Value> {
        self.state.lock().ingress.clone()
    }

    /// Waits until at least `n` envelopes have been accepted by the ingress endpoint.
    pub async fn wait_for_ingress_envelopes(&self, n: usize, timeout: Duration) -> Vec<Value> {
        self.wait_until(timeout, |state| state.ingress.len() >= n)
            .await;
        self.ingress_envelopes()
    }

    /// Waits until at least `n` stream requests have arrived.
    pub async fn wait_for_stream_requests(&self, n: usize, timeout: Duration) {
        self.wait_until(timeout, |state| state.stream_requests.len() >= n)
            .await;
    }

    async fn wait_until(&self, timeout: Duration, condition: impl Fn(&MockState) -> bool) {
        let deadline = std::time::Instant::now() + timeout;
        while !condition(&self.state.lock()) {
            assert!(
                std::time::Instant::now() < deadline,
                "timed out waiting for mock upstream"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_token(
    State(state): State<SharedState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let response = {
        let mut state = state.lock();
        state.token_requests.push(CapturedTokenRequest { form });
        state.tokens.pop_front()
    };

    match response.unwrap_or_else(|| TokenResponse::Token(DEFAULT_TOKEN.to_owned())) {
        TokenResponse::Token(token) => {
            axum::Json(serde_json::json!({ "access_token": token, "token_type": "bearer" }))
                .into_response()
        }
        TokenResponse::Status(status) => status.into_response(),
        TokenResponse::Body(body) => body.into_response(),
        TokenResponse::Drop => {
            // An error in the body stream aborts the connection mid-response.
            let stream = futures::stream::once(async {
                Err::<Bytes, std::io::Error>(std::io::Error::other("dropped"))
            });
            Body::from_stream(stream).into_response()
        }
    }
}

async fn handle_stream(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let response = {
        let mut state = state.lock();
        state.stream_requests.push(CapturedStreamRequest {
            authorization,
            query,
        });
        state.streams.pop_front()
    };

    match response.unwrap_or(StreamResponse::Status(StatusCode::SERVICE_UNAVAILABLE)) {
        StreamResponse::Status(status) => status.into_response(),
        StreamResponse::Frames { frames, hold } => {
            let frames = futures::stream::iter(
                frames
                    .into_iter()
                    .map(|frame| Ok::<_, Infallible>(frame.encode())),
            );
            let body = if hold {
                Body::from_stream(frames.chain(futures::stream::pending()))
            } else {
                Body::from_stream(frames)
            };

            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
    }
}

async fn handle_series(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> StatusCode {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let mut state = state.lock();
    state.series.push(CapturedSeries { query, body });
    state
        .series_statuses
        .pop_front()
        .unwrap_or(StatusCode::ACCEPTED)
}

async fn handle_ingress(State(state): State<SharedState>, body: Bytes) -> StatusCode {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let mut state = state.lock();
    let status = state
        .ingress_statuses
        .pop_front()
        .unwrap_or(StatusCode::ACCEPTED);

    if status.is_success() {
        let envelopes = body["batch"].as_array().cloned().unwrap_or_default();
        state.ingress.extend(envelopes);
    }

    status
}
