//! In-process mock of the postboard API for network tests.
//!
//! Replies are scripted per `METHOD /path`. Each route holds a queue; the
//! last reply repeats once the queue is down to one entry. Every request is
//! recorded with the headers the tests assert on.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct MockReply {
    status: u16,
    body: Value,
    text: bool,
    delay: Duration,
    set_cookie: Option<String>,
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self { status, body, text: false, delay: Duration::ZERO, set_cookie: None }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self { text: true, ..Self::json(status, Value::String(body.to_owned())) }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.set_cookie = Some(cookie.to_owned());
        self
    }

    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = if self.text {
            (status, self.body.as_str().unwrap_or_default().to_owned()).into_response()
        } else {
            (status, axum::Json(self.body)).into_response()
        };
        if let Some(cookie) = self.set_cookie {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().insert(SET_COOKIE, value);
            }
        }
        response
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub path_and_query: String,
    pub authorization: Vec<String>,
    pub cookie: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockApi {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockApi {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock listener should bind");
        let addr = listener.local_addr().expect("mock listener should have an address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server failed");
        });
        Self { base_url: format!("http://{addr}"), state }
    }

    /// Queue a reply for `method path`.
    pub fn reply(&self, method: &str, path: &str, reply: MockReply) -> &Self {
        self.state
            .routes
            .lock()
            .expect("routes mutex should lock")
            .entry(route_key(method, path))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().expect("requests mutex should lock").clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests_to(method, path).len()
    }
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {path}", method.to_ascii_uppercase())
}

fn header_str(headers: &HeaderMap, name: &axum::http::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

async fn handle(State(state): State<Arc<MockState>>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let recorded = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_owned(),
        path_and_query: uri.path_and_query().map_or_else(|| uri.path().to_owned(), ToString::to_string),
        authorization: headers
            .get_all(AUTHORIZATION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect(),
        cookie: header_str(&headers, &COOKIE),
        content_type: header_str(&headers, &CONTENT_TYPE),
        body,
    };
    state.requests.lock().expect("requests mutex should lock").push(recorded);

    let reply = {
        let mut routes = state.routes.lock().expect("routes mutex should lock");
        routes.get_mut(&route_key(method.as_str(), uri.path())).and_then(|queue| {
            if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
        })
    };

    match reply {
        Some(reply) => {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            reply.into_response()
        }
        None => (StatusCode::NOT_FOUND, axum::Json(json!({"message": "no mock route"}))).into_response(),
    }
}
