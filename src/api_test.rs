use super::*;
use crate::credential::MemoryStore;
use crate::test_support::{MockApi, MockReply};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

struct MockAuth {
    store: Arc<MemoryStore>,
    outcome: Result<String, ApiError>,
    refreshes: AtomicUsize,
    teardowns: AtomicUsize,
}

impl MockAuth {
    fn new(store: Arc<MemoryStore>, next_token: Option<&str>) -> Arc<Self> {
        let outcome = next_token.map(str::to_owned).ok_or_else(ApiError::session_expired);
        Self::with_outcome(store, outcome)
    }

    fn failing(store: Arc<MemoryStore>, error: ApiError) -> Arc<Self> {
        Self::with_outcome(store, Err(error))
    }

    fn with_outcome(store: Arc<MemoryStore>, outcome: Result<String, ApiError>) -> Arc<Self> {
        Arc::new(Self { store, outcome, refreshes: AtomicUsize::new(0), teardowns: AtomicUsize::new(0) })
    }
}

#[async_trait::async_trait]
impl AuthHandler for MockAuth {
    async fn refresh(&self) -> Result<(), ApiError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let token = self.outcome.clone()?;
        self.store.set_credential(Credential::Bearer(token));
        Ok(())
    }

    fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        self.store.clear();
    }
}

fn client_with(mock: &MockApi, store: &Arc<MemoryStore>, auth: Option<&Arc<MockAuth>>) -> ApiClient {
    let client = ApiClient::new(&ClientConfig::with_base_url(&mock.base_url), store.clone()).unwrap();
    match auth {
        Some(auth) => {
            let weak: Weak<MockAuth> = Arc::downgrade(auth);
            client.with_auth_handler(weak)
        }
        None => client,
    }
}

fn bearer_store(token: &str) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_credential(Credential::Bearer(token.to_owned())))
}

// =============================================================================
// pure helpers
// =============================================================================

#[test]
fn join_url_adds_missing_slash() {
    assert_eq!(join_url("http://h/api", "/posts"), "http://h/api/posts");
    assert_eq!(join_url("http://h/api", "posts"), "http://h/api/posts");
    assert_eq!(join_url("http://h/api", ""), "http://h/api");
}

#[test]
fn parse_payload_respects_declared_type() {
    assert_eq!(parse_payload(true, r#"{"ok":true}"#.into()).unwrap(), json!({"ok": true}));
    assert_eq!(parse_payload(false, r#"{"ok":true}"#.into()).unwrap(), json!(r#"{"ok":true}"#));
    assert_eq!(parse_payload(true, "  ".into()).unwrap(), Value::Null);
    assert!(matches!(parse_payload(true, "{oops".into()), Err(ApiError::Decode(_))));
}

#[test]
fn request_options_presets() {
    assert_eq!(RequestOptions::default(), RequestOptions::AUTHENTICATED);
    assert!(!RequestOptions::ANONYMOUS.authenticated);
    assert!(!RequestOptions::AUTHENTICATED.without_refresh().allow_refresh);
    assert!(RequestOptions::AUTHENTICATED.without_refresh().authenticated);
}

#[test]
fn request_body_json_serializes_structs() {
    let body = RequestBody::json(&crate::types::PostDraft {
        title: "t".into(),
        body: "b".into(),
        image_urls: vec![],
    })
    .unwrap();
    assert!(matches!(body, RequestBody::Json(v) if v["imageUrls"] == json!([])));
}

// =============================================================================
// credential attachment
// =============================================================================

#[tokio::test]
async fn bearer_header_sent_exactly_once_per_attempt() {
    let mock = MockApi::start().await;
    mock.reply("GET", "/posts/1", MockReply::json(401, json!({"message": "expired"})))
        .reply("GET", "/posts/1", MockReply::json(200, json!({"id": 1})));
    let store = bearer_store("old");
    let auth = MockAuth::new(store.clone(), Some("new"));
    let client = client_with(&mock, &store, Some(&auth));

    let body = client.get("/posts/1").await.unwrap();
    assert_eq!(body, json!({"id": 1}));

    let attempts = mock.requests_to("GET", "/posts/1");
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].authorization, vec!["Bearer old".to_owned()]);
    assert_eq!(attempts[1].authorization, vec!["Bearer new".to_owned()]);
}

#[tokio::test]
async fn anonymous_requests_carry_no_credential() {
    let mock = MockApi::start().await;
    mock.reply("POST", "/auth/login", MockReply::json(200, json!({"accessToken": "abc"})));
    let store = bearer_store("stale");
    let client = client_with(&mock, &store, None);

    client
        .send(Method::POST, "/auth/login", Some(RequestBody::Json(json!({"email": "a"}))), RequestOptions::ANONYMOUS)
        .await
        .unwrap();

    let sent = &mock.requests_to("POST", "/auth/login")[0];
    assert!(sent.authorization.is_empty());
    assert_eq!(sent.json(), json!({"email": "a"}));
}

#[tokio::test]
async fn text_body_passes_through_with_json_content_type() {
    let mock = MockApi::start().await;
    mock.reply("PUT", "/comments/9", MockReply::json(200, json!({"id": 9})));
    let store = bearer_store("t");
    let client = client_with(&mock, &store, None);

    client
        .put("/comments/9", Some(RequestBody::Text(r#"{"body":"raw"}"#.into())))
        .await
        .unwrap();

    let sent = &mock.requests_to("PUT", "/comments/9")[0];
    assert_eq!(sent.content_type.as_deref(), Some("application/json"));
    assert_eq!(sent.json(), json!({"body": "raw"}));
}

// =============================================================================
// refresh-and-retry
// =============================================================================

#[tokio::test]
async fn refresh_then_retry_returns_retried_body() {
    let mock = MockApi::start().await;
    mock.reply("GET", "/users/me/feed", MockReply::json(401, json!({"message": "expired"})))
        .reply("GET", "/users/me/feed", MockReply::json(200, json!({"ok": true})));
    let store = bearer_store("old");
    let auth = MockAuth::new(store.clone(), Some("new"));
    let client = client_with(&mock, &store, Some(&auth));

    let body = client.get("/users/me/feed").await.unwrap();

    assert_eq!(body, json!({"ok": true}));
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(auth.teardowns.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_401_after_retry_does_not_refresh_again() {
    let mock = MockApi::start().await;
    mock.reply("DELETE", "/posts/5", MockReply::json(401, json!({"message": "still expired"})));
    let store = bearer_store("old");
    let auth = MockAuth::new(store.clone(), Some("new"));
    let client = client_with(&mock, &store, Some(&auth));

    let err = client.delete("/posts/5").await.unwrap_err();

    assert!(err.is_unauthenticated());
    assert_eq!(err.payload().message, "still expired");
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(mock.count("DELETE", "/posts/5"), 2);
    assert_eq!(auth.teardowns.load(Ordering::SeqCst), 1);
    assert!(store.credential().is_none());
}

#[tokio::test]
async fn failed_refresh_surfaces_unauthenticated_without_retry() {
    let mock = MockApi::start().await;
    mock.reply("GET", "/posts", MockReply::json(401, json!({"message": "expired"})));
    let store = bearer_store("old");
    let auth = MockAuth::new(store.clone(), None);
    let client = client_with(&mock, &store, Some(&auth));

    let err = client.get("/posts").await.unwrap_err();

    assert!(err.is_unauthenticated());
    assert_eq!(mock.count("GET", "/posts"), 1);
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(auth.teardowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_refresh_failure_surfaces_unchanged_and_keeps_session() {
    let mock = MockApi::start().await;
    mock.reply("GET", "/posts", MockReply::json(401, json!({"message": "expired"})));
    let store = bearer_store("old");
    let auth = MockAuth::failing(store.clone(), ApiError::Network("connection reset".into()));
    let client = client_with(&mock, &store, Some(&auth));

    let err = client.get("/posts").await.unwrap_err();

    assert!(matches!(&err, ApiError::Network(message) if message == "connection reset"));
    assert_eq!(mock.count("GET", "/posts"), 1);
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(auth.teardowns.load(Ordering::SeqCst), 0);
    assert_eq!(store.credential(), Some(Credential::Bearer("old".into())));
}

#[tokio::test]
async fn anonymous_401_neither_refreshes_nor_tears_down() {
    let mock = MockApi::start().await;
    mock.reply("POST", "/auth/login", MockReply::json(401, json!({"message": "wrong password"})));
    let store = bearer_store("keep");
    let auth = MockAuth::new(store.clone(), Some("new"));
    let client = client_with(&mock, &store, Some(&auth));

    let err = client
        .send(Method::POST, "/auth/login", None, RequestOptions::ANONYMOUS)
        .await
        .unwrap_err();

    assert_eq!(err.payload().message, "wrong password");
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(auth.teardowns.load(Ordering::SeqCst), 0);
    assert!(store.credential().is_some());
}

#[tokio::test]
async fn refresh_disabled_tears_down_on_401() {
    let mock = MockApi::start().await;
    mock.reply("POST", "/auth/logout", MockReply::json(401, json!({})));
    let store = bearer_store("old");
    let auth = MockAuth::new(store.clone(), Some("new"));
    let client = client_with(&mock, &store, Some(&auth));

    let err = client
        .send(Method::POST, "/auth/logout", None, RequestOptions::AUTHENTICATED.without_refresh())
        .await
        .unwrap_err();

    assert!(err.is_unauthenticated());
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(auth.teardowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_auth_handler_surfaces_unauthenticated() {
    let mock = MockApi::start().await;
    mock.reply("GET", "/users/me", MockReply::json(401, json!({"message": "login required"})));
    let store = bearer_store("old");
    let client = client_with(&mock, &store, None);

    let err = client.get("/users/me").await.unwrap_err();
    assert!(err.is_unauthenticated());
    assert_eq!(mock.count("GET", "/users/me"), 1);
}

// =============================================================================
// failure classification
// =============================================================================

#[tokio::test]
async fn client_errors_carry_json_payload() {
    let mock = MockApi::start().await;
    mock.reply("POST", "/posts", MockReply::json(400, json!({"message": "title is required"})));
    let store = bearer_store("t");
    let client = client_with(&mock, &store, None);

    let err = client.post("/posts", Some(RequestBody::Json(json!({"body": "b"})))).await.unwrap_err();
    match err {
        ApiError::Validation { status, message, data } => {
            assert_eq!(status, 400);
            assert_eq!(message, "title is required");
            assert_eq!(data, json!({"message": "title is required"}));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert!(store.credential().is_some());
}

#[tokio::test]
async fn server_errors_carry_text_payload() {
    let mock = MockApi::start().await;
    mock.reply("PATCH", "/users/me", MockReply::text(502, "bad gateway"));
    let store = bearer_store("t");
    let client = client_with(&mock, &store, None);

    let err = client.patch("/users/me", None).await.unwrap_err();
    assert!(matches!(&err, ApiError::Server { status: 502, .. }));
    assert_eq!(err.payload().message, "bad gateway");
    assert_eq!(err.payload().data, json!("bad gateway"));
}

#[tokio::test]
async fn success_with_text_body_returns_string() {
    let mock = MockApi::start().await;
    mock.reply("POST", "/posts/3/like", MockReply::text(200, "liked"));
    let store = bearer_store("t");
    let client = client_with(&mock, &store, None);

    assert_eq!(client.post("/posts/3/like", None).await.unwrap(), json!("liked"));
}

#[tokio::test]
async fn transport_failure_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = bearer_store("t");
    let client = ApiClient::new(&ClientConfig::with_base_url(&format!("http://{addr}")), store).unwrap();

    let err = client.get("/posts").await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    assert_eq!(err.status(), None);
}

// =============================================================================
// multipart
// =============================================================================

#[tokio::test]
async fn multipart_upload_is_rebuilt_for_retry() {
    let mock = MockApi::start().await;
    mock.reply("POST", "/images", MockReply::json(401, json!({})))
        .reply("POST", "/images", MockReply::json(200, json!({"urls": ["https://cdn.test/1.png"]})));
    let store = bearer_store("old");
    let auth = MockAuth::new(store.clone(), Some("new"));
    let client = client_with(&mock, &store, Some(&auth));

    let file = ImageFile { file_name: "cat.png".into(), content_type: "image/png".into(), bytes: b"PNGDATA".to_vec() };
    let body = client.upload("/images", "images", vec![file]).await.unwrap();
    assert_eq!(body, json!({"urls": ["https://cdn.test/1.png"]}));

    let attempts = mock.requests_to("POST", "/images");
    assert_eq!(attempts.len(), 2);
    for attempt in &attempts {
        assert!(attempt.content_type.as_deref().is_some_and(|ct| ct.starts_with("multipart/form-data")));
        let raw = String::from_utf8_lossy(&attempt.body);
        assert!(raw.contains(r#"name="images""#));
        assert!(raw.contains(r#"filename="cat.png""#));
        assert!(raw.contains("PNGDATA"));
    }
    assert_eq!(attempts[1].authorization, vec!["Bearer new".to_owned()]);
}
