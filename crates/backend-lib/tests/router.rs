//! HTTP surface of the login proxy.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use classroom_backend_lib::auth::LoginService;
use classroom_backend_lib::config::Settings;
use classroom_backend_lib::error::{LoginError, MSG_BAD_REQUEST, MSG_PROXY_ERROR};
use classroom_backend_lib::{router::create_router, AppState};
use classroom_common::{ConfigSnapshot, FailureBody, FieldPair, HeaderMode};
use serde_json::value::RawValue;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Login service answering every call with a fixed result
struct StubLogin {
    calls: AtomicUsize,
    reply: fn() -> Result<Box<RawValue>, LoginError>,
}

#[async_trait]
impl LoginService for StubLogin {
    async fn attempt_login(
        &self,
        _username: &str,
        _password: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<RawValue>, LoginError> {
        assert!(!cancel.is_cancelled());
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)()
    }
}

fn stub_app(verbose: bool, reply: fn() -> Result<Box<RawValue>, LoginError>) -> (Router, Arc<StubLogin>) {
    let mut settings = Settings::new("https://cis.test").unwrap();
    settings.verbose_logging = verbose;
    let stub = Arc::new(StubLogin {
        calls: AtomicUsize::new(0),
        reply,
    });
    let state = AppState::with_service(Arc::new(settings), stub.clone());
    (create_router(state), stub)
}

fn raw(text: &str) -> Box<RawValue> {
    RawValue::from_string(text.to_string()).unwrap()
}

fn post_login(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unreadable_body_is_a_proxy_error() {
    let (app, stub) = stub_app(false, || Ok(raw("{}")));

    let response = app.oneshot(post_login("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({"error": true, "code": 500, "message": MSG_PROXY_ERROR})
    );
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreadable_body_detail_when_verbose() {
    let (app, _stub) = stub_app(true, || Ok(raw("{}")));

    let response = app.oneshot(post_login("")).await.unwrap();
    let body: FailureBody = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(body.code, 500);
    assert!(body.detail.unwrap().is_string());
}

#[tokio::test]
async fn test_success_is_passed_through() {
    let (app, stub) = stub_app(false, || Ok(raw(r#"{"user":{"username":"u"},"token":"abc","n":1.50}"#)));

    let response = app
        .oneshot(post_login(r#"{"username":"u","password":"p"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], br#"{"user":{"username":"u"},"token":"abc","n":1.50}"#);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}

/// Log sink shared with the test
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_student_name_stays_out_of_info_logs() {
    let logs = Captured::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || sink.clone())
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let (app, _stub) = stub_app(false, || {
        Ok(raw(r#"{"token":"t","student":{"fullName":"Somchai Jaidee"}}"#))
    });
    let response = app
        .oneshot(post_login(r#"{"username":"u","password":"p"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("login succeeded"));
    assert!(!output.contains("Somchai"));
}

#[tokio::test]
async fn test_cancelled_login_is_unavailable() {
    let (app, _stub) = stub_app(false, || Err(LoginError::Cancelled));

    let response = app
        .oneshot(post_login(r#"{"username":"u","password":"p"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_missing_credentials_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(0)
        .mount(&server)
        .await;

    let state = AppState::new(Settings::new(&server.uri()).unwrap()).unwrap();
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(post_login(r#"{"username":"  "}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({"error": true, "code": 400, "message": MSG_BAD_REQUEST})
    );

    let response = app.oneshot(post_login("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/classroom/signin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t", "student": {"id": 7}})))
        .expect(1)
        .mount(&server)
        .await;

    // default settings keep the pinned upstream path
    let state = AppState::new(Settings::new(&server.uri()).unwrap()).unwrap();
    let response = create_router(state)
        .oneshot(post_login(r#"{"username":"653380000-1","password":"pw"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"token": "t", "student": {"id": 7}}));
}

#[tokio::test]
async fn test_numeric_username_is_forwarded_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/classroom/signin"))
        .and(body_json(json!({"username": "6533800001", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::new(Settings::new(&server.uri()).unwrap()).unwrap();
    let response = create_router(state)
        .oneshot(post_login(r#"{"username":6533800001,"password":"pw"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"token": "t"}));
}

#[tokio::test]
async fn test_config_snapshot() {
    let mut settings = Settings::new("https://cis.test/").unwrap();
    settings.candidate_paths = vec!["/auth/login".to_string()];
    settings.field_pairs = vec![FieldPair::new("studentId", "pwd")];
    settings.api_key = Some("secret-key".to_string());
    let app = create_router(AppState::new(settings).unwrap());

    let response = app
        .oneshot(Request::builder().uri("/login/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let raw = json_body(response).await;
    assert!(!raw.to_string().contains("secret-key"));
    assert_eq!(raw["info"]["headerMode"], "X-API-KEY");
    assert_eq!(raw["info"]["fieldPairs"], json!([["studentId", "pwd"]]));

    let snapshot: ConfigSnapshot = serde_json::from_value(raw).unwrap();
    assert!(snapshot.ok);
    assert_eq!(snapshot.info.base, "https://cis.test");
    assert_eq!(snapshot.info.header_mode, HeaderMode::ApiKey);
    assert_eq!(snapshot.info.url_preview, vec!["https://cis.test/auth/login"]);
    assert_eq!(snapshot.info.dispatch_urls, vec!["https://cis.test/api/classroom/signin"]);
}

#[tokio::test]
async fn test_health() {
    let (app, _stub) = stub_app(false, || Ok(raw("{}")));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}
