#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use axum::{
    body::{Body, Bytes},
    http::{Method, Request, StatusCode},
    Router,
};
use request_logger::{config::AppConfig, create_app, AppState};
use tower::ServiceExt as _;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Log prefixes written by the request logging middleware.
const MIDDLEWARE_PREFIXES: [&str; 4] = [
    "Request received.",
    "Request data:",
    "Request parameters:",
    "Response sent.",
];

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Only the lines produced by the logging middleware, in order.
    pub fn middleware_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| MIDDLEWARE_PREFIXES.iter().any(|p| line.starts_with(p)))
            .collect()
    }
}

pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(self.0.clone())
    }
}

/// Installs a thread-local subscriber writing bare messages into memory.
/// Keep the guard alive for the duration of the test.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

pub async fn test_app(config: AppConfig) -> (Router, AppState) {
    let state = AppState::from_config(config);
    let router = create_app(state.clone()).await;
    (router, state)
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: impl Into<Body>,
) -> (StatusCode, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    let request = builder.body(body.into()).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Bytes) {
    send(router, Method::GET, uri, None, Body::empty()).await
}

pub async fn post_json(router: &Router, uri: &str, json: &str) -> (StatusCode, Bytes) {
    send(
        router,
        Method::POST,
        uri,
        Some("application/json"),
        json.to_string(),
    )
    .await
}
