//! Request/response logging middleware.
//!
//! Every observed request produces, in order:
//!
//! ```text
//! Request received. Method: POST, Path: /api/v1/users
//! Request data: {"name":"alice"}            (POST with a JSON body)
//! Request parameters: a=1 b=2,3              (GET with a query string)
//! Response sent. Status: 201
//! ```
//!
//! The request is tagged with [`RequestLogged`] the first time it passes
//! through, so re-dispatching it (a forward, or a second instance of this
//! layer further down the stack) does not log it twice.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use tracing::{info, warn};

use crate::{config::LoggingConfig, AppState};

/// Marks a request that has already been logged. Lives in the request
/// extensions and is dropped together with the request.
#[derive(Debug, Clone, Copy)]
pub struct RequestLogged;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] axum::Error),
}

impl IntoResponse for LoggingError {
    fn into_response(self) -> Response {
        let status = match &self {
            LoggingError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            LoggingError::BodyRead(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

pub async fn logging_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, LoggingError> {
    let config = state.config_watcher.logging_config().await;

    if !config.enabled || !config.url_patterns.matches(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    log_request_response(&config, request, next).await
}

/// Logs one request and its response. Requests already carrying
/// [`RequestLogged`] are passed through untouched.
pub async fn log_request_response(
    config: &LoggingConfig,
    mut request: Request,
    next: Next,
) -> Result<Response, LoggingError> {
    if request.extensions().get::<RequestLogged>().is_some() {
        return Ok(next.run(request).await);
    }
    request.extensions_mut().insert(RequestLogged);

    info!(
        "Request received. Method: {}, Path: {}",
        request.method(),
        request.uri().path()
    );

    if config.log_request_body && is_method(&request, Method::POST) && is_json(&request) {
        let (request_with_body, data) = buffer_body(request, config.max_body_bytes).await?;
        request = request_with_body;
        info!("Request data: {}", truncate(&data, config.max_logged_body_bytes));
    }

    if config.log_query_params && is_method(&request, Method::GET) {
        let params = QueryParams::parse(request.uri().query().unwrap_or_default());
        if !params.is_empty() {
            info!("Request parameters: {}", params);
        }
    }

    let response = next.run(request).await;

    info!("Response sent. Status: {}", response.status().as_u16());

    Ok(response)
}

/// Method names are matched ASCII case-insensitively, so an extension
/// method spelled `post` is treated like `POST`.
fn is_method(request: &Request, method: Method) -> bool {
    request
        .method()
        .as_str()
        .eq_ignore_ascii_case(method.as_str())
}

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

/// Reads the whole body, returning the request with an equivalent body
/// re-attached so downstream extractors still see it.
async fn buffer_body(request: Request, limit: usize) -> Result<(Request, String), LoggingError> {
    let (parts, body) = request.into_parts();

    let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
        let err = if is_length_limit(&e) {
            LoggingError::BodyTooLarge { limit }
        } else {
            LoggingError::BodyRead(e)
        };
        warn!(
            method = %parts.method,
            path = parts.uri.path(),
            error = %err,
            "Could not buffer request body"
        );
        err
    })?;

    let data = String::from_utf8_lossy(&bytes).into_owned();
    Ok((Request::from_parts(parts, Body::from(bytes)), data))
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> =
        Some(err as &(dyn std::error::Error + 'static));
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn truncate(data: &str, limit: Option<usize>) -> &str {
    match limit {
        Some(limit) if data.len() > limit => {
            let mut end = limit;
            while !data.is_char_boundary(end) {
                end -= 1;
            }
            &data[..end]
        }
        _ => data,
    }
}

/// Query parameters grouped by name, in the order each name first appears.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, Vec<String>)>);

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.push(key.into_owned(), value.into_owned());
        }
        params
    }

    pub fn push(&mut self, key: String, value: String) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.0.push((key, vec![value])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `key=v1,v2` per name, names separated by a single space.
impl std::fmt::Display for QueryParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (key, values)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, values.join(","))?;
        }
        Ok(())
    }
}
