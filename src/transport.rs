//! HTTP transport.
//!
//! The client never touches sockets itself: every attempt is exactly one
//! [`Transport::send`] call against one endpoint. [`HttpTransport`] is the
//! production implementation on top of `reqwest`; tests plug in scripted
//! transports.

use crate::config::ClientOptions;
use crate::error::{MonkError, MonkResult};
use crate::pool::Endpoint;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;

pub use reqwest::Method;

/// One HTTP request, relative to an endpoint's base URL.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Raw HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    /// Header names are lower-cased; repeated headers are comma-joined.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// JSON response with the matching content type.
    pub fn json(status: u16, body: &JsonValue) -> Self {
        let mut response = Self::new(status, body.to_string());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Parse the body as JSON. An empty body is `None`.
    pub fn body_json(&self) -> Result<Option<JsonValue>, serde_json::Error> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&self.body).map(Some)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Performs one HTTP exchange with one endpoint.
///
/// Implementations report connect failures, timeouts and unreadable bodies
/// as [`MonkError::Connection`], which the retry engine treats as retryable.
/// Any HTTP status, including 5xx, is a successful exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &Endpoint, request: Request) -> MonkResult<Response>;
}

/// `reqwest`-based transport with basic auth and default-schema support.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    username: Option<String>,
    password: Option<String>,
    schema: Option<String>,
}

impl HttpTransport {
    pub fn new(options: &ClientOptions) -> MonkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(options.timeout_ms))
            .build()
            .map_err(|e| MonkError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            username: options.username.clone(),
            password: options.password.clone(),
            schema: options.schema.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &Endpoint, request: Request) -> MonkResult<Response> {
        let url = join_url(endpoint.url(), &request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(ACCEPT, "application/json");

        if !request.has_header("content-type") {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }
        if let Some(schema) = &self.schema {
            builder = builder.header("Default-Schema", schema);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!("Failed request to {}: {}", url, e);
            MonkError::connection(format!("Failed to send request to {}: {}", url, e))
        })?;

        let status = response.status().as_u16();
        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else { continue };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|v| {
                    v.push(',');
                    v.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        let body = response.bytes().await.map_err(|e| {
            MonkError::connection(format!("Failed to read response from {}: {}", url, e))
        })?;

        tracing::debug!("{} {} -> {} ({} bytes)", request.method, url, status, body.len());
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// Join a base URL and a request path with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
