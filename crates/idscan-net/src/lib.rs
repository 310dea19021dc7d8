//! # ID Scanner Net
//!
//! The network side of the offline proxy: request and response types, the
//! [`Fetcher`] trait the proxy falls back to on a cache miss, and
//! [`HttpFetcher`], its `reqwest`-backed implementation.
//!
//! HTTP error statuses are ordinary [`Response`]s. Only transport failures
//! (unreachable host, timeout, malformed request) surface as [`NetError`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use thiserror::Error;
use url::Url;

pub mod loader;

pub use loader::{HttpFetcher, LoaderConfig};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    SameOrigin,
    /// Subresource load (script, image, style).
    #[default]
    NoCors,
    Cors,
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a request with an arbitrary method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::default(),
            timeout: None,
        }
    }

    /// Create a GET subresource request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a GET top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).mode(RequestMode::Navigate)
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(body);
        request
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the request mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Create an empty response.
    pub fn new(url: Url, status: StatusCode) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Parsed `Content-Type` header.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// Something that can perform a live network fetch.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}
