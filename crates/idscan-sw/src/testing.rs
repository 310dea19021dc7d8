//! Test doubles for the proxy's collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{header, HeaderValue, StatusCode};
use idscan_net::{Fetcher, NetError, Request, Response};
use url::Url;

use crate::cache::{CacheEntry, CacheError, CacheStore, MemoryCacheStore};
use crate::notification::{NotificationOptions, Notifier};
use crate::ServiceWorkerError;

/// Serves canned responses; every other URL is unreachable.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<Url, Response>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// No URL is reachable.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        let url = Url::parse(url).unwrap();
        let response = Response::new(url.clone(), StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))
            .with_body(body.to_string());
        self.pages.insert(url, response);
        self
    }

    pub fn with_status(mut self, url: &str, status: StatusCode) -> Self {
        let url = Url::parse(url).unwrap();
        self.pages.insert(url.clone(), Response::new(url, status));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(&request.url)
            .cloned()
            .ok_or_else(|| NetError::Unreachable(request.url.to_string()))
    }
}

/// Remembers every notification shown.
#[derive(Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<(String, NotificationOptions)>>,
}

impl RecordingNotifier {
    pub fn shown(&self) -> Vec<(String, NotificationOptions)> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<(), ServiceWorkerError> {
        self.shown.lock().unwrap().push((title.to_string(), options));
        Ok(())
    }
}

/// Memory store whose delete fails for one bucket.
pub struct FlakyDeleteStore {
    inner: MemoryCacheStore,
    refuse: String,
}

impl FlakyDeleteStore {
    pub fn new(inner: MemoryCacheStore, refuse: &str) -> Self {
        Self {
            inner,
            refuse: refuse.to_string(),
        }
    }
}

#[async_trait]
impl CacheStore for FlakyDeleteStore {
    async fn open(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.open(name).await
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.inner.put(name, entry).await
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<CacheEntry>, CacheError> {
        self.inner.match_request(name, request).await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        if name == self.refuse {
            return Err(CacheError::Backend("delete refused".to_string()));
        }
        self.inner.delete(name).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<Url>, CacheError> {
        self.inner.entries(name).await
    }
}

/// Memory store that counts reads and writes.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryCacheStore,
    matches: AtomicUsize,
    puts: AtomicUsize,
}

impl CountingStore {
    pub fn matches(&self) -> usize {
        self.matches.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn open(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.open(name).await
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(name, entry).await
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<CacheEntry>, CacheError> {
        self.matches.fetch_add(1, Ordering::SeqCst);
        self.inner.match_request(name, request).await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.delete(name).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<Url>, CacheError> {
        self.inner.entries(name).await
    }
}

/// Fetcher whose every call panics.
pub struct PanickingFetcher;

#[async_trait]
impl Fetcher for PanickingFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        panic!("fetch of {} blew up", request.url);
    }
}
