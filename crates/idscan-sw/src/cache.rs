//! Cache buckets and the store that holds them.
//!
//! A bucket maps a GET request URL to a stored response. Buckets are
//! addressed by name; the proxy only ever writes to the bucket named by
//! the current version.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hashbrown::HashMap;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use idscan_net::{Request, Response};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

/// Errors raised by a [`CacheStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("No cache named '{0}'")]
    NoSuchCache(String),

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(String),

    #[error("Cache backend failure: {0}")]
    Backend(String),
}

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request URL (fragment stripped).
    pub url: Url,

    /// Request method.
    pub method: Method,

    /// Response status.
    pub status: StatusCode,

    /// Response headers exactly as received, repeated names included.
    pub headers: HeaderMap,

    /// Response body.
    pub body: Bytes,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture a network response for `request`.
    pub fn from_response(request: &Request, response: &Response) -> Self {
        Self {
            url: cache_key(&request.url),
            method: request.method.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response from the stored entry.
    pub fn to_response(&self) -> Response {
        Response {
            url: self.url.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Lookup key for a URL. Fragments never reach the network, so they are ignored.
pub fn cache_key(url: &Url) -> Url {
    let mut key = url.clone();
    key.set_fragment(None);
    key
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A single named bucket.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    entries: HashMap<Url, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request. Non-GET requests never match.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        if request.method != Method::GET {
            return None;
        }
        self.entries.get(&cache_key(&request.url))
    }

    /// Store an entry, replacing any previous one for the same URL.
    pub fn put(&mut self, entry: CacheEntry) -> Result<(), CacheError> {
        if entry.method != Method::GET {
            return Err(CacheError::UnsupportedMethod(entry.method.to_string()));
        }
        self.entries.insert(entry.url.clone(), entry);
        Ok(())
    }

    /// Delete entry.
    pub fn delete(&mut self, url: &Url) -> bool {
        self.entries.remove(&cache_key(url)).is_some()
    }

    /// Cached URLs, sorted.
    pub fn keys(&self) -> Vec<Url> {
        let mut keys: Vec<Url> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Named bucket storage (the `caches` global).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a bucket, creating it if missing. Returns `true` if it was created.
    async fn open(&self, name: &str) -> Result<bool, CacheError>;

    /// Store an entry in an existing bucket.
    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Look up a request in one bucket.
    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<CacheEntry>, CacheError>;

    /// Names of all buckets.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a bucket. Returns `true` if it existed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// URLs stored in a bucket.
    async fn entries(&self, name: &str) -> Result<Vec<Url>, CacheError>;
}

/// In-process [`CacheStore`]. Readers never block each other.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: RwLock<HashMap<String, Cache>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, name: &str) -> Result<bool, CacheError> {
        let mut caches = self.caches.write().await;
        if caches.contains_key(name) {
            return Ok(false);
        }
        caches.insert(name.to_string(), Cache::new(name));
        debug!(cache = name, "Created cache");
        Ok(true)
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .get_mut(name)
            .ok_or_else(|| CacheError::NoSuchCache(name.to_string()))?;
        trace!(cache = name, url = %entry.url, "Storing entry");
        cache.put(entry)
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let caches = self.caches.read().await;
        Ok(caches
            .get(name)
            .and_then(|cache| cache.match_request(request))
            .cloned())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn entries(&self, name: &str) -> Result<Vec<Url>, CacheError> {
        self.caches
            .read()
            .await
            .get(name)
            .map(Cache::keys)
            .ok_or_else(|| CacheError::NoSuchCache(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{header, HeaderValue};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn entry_for(s: &str) -> CacheEntry {
        let request = Request::get(url(s));
        let response = Response::new(url(s), StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/css"))
            .with_body("body{}");
        CacheEntry::from_response(&request, &response)
    }

    #[test]
    fn test_cache_match() {
        let mut cache = Cache::new("id-scanner-v1");
        cache.put(entry_for("https://example.com/style.css")).unwrap();

        assert!(cache
            .match_request(&Request::get(url("https://example.com/style.css")))
            .is_some());
        assert!(cache
            .match_request(&Request::get(url("https://example.com/other.css")))
            .is_none());
    }

    #[test]
    fn test_cache_ignores_fragment() {
        let mut cache = Cache::new("v1");
        cache.put(entry_for("https://example.com/index.html")).unwrap();

        let request = Request::navigate(url("https://example.com/index.html#scan"));
        assert!(cache.match_request(&request).is_some());
    }

    #[test]
    fn test_non_get_never_matches() {
        let mut cache = Cache::new("v1");
        cache.put(entry_for("https://example.com/api")).unwrap();

        let post = Request::post(url("https://example.com/api"), Bytes::from_static(b"{}"));
        assert!(cache.match_request(&post).is_none());
    }

    #[test]
    fn test_put_rejects_non_get() {
        let mut cache = Cache::new("v1");
        let mut entry = entry_for("https://example.com/api");
        entry.method = Method::PUT;

        assert_eq!(
            cache.put(entry),
            Err(CacheError::UnsupportedMethod("PUT".to_string()))
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");
        cache.put(entry_for("https://example.com/style.css")).unwrap();

        assert!(cache.delete(&url("https://example.com/style.css")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entry_round_trips_headers() {
        let entry = entry_for("https://example.com/style.css");
        let response = entry.to_response();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type().unwrap().essence_str(), "text/css");
        assert_eq!(&response.body[..], b"body{}");
    }

    #[test]
    fn test_entry_keeps_repeated_and_opaque_headers() {
        let target = url("https://example.com/index.html");
        let mut response = Response::new(target.clone(), StatusCode::OK)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_bytes(b"text/html; charset=\xff").unwrap(),
            )
            .with_body("<h1>ID Scanner</h1>");
        response
            .headers
            .append(header::LINK, HeaderValue::from_static("</app.css>; rel=preload"));
        response
            .headers
            .append(header::LINK, HeaderValue::from_static("</app.js>; rel=preload"));

        let cached = CacheEntry::from_response(&Request::get(target), &response).to_response();

        assert_eq!(cached.headers.get_all(header::LINK).iter().count(), 2);
        assert_eq!(
            cached.headers.get(header::CONTENT_TYPE).unwrap().as_bytes(),
            b"text/html; charset=\xff"
        );
        assert_eq!(cached.headers, response.headers);
    }

    #[tokio::test]
    async fn test_memory_store_open_reuses_bucket() {
        let store = MemoryCacheStore::new();

        assert!(store.open("id-scanner-v1").await.unwrap());
        store
            .put("id-scanner-v1", entry_for("https://example.com/"))
            .await
            .unwrap();
        assert!(!store.open("id-scanner-v1").await.unwrap());

        let entries = store.entries("id-scanner-v1").await.unwrap();
        assert_eq!(entries, vec![url("https://example.com/")]);
    }

    #[tokio::test]
    async fn test_memory_store_put_requires_open() {
        let store = MemoryCacheStore::new();
        let result = store.put("missing", entry_for("https://example.com/")).await;

        assert_eq!(result, Err(CacheError::NoSuchCache("missing".to_string())));
    }

    #[tokio::test]
    async fn test_memory_store_keys_and_delete() {
        let store = MemoryCacheStore::new();
        store.open("id-scanner-v2").await.unwrap();
        store.open("id-scanner-v1").await.unwrap();

        assert_eq!(
            store.keys().await.unwrap(),
            vec!["id-scanner-v1".to_string(), "id-scanner-v2".to_string()]
        );
        assert!(store.delete("id-scanner-v1").await.unwrap());
        assert!(!store.delete("id-scanner-v1").await.unwrap());
        assert_eq!(store.keys().await.unwrap(), vec!["id-scanner-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_store_match_unknown_bucket_is_miss() {
        let store = MemoryCacheStore::new();
        let request = Request::get(url("https://example.com/"));

        assert!(store.match_request("nope", &request).await.unwrap().is_none());
    }
}
