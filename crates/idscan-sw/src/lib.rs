//! # ID Scanner Service Worker
//!
//! Offline cache proxy for the ID Scanner web app.
//!
//! ## Features
//!
//! - **Install**: open the versioned cache bucket and seed the app shell
//! - **Activate**: drop every bucket left behind by older versions, claim clients
//! - **Fetch**: cache first, then network, then an offline page for navigations
//! - **Sync / Push**: acknowledged; push shows a notification
//!
//! ## Architecture
//!
//! ```text
//! DispatcherHandle ──(event, reply)──▶ Dispatcher task
//!                                          │
//!                                          └── OfflineProxy
//!                                                  ├── CacheStore   (buckets)
//!                                                  ├── Fetcher      (network)
//!                                                  ├── Notifier     (push)
//!                                                  ├── ServiceWorkerRegistration
//!                                                  └── Clients
//! ```
//!
//! Install and activate are processed one at a time; fetches run as
//! independent tasks and only ever read the bucket.

use idscan_net::NetError;
use thiserror::Error;

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod lifecycle;
pub mod notification;
pub mod offline;
pub mod proxy;

#[cfg(test)]
mod testing;

pub use cache::{Cache, CacheEntry, CacheError, CacheStore, MemoryCacheStore};
pub use config::{ConfigError, NotificationDefaults, ProxyConfig};
pub use dispatcher::{spawn_dispatcher, DispatcherHandle, EventOutcome, ServiceWorkerEvent};
pub use lifecycle::{
    Client, Clients, ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration,
    ServiceWorkerState,
};
pub use notification::{LogNotifier, NotificationOptions, Notifier};
pub use proxy::{
    ActivationReport, FetchOutcome, FetchResponse, OfflineProxy, ResponseSource, SeedOutcome,
    StaleCacheFailure, SyncOutcome,
};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("The {0} handler panicked")]
    HandlerPanicked(&'static str),

    #[error("Dispatcher is no longer running")]
    DispatcherClosed,
}
