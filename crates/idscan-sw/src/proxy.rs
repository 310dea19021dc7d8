//! The offline cache proxy and its event handlers.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use http::Method;
use idscan_net::{Fetcher, Request, Response};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheStore};
use crate::config::ProxyConfig;
use crate::lifecycle::{Client, Clients, ServiceWorkerRegistration};
use crate::notification::{NotificationOptions, Notifier};
use crate::offline::offline_response;
use crate::ServiceWorkerError;

/// Result of seeding the bucket during install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    FullySeeded,
    /// Install still succeeded; these seeds are absent from the bucket.
    PartiallySeeded { missing: Vec<Url> },
}

impl SeedOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, SeedOutcome::FullySeeded)
    }
}

/// A stale bucket that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleCacheFailure {
    pub name: String,
    pub error: String,
}

/// What activation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale buckets removed.
    pub deleted: Vec<String>,
    /// Stale buckets whose deletion failed.
    pub failed: Vec<StaleCacheFailure>,
    /// Clients that switched to this worker.
    pub clients_claimed: usize,
}

/// Where a fetch response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    OfflineFallback,
}

/// A response produced by the fetch handler.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

/// Fetch handler decision.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not handled; the host performs its default network fetch.
    Passthrough,
    Respond(FetchResponse),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Respond(r) => Some(r),
        }
    }
}

/// Sync handler decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Handled,
    Ignored,
}

/// Mediates between page requests, the versioned bucket and the network.
pub struct OfflineProxy {
    config: ProxyConfig,
    cache_name: String,
    caches: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    registration: RwLock<ServiceWorkerRegistration>,
    clients: RwLock<Clients>,
}

impl OfflineProxy {
    pub fn new(
        config: ProxyConfig,
        caches: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ServiceWorkerError> {
        config.validate()?;
        let registration = ServiceWorkerRegistration::new();

        Ok(Self {
            cache_name: config.cache_name(),
            config,
            caches,
            fetcher,
            notifier,
            registration: RwLock::new(registration),
            clients: RwLock::new(Clients::new()),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Name of the authoritative bucket.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn caches(&self) -> &Arc<dyn CacheStore> {
        &self.caches
    }

    pub fn registration(&self) -> &RwLock<ServiceWorkerRegistration> {
        &self.registration
    }

    pub fn clients(&self) -> &RwLock<Clients> {
        &self.clients
    }

    /// Track a newly opened application window.
    pub async fn open_client(&self, url: Url) -> Client {
        self.clients.write().await.open_window(url)
    }

    /// Install: open the bucket and store every reachable seed.
    ///
    /// Never fails because of the network or the store; unreachable seeds
    /// are reported in [`SeedOutcome::PartiallySeeded`].
    pub async fn install(&self) -> Result<SeedOutcome, ServiceWorkerError> {
        let seeds = self.config.seed_urls()?;
        let worker = self
            .registration
            .write()
            .await
            .begin_install(self.config.script_url()?);
        debug!(?worker, cache = %self.cache_name, "Installing");

        let outcome = match self.caches.open(&self.cache_name).await {
            Ok(created) => {
                info!(cache = %self.cache_name, created, "Opened cache");
                self.seed(seeds).await
            }
            Err(e) => {
                warn!(cache = %self.cache_name, error = %e, "Cache open failed");
                SeedOutcome::PartiallySeeded { missing: seeds }
            }
        };

        if let SeedOutcome::PartiallySeeded { ref missing } = outcome {
            warn!(
                cache = %self.cache_name,
                missing = missing.len(),
                "Cache seeding incomplete, continuing install"
            );
        }

        let mut registration = self.registration.write().await;
        registration.install_complete()?;
        registration.skip_waiting();

        Ok(outcome)
    }

    async fn seed(&self, seeds: Vec<Url>) -> SeedOutcome {
        let results = join_all(seeds.into_iter().map(|url| async move {
            let stored = self.store_seed(&url).await;
            (url, stored)
        }))
        .await;

        let missing: Vec<Url> = results
            .into_iter()
            .filter_map(|(url, stored)| (!stored).then_some(url))
            .collect();

        if missing.is_empty() {
            SeedOutcome::FullySeeded
        } else {
            SeedOutcome::PartiallySeeded { missing }
        }
    }

    async fn store_seed(&self, url: &Url) -> bool {
        let request = Request::get(url.clone());
        let response = match self.fetcher.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "Seed fetch failed");
                return false;
            }
        };

        if !response.ok() {
            warn!(%url, status = %response.status, "Seed returned non-success status");
            return false;
        }

        let entry = CacheEntry::from_response(&request, &response);
        match self.caches.put(&self.cache_name, entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%url, error = %e, "Seed store failed");
                false
            }
        }
    }

    /// Activate: delete stale buckets and claim every open client.
    ///
    /// Each stale bucket is deleted independently; failures are collected
    /// in the report and do not stop the others.
    pub async fn activate(&self) -> Result<ActivationReport, ServiceWorkerError> {
        let worker = {
            let clients = self.clients.read().await;
            let mut registration = self.registration.write().await;
            let busy = registration
                .active_id()
                .map(|id| clients.controlled_by(id))
                .unwrap_or(0);
            registration.activate(busy)?
        };

        let names = self.caches.keys().await?;
        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| *name != self.cache_name)
            .collect();

        let deletions = join_all(stale.into_iter().map(|name| async move {
            info!(cache = %name, "Deleting old cache");
            let result = self.caches.delete(&name).await;
            (name, result)
        }))
        .await;

        let mut report = ActivationReport::default();
        for (name, result) in deletions {
            match result {
                Ok(true) => report.deleted.push(name),
                Ok(false) => debug!(cache = %name, "Stale cache already gone"),
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete old cache");
                    report.failed.push(StaleCacheFailure {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.clients_claimed = self.clients.write().await.claim(worker);
        info!(
            ?worker,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            claimed = report.clients_claimed,
            "Activated"
        );

        Ok(report)
    }

    /// Fetch: cache, then network, then the offline page for navigations.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, ServiceWorkerError> {
        if request.method != Method::GET {
            debug!(url = %request.url, method = %request.method, "Passing through non-GET request");
            return Ok(FetchOutcome::Passthrough);
        }

        if let Some(entry) = self.caches.match_request(&self.cache_name, request).await? {
            debug!(url = %request.url, "Serving from cache");
            return Ok(FetchOutcome::Respond(FetchResponse {
                response: entry.to_response(),
                source: ResponseSource::Cache,
            }));
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                debug!(url = %request.url, status = %response.status, "Serving from network");
                Ok(FetchOutcome::Respond(FetchResponse {
                    response,
                    source: ResponseSource::Network,
                }))
            }
            Err(e) if request.is_navigation() => {
                info!(url = %request.url, error = %e, "Offline, serving fallback page");
                Ok(FetchOutcome::Respond(FetchResponse {
                    response: offline_response(&request.url, &self.config.app_name),
                    source: ResponseSource::OfflineFallback,
                }))
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Subresource fetch failed");
                Err(e.into())
            }
        }
    }

    /// Sync: acknowledged for the configured tag, ignored otherwise.
    pub async fn handle_sync(&self, tag: &str) -> SyncOutcome {
        if tag == self.config.sync_tag {
            info!(tag, "Background sync triggered");
            SyncOutcome::Handled
        } else {
            debug!(tag, "Ignoring sync tag");
            SyncOutcome::Ignored
        }
    }

    /// Push: show a notification with the payload text or the default body.
    pub async fn handle_push(&self, payload: Option<Bytes>) -> Result<(), ServiceWorkerError> {
        let defaults = &self.config.notification;
        let body = match payload {
            Some(data) => String::from_utf8_lossy(&data).into_owned(),
            None => defaults.body.clone(),
        };

        let options = NotificationOptions {
            body,
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
        };

        self.notifier
            .show_notification(&self.config.app_name, options)
            .await
    }
}
