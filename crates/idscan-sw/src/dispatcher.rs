//! Event dispatcher.
//!
//! Plays the part of the browser's worker event loop. Lifecycle events are
//! handled one at a time in arrival order; each fetch runs in its own task
//! so a slow network request never holds up other fetches. A panicking
//! fetch handler is reported to its caller as
//! [`ServiceWorkerError::HandlerPanicked`]; the dispatcher keeps running.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use idscan_net::Request;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::proxy::{ActivationReport, FetchOutcome, OfflineProxy, SeedOutcome, SyncOutcome};
use crate::ServiceWorkerError;

/// Events delivered to the worker.
#[derive(Debug, Clone)]
pub enum ServiceWorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Push { payload: Option<Bytes> },
}

impl ServiceWorkerEvent {
    fn kind(&self) -> &'static str {
        match self {
            ServiceWorkerEvent::Install => "install",
            ServiceWorkerEvent::Activate => "activate",
            ServiceWorkerEvent::Fetch(_) => "fetch",
            ServiceWorkerEvent::Sync { .. } => "sync",
            ServiceWorkerEvent::Push { .. } => "push",
        }
    }
}

/// Completion value of a handled event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(SeedOutcome),
    Activated(ActivationReport),
    Fetched(FetchOutcome),
    Synced(SyncOutcome),
    Pushed,
}

type Reply = oneshot::Sender<Result<EventOutcome, ServiceWorkerError>>;

struct Envelope {
    event: ServiceWorkerEvent,
    reply: Reply,
}

/// Sends events to a running dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl DispatcherHandle {
    /// Deliver an event and wait for its handler to finish.
    pub async fn dispatch(
        &self,
        event: ServiceWorkerEvent,
    ) -> Result<EventOutcome, ServiceWorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { event, reply })
            .map_err(|_| ServiceWorkerError::DispatcherClosed)?;
        rx.await.map_err(|_| ServiceWorkerError::DispatcherClosed)?
    }

    pub async fn install(&self) -> Result<SeedOutcome, ServiceWorkerError> {
        match self.dispatch(ServiceWorkerEvent::Install).await? {
            EventOutcome::Installed(outcome) => Ok(outcome),
            other => Err(unexpected("install", &other)),
        }
    }

    pub async fn activate(&self) -> Result<ActivationReport, ServiceWorkerError> {
        match self.dispatch(ServiceWorkerEvent::Activate).await? {
            EventOutcome::Activated(report) => Ok(report),
            other => Err(unexpected("activate", &other)),
        }
    }

    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome, ServiceWorkerError> {
        match self.dispatch(ServiceWorkerEvent::Fetch(request)).await? {
            EventOutcome::Fetched(outcome) => Ok(outcome),
            other => Err(unexpected("fetch", &other)),
        }
    }

    pub async fn sync(&self, tag: impl Into<String>) -> Result<SyncOutcome, ServiceWorkerError> {
        match self.dispatch(ServiceWorkerEvent::Sync { tag: tag.into() }).await? {
            EventOutcome::Synced(outcome) => Ok(outcome),
            other => Err(unexpected("sync", &other)),
        }
    }

    pub async fn push(&self, payload: Option<Bytes>) -> Result<(), ServiceWorkerError> {
        match self.dispatch(ServiceWorkerEvent::Push { payload }).await? {
            EventOutcome::Pushed => Ok(()),
            other => Err(unexpected("push", &other)),
        }
    }
}

fn unexpected(event: &str, outcome: &EventOutcome) -> ServiceWorkerError {
    ServiceWorkerError::StateError(format!("{} event produced {:?}", event, outcome))
}

/// Start the dispatcher task for `proxy`.
///
/// The task exits once every handle is dropped and in-flight fetches finish.
pub fn spawn_dispatcher(proxy: Arc<OfflineProxy>) -> (DispatcherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(proxy, rx));
    (DispatcherHandle { tx }, task)
}

async fn run(proxy: Arc<OfflineProxy>, mut rx: mpsc::UnboundedReceiver<Envelope>) {
    let mut fetches = JoinSet::new();
    info!(cache = %proxy.cache_name(), "Dispatcher started");

    while let Some(Envelope { event, reply }) = rx.recv().await {
        while fetches.try_join_next().is_some() {}
        debug!(event = event.kind(), "Dispatching");

        let result = match event {
            ServiceWorkerEvent::Fetch(request) => {
                let proxy = Arc::clone(&proxy);
                fetches.spawn(async move {
                    let result = AssertUnwindSafe(proxy.handle_fetch(&request))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            error!(url = %request.url, "Fetch handler panicked");
                            Err(ServiceWorkerError::HandlerPanicked("fetch"))
                        })
                        .map(EventOutcome::Fetched);
                    let _ = reply.send(result);
                });
                continue;
            }
            ServiceWorkerEvent::Install => proxy.install().await.map(EventOutcome::Installed),
            ServiceWorkerEvent::Activate => proxy.activate().await.map(EventOutcome::Activated),
            ServiceWorkerEvent::Sync { tag } => Ok(EventOutcome::Synced(proxy.handle_sync(&tag).await)),
            ServiceWorkerEvent::Push { payload } => {
                proxy.handle_push(payload).await.map(|()| EventOutcome::Pushed)
            }
        };

        let _ = reply.send(result);
    }

    while fetches.join_next().await.is_some() {}
    info!("Dispatcher stopped");
}
