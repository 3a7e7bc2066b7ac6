//! Reconciles the set of visible pages with live page subscriptions.
//!
//! The registry is plain synchronous state. Requests run as tokio tasks and
//! report back as [`Completion`] values over a channel; whoever owns the
//! registry feeds them to [`SubscriptionRegistry::handle_completion`] one at a
//! time. [`crate::engine::SyncEngine`] does this on a dedicated task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::http::{ClientHandle, PageRequest, PageResponse};
use crate::listener::PageListener;
use crate::server::ServerProperties;
use crate::subscription::PageSubscription;

/// Identifies one issued request or event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Outcome of background network work, addressed to a page subscription.
#[derive(Debug)]
pub enum Completion {
    Page {
        url: String,
        request: RequestId,
        result: Result<PageResponse, SyncError>,
    },
    Event {
        url: String,
        request: RequestId,
        payload: String,
    },
    EventFailure {
        url: String,
        request: RequestId,
        error: SyncError,
    },
}

impl Completion {
    pub fn url(&self) -> &str {
        match self {
            Completion::Page { url, .. }
            | Completion::Event { url, .. }
            | Completion::EventFailure { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The consumer is recreated right away; connections stay up.
    Reconfiguring,
    /// Suspend every subscription until the next start.
    Shutdown,
}

/// Handle of a spawned request. Dropping it aborts the request.
pub(crate) struct InFlight {
    id: RequestId,
    task: JoinHandle<()>,
}

impl InFlight {
    pub(crate) fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns network work and routes its results back as completions.
pub(crate) struct Dispatcher {
    completions: UnboundedSender<Completion>,
    next_id: AtomicU64,
}

impl Dispatcher {
    fn new(completions: UnboundedSender<Completion>) -> Self {
        Self {
            completions,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn fetch(
        &self,
        url: &str,
        client: ClientHandle,
        request: PageRequest,
        delay: Duration,
    ) -> InFlight {
        let id = self.next_id();
        let tx = self.completions.clone();
        let url = url.to_string();
        trace!(%url, request = id.0, target_url = %request.url, "issuing page request");
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = client.get(request).await;
            let _ = tx.send(Completion::Page {
                url,
                request: id,
                result,
            });
        });
        InFlight { id, task }
    }

    pub(crate) fn open_events(
        &self,
        url: &str,
        client: ClientHandle,
        sitemap: &str,
        page_id: &str,
        delay: Duration,
    ) -> InFlight {
        let id = self.next_id();
        let tx = self.completions.clone();
        let url = url.to_string();
        let sitemap = sitemap.to_string();
        let page_id = page_id.to_string();
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut stream = match client.subscribe_events(&sitemap, &page_id).await {
                Ok(stream) => stream,
                Err(error) => {
                    let _ = tx.send(Completion::EventFailure {
                        url,
                        request: id,
                        error,
                    });
                    return;
                }
            };
            while let Some(item) = stream.next().await {
                match item {
                    Ok(payload) => {
                        let event = Completion::Event {
                            url: url.clone(),
                            request: id,
                            payload,
                        };
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(Completion::EventFailure {
                            url,
                            request: id,
                            error,
                        });
                        return;
                    }
                }
            }
            let _ = tx.send(Completion::EventFailure {
                url,
                request: id,
                error: SyncError::EventStream("stream closed by server".into()),
            });
        });
        InFlight { id, task }
    }
}

/// State every subscription callback needs besides its own.
pub(crate) struct Shared {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) listener: Arc<dyn PageListener>,
    pub(crate) config: SyncConfig,
    pub(crate) server: ServerProperties,
}

pub struct SubscriptionRegistry {
    subscriptions: HashMap<String, PageSubscription>,
    shared: Shared,
    started: bool,
}

impl SubscriptionRegistry {
    /// Must be used from within a tokio runtime; requests are spawned onto it.
    pub fn new(
        server: ServerProperties,
        listener: Arc<dyn PageListener>,
        completions: UnboundedSender<Completion>,
        config: SyncConfig,
    ) -> Self {
        Self {
            subscriptions: HashMap::new(),
            shared: Shared {
                dispatcher: Dispatcher::new(completions),
                listener,
                config,
                server,
            },
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn server(&self) -> &ServerProperties {
        &self.shared.server
    }

    pub fn set_listener(&mut self, listener: Arc<dyn PageListener>) {
        self.shared.listener = listener;
    }

    /// Sorted urls of all tracked pages.
    pub fn tracked_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.subscriptions.keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn subscription(&self, url: &str) -> Option<&PageSubscription> {
        self.subscriptions.get(url)
    }

    /// Tracks exactly `urls`. Pages no longer listed are cancelled, new ones are
    /// created and, once started, executed. Without a client nothing is tracked.
    pub fn update_active_connections(&mut self, urls: &[String], client: Option<ClientHandle>) {
        debug!(?urls, has_client = client.is_some(), "updating active connections");
        let Some(client) = client else {
            self.cancel_all();
            return;
        };

        let stale: Vec<String> = self
            .subscriptions
            .keys()
            .filter(|url| !urls.contains(*url))
            .cloned()
            .collect();
        for url in stale {
            if let Some(mut subscription) = self.subscriptions.remove(&url) {
                subscription.cancel();
            }
        }

        for url in urls {
            match self.subscriptions.get_mut(url) {
                Some(subscription) => {
                    if subscription.update_client(client.clone()) && self.started {
                        debug!(%url, "client changed, reloading");
                        subscription.trigger_update(&self.shared, true);
                    }
                }
                None => {
                    debug!(%url, "creating subscription");
                    let mut subscription =
                        PageSubscription::new(url, client.clone(), &self.shared.server);
                    if self.started {
                        subscription.execute(&self.shared);
                    }
                    self.subscriptions.insert(url.clone(), subscription);
                }
            }
        }
    }

    pub fn start(&mut self) {
        debug!(started = self.started, tracked = self.subscriptions.len(), "start");
        if self.started {
            return;
        }
        for subscription in self.subscriptions.values_mut() {
            subscription.execute(&self.shared);
        }
        self.started = true;
    }

    pub fn stop(&mut self, reason: StopReason) {
        debug!(?reason, "stop");
        match reason {
            StopReason::Reconfiguring => {}
            StopReason::Shutdown => {
                for subscription in self.subscriptions.values_mut() {
                    subscription.pause();
                }
                self.started = false;
            }
        }
    }

    pub fn trigger_update(&mut self, url: &str, force_reload: bool) {
        match self.subscriptions.get_mut(url) {
            Some(subscription) => subscription.trigger_update(&self.shared, force_reload),
            None => trace!(%url, "trigger update for untracked page"),
        }
    }

    pub fn handle_completion(&mut self, completion: Completion) {
        let Some(subscription) = self.subscriptions.get_mut(completion.url()) else {
            trace!(url = %completion.url(), "completion for untracked page");
            return;
        };
        match completion {
            Completion::Page { request, result, .. } => {
                subscription.handle_page_result(&self.shared, request, result)
            }
            Completion::Event {
                request, payload, ..
            } => subscription.handle_event(&self.shared, request, &payload),
            Completion::EventFailure { request, error, .. } => {
                subscription.handle_event_failure(&self.shared, request, error)
            }
        }
    }

    /// Cancels and forgets every subscription and leaves the started state.
    pub fn teardown(&mut self) {
        self.cancel_all();
        self.started = false;
    }

    fn cancel_all(&mut self) {
        for (_, mut subscription) in self.subscriptions.drain() {
            subscription.cancel();
        }
    }
}
