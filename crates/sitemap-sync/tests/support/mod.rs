#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as stream_mpsc;
use futures::StreamExt;
use sitemap_sync::http::EventStream;
use sitemap_sync::{
    ClientHandle, Completion, PageClient, PageEvent, PageRequest, PageResponse, ServerProperties,
    SubscriptionRegistry, SyncConfig, SyncError, SyncResult,
};
use tokio::sync::{mpsc, oneshot};

pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(100);

/// A request the engine issued and the test has to answer.
pub struct PendingRequest {
    pub request: PageRequest,
    reply: oneshot::Sender<SyncResult<PageResponse>>,
}

impl PendingRequest {
    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn is_long_poll(&self) -> bool {
        self.header("X-Atmosphere-Transport") == Some("long-polling")
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.header("X-Atmosphere-tracking-id")
    }

    pub fn respond(self, body: &str, tracking_id: Option<&str>) {
        let _ = self.reply.send(Ok(PageResponse {
            body: body.to_string(),
            tracking_id: tracking_id.map(str::to_string),
        }));
    }

    pub fn fail(self, error: SyncError) {
        let _ = self.reply.send(Err(error));
    }

    /// Waits until the engine dropped this request.
    pub async fn cancelled(&mut self) -> bool {
        tokio::time::timeout(WAIT, self.reply.closed()).await.is_ok()
    }

    pub async fn still_open(&mut self) -> bool {
        tokio::time::timeout(QUIET, self.reply.closed()).await.is_err()
    }
}

/// An event stream the engine opened.
pub struct EventSubscription {
    pub sitemap: String,
    pub page_id: String,
    sender: stream_mpsc::UnboundedSender<SyncResult<String>>,
}

impl EventSubscription {
    pub fn push(&self, payload: &str) {
        self.sender
            .unbounded_send(Ok(payload.to_string()))
            .expect("event stream open");
    }

    pub fn fail(&self, message: &str) {
        self.sender
            .unbounded_send(Err(SyncError::EventStream(message.to_string())))
            .expect("event stream open");
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub struct ScriptedClient {
    requests: mpsc::UnboundedSender<PendingRequest>,
    events: Option<mpsc::UnboundedSender<EventSubscription>>,
}

#[async_trait]
impl PageClient for ScriptedClient {
    async fn get(&self, request: PageRequest) -> SyncResult<PageResponse> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(PendingRequest { request, reply })
            .map_err(|_| SyncError::Cancelled)?;
        rx.await.map_err(|_| SyncError::Cancelled)?
    }

    async fn subscribe_events(&self, sitemap: &str, page_id: &str) -> SyncResult<EventStream> {
        let Some(events) = &self.events else {
            return Err(SyncError::EventsUnsupported("subscribe returned 404".into()));
        };
        let (sender, receiver) = stream_mpsc::unbounded();
        events
            .send(EventSubscription {
                sitemap: sitemap.to_string(),
                page_id: page_id.to_string(),
                sender,
            })
            .map_err(|_| SyncError::Cancelled)?;
        Ok(receiver.boxed())
    }
}

/// Receiving ends of a scripted client.
pub struct Script {
    pub requests: mpsc::UnboundedReceiver<PendingRequest>,
    pub events: mpsc::UnboundedReceiver<EventSubscription>,
}

impl Script {
    pub async fn next_request(&mut self) -> PendingRequest {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("request timeout")
            .expect("client alive")
    }

    /// True when no request arrives within a short quiet period.
    pub async fn no_request(&mut self) -> bool {
        tokio::time::timeout(QUIET, self.requests.recv()).await.is_err()
    }

    pub async fn next_subscription(&mut self) -> EventSubscription {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("event subscription timeout")
            .expect("client alive")
    }
}

pub fn scripted_client(with_events: bool) -> (ClientHandle, Script) {
    let (request_tx, requests) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let client = ScriptedClient {
        requests: request_tx,
        events: with_events.then_some(event_tx),
    };
    (Arc::new(client), Script { requests, events })
}

/// Registry driven by hand: completions are applied only when the test pumps.
pub struct Harness {
    pub registry: SubscriptionRegistry,
    pub client: ClientHandle,
    pub script: Script,
    pub pages: mpsc::UnboundedReceiver<PageEvent>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl Harness {
    pub fn new(server: ServerProperties) -> Self {
        Self::with_events(server, false)
    }

    pub fn with_events(server: ServerProperties, with_events: bool) -> Self {
        let (client, script) = scripted_client(with_events);
        let (page_tx, pages) = mpsc::unbounded_channel();
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let registry =
            SubscriptionRegistry::new(server, Arc::new(page_tx), completion_tx, SyncConfig::default());
        Self {
            registry,
            client,
            script,
            pages,
            completions,
        }
    }

    pub fn track(&mut self, urls: &[&str]) {
        let urls: Vec<String> = urls.iter().map(|url| url.to_string()).collect();
        self.registry
            .update_active_connections(&urls, Some(self.client.clone()));
    }

    /// Applies the next completion to the registry.
    pub async fn pump(&mut self) {
        let completion = tokio::time::timeout(WAIT, self.completions.recv())
            .await
            .expect("completion timeout")
            .expect("dispatcher alive");
        self.registry.handle_completion(completion);
    }

    pub async fn answer(&mut self, body: &str, tracking_id: Option<&str>) -> PendingRequest {
        let pending = self.script.next_request().await;
        let url = pending.url().to_string();
        pending.respond(body, tracking_id);
        self.pump().await;
        let next = self.script.next_request().await;
        assert_eq!(next.url(), url);
        next
    }

    pub fn page_event(&mut self) -> Option<PageEvent> {
        self.pages.try_recv().ok()
    }
}

pub const KITCHEN_PAGE: &str = r#"{
    "id": "kitchen",
    "title": "Kitchen",
    "widgets": [
        {"widgetId": "00", "type": "Frame", "label": "",
         "widgets": [
            {"widgetId": "0000", "type": "Switch", "label": "Ceiling",
             "item": {"name": "KitchenLight", "type": "SwitchItem", "state": "OFF"}}
         ]},
        {"widgetId": "01", "type": "Text", "label": "Temperature [21 °C]"}
    ]
}"#;
