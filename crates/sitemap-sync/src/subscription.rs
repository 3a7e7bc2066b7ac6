//! Long-polling lifecycle of a single page.
//!
//! A subscription issues at most one page request at a time. Every response
//! or failure is handled by issuing the next request, so a page stays live
//! until it is paused or cancelled. On servers with event support the
//! long-poll half is replaced by a server-sent event stream once the first
//! plain fetch has completed.

use std::time::Duration;

use tracing::{debug, trace, warn};
use url::Url;

use crate::error::SyncError;
use crate::events::{parse_event, SitemapEvent, WidgetEvent};
use crate::http::{
    same_client, ClientHandle, PageRequest, PageResponse, HEADER_FRAMEWORK, HEADER_TRACKING_ID,
    HEADER_TRANSPORT,
};
use crate::model::{find_widget, replace_widget, Widget};
use crate::registry::{InFlight, RequestId, Shared};
use crate::server::{ResponseFormat, ServerProperties};
use crate::source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Created or paused; no request outstanding.
    Idle,
    /// A plain fetch is outstanding.
    Loading,
    /// Following the page through long-polling or server-sent events.
    LongPolling,
    /// Evicted from the registry. Terminal.
    Cancelled,
}

/// Sitemap and page id addressed by the event stream of a page.
struct PageEvents {
    sitemap: String,
    page_id: String,
    stream: Option<InFlight>,
}

pub struct PageSubscription {
    url: String,
    client: ClientHandle,
    long_polling: bool,
    cancelled: bool,
    tracking_id: Option<String>,
    title: Option<String>,
    widgets: Option<Vec<Widget>>,
    request: Option<InFlight>,
    events: Option<PageEvents>,
}

impl PageSubscription {
    pub(crate) fn new(url: &str, client: ClientHandle, server: &ServerProperties) -> Self {
        let events = if server.sse {
            event_target(url).map(|(sitemap, page_id)| {
                debug!(%url, %sitemap, %page_id, "page will follow server-sent events");
                PageEvents {
                    sitemap,
                    page_id,
                    stream: None,
                }
            })
        } else {
            None
        };
        Self {
            url: url.to_string(),
            client,
            long_polling: false,
            cancelled: false,
            tracking_id: None,
            title: None,
            widgets: None,
            request: None,
            events,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SubscriptionState {
        if self.cancelled {
            SubscriptionState::Cancelled
        } else if self.long_polling {
            SubscriptionState::LongPolling
        } else if self.request.is_some() {
            SubscriptionState::Loading
        } else {
            SubscriptionState::Idle
        }
    }

    /// Continuation token sent with the next long-poll request.
    pub fn tracking_id(&self) -> Option<&str> {
        self.tracking_id.as_deref()
    }

    pub fn last_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn last_widgets(&self) -> Option<&[Widget]> {
        self.widgets.as_deref()
    }

    pub fn has_request_in_flight(&self) -> bool {
        self.request.is_some()
    }

    pub fn follows_events(&self) -> bool {
        self.events.is_some()
    }

    pub(crate) fn execute(&mut self, shared: &Shared) {
        self.load(shared, Duration::ZERO);
    }

    /// Re-emits the cached page, or discards it and fetches from scratch.
    pub(crate) fn trigger_update(&mut self, shared: &Shared, force_reload: bool) {
        debug!(url = %self.url, force_reload, "trigger update");
        if force_reload {
            self.long_polling = false;
            self.load(shared, Duration::ZERO);
        } else if let Some(widgets) = &self.widgets {
            shared
                .listener
                .on_page_updated(&self.url, self.title.as_deref(), widgets);
        }
    }

    /// Stores the new client; returns whether it is a different instance.
    pub(crate) fn update_client(&mut self, client: ClientHandle) -> bool {
        let changed = !same_client(&self.client, &client);
        self.client = client;
        changed
    }

    /// Stops all traffic. The subscription can be executed again.
    pub(crate) fn pause(&mut self) {
        self.request = None;
        if let Some(events) = self.events.as_mut() {
            events.stream = None;
        }
        self.long_polling = false;
    }

    /// Stops all traffic for good; later executes are ignored.
    pub(crate) fn cancel(&mut self) {
        debug!(url = %self.url, "cancelling subscription");
        self.pause();
        self.cancelled = true;
    }

    fn load(&mut self, shared: &Shared, delay: Duration) {
        if self.cancelled {
            trace!(url = %self.url, "ignoring load of cancelled subscription");
            return;
        }
        if self.events.is_some() && self.long_polling {
            // updates arrive as events
            self.request = None;
            return;
        }

        debug!(url = %self.url, long_polling = self.long_polling, "loading page");
        let request = self.build_request(shared);
        // replacing the handle aborts any request still outstanding
        self.request = Some(
            shared
                .dispatcher
                .fetch(&self.url, self.client.clone(), request, delay),
        );
        self.connect_events(shared, Duration::ZERO);
    }

    fn build_request(&mut self, shared: &Shared) -> PageRequest {
        let mut headers = Vec::with_capacity(4);
        if shared.server.response_format() == ResponseFormat::Xml {
            headers.push(("Accept".to_string(), "application/xml".to_string()));
        }
        if self.long_polling {
            headers.push((HEADER_TRANSPORT.to_string(), "long-polling".to_string()));
        } else {
            self.tracking_id = None;
        }
        headers.push((HEADER_FRAMEWORK.to_string(), "1.0".to_string()));
        headers.push((
            HEADER_TRACKING_ID.to_string(),
            self.tracking_id.clone().unwrap_or_else(|| "0".to_string()),
        ));
        PageRequest {
            url: with_query(&self.url, "includeHidden", "true"),
            headers,
            timeout: shared.config.request_timeout(self.long_polling),
        }
    }

    fn connect_events(&mut self, shared: &Shared, delay: Duration) {
        if let Some(events) = self.events.as_mut() {
            events.stream = Some(shared.dispatcher.open_events(
                &self.url,
                self.client.clone(),
                &events.sitemap,
                &events.page_id,
                delay,
            ));
        }
    }

    pub(crate) fn handle_page_result(
        &mut self,
        shared: &Shared,
        request: RequestId,
        result: Result<PageResponse, SyncError>,
    ) {
        if !self.request.as_ref().is_some_and(|current| current.id() == request) {
            trace!(url = %self.url, ?request, "dropping stale page response");
            return;
        }
        self.request = None;

        match result {
            Ok(response) => self.handle_response(shared, response),
            Err(err) => {
                debug!(url = %self.url, error = %err, network = err.is_network(), "page load failed, retrying");
                self.tracking_id = None;
                self.long_polling = false;
                self.load(shared, shared.config.retry_delay);
            }
        }
    }

    fn handle_response(&mut self, shared: &Shared, response: PageResponse) {
        if let Some(id) = response.tracking_id {
            self.tracking_id = Some(id);
        }

        if response.body.is_empty() {
            debug!(url = %self.url, "empty page response");
            self.long_polling = true;
            self.load(shared, Duration::ZERO);
            return;
        }

        let page = match source::parse(
            &response.body,
            shared.server.response_format(),
            shared.server.icon_format,
        ) {
            Ok(page) => page,
            Err(err) => {
                debug!(url = %self.url, error = %err, "parsing page failed");
                self.long_polling = false;
                self.load(shared, shared.config.retry_delay);
                return;
            }
        };

        if page.server_timeout && self.long_polling {
            debug!(url = %self.url, "long-poll timeout");
            self.load(shared, Duration::ZERO);
            return;
        }

        debug!(url = %self.url, widgets = page.widgets.len(), "updated page data");
        if shared.config.detailed_logging {
            for (index, widget) in page.flattened().iter().enumerate() {
                debug!(url = %self.url, "widget {}: {:?}", index + 1, widget);
            }
        }
        self.long_polling = true;
        self.title = page.title;
        let widgets = self.widgets.insert(page.widgets);
        shared
            .listener
            .on_page_updated(&self.url, self.title.as_deref(), widgets);
        self.load(shared, Duration::ZERO);
    }

    fn is_current_stream(&self, request: RequestId) -> bool {
        self.events
            .as_ref()
            .and_then(|events| events.stream.as_ref())
            .is_some_and(|stream| stream.id() == request)
    }

    pub(crate) fn handle_event(&mut self, shared: &Shared, request: RequestId, payload: &str) {
        if !self.is_current_stream(request) {
            trace!(url = %self.url, ?request, "dropping event from stale stream");
            return;
        }
        match parse_event(payload) {
            Ok(SitemapEvent::SitemapChanged { sitemap, page }) => {
                debug!(url = %self.url, ?sitemap, ?page, "sitemap changed, reloading");
                self.reload(shared);
            }
            Ok(SitemapEvent::Alive) => trace!(url = %self.url, "server alive"),
            Ok(SitemapEvent::Widget(event)) => self.apply_widget_event(shared, event),
            Err(err) => warn!(url = %self.url, error = %err, %payload, "could not parse event"),
        }
    }

    fn apply_widget_event(&mut self, shared: &Shared, event: WidgetEvent) {
        let page_id = self
            .events
            .as_ref()
            .map(|events| events.page_id.as_str())
            .unwrap_or_default();
        if event.targets_page(page_id) {
            match event.label {
                Some(title) => {
                    shared.listener.on_page_title_updated(&self.url, &title);
                    self.title = Some(title);
                }
                None => warn!(url = %self.url, "page event without title"),
            }
            return;
        }

        let known = self
            .widgets
            .as_deref()
            .and_then(|widgets| find_widget(widgets, &event.widget_id));
        if let Some(widget) = known {
            // older servers send trigger item data on visibility changes
            let visibility = event.visibility.unwrap_or(true);
            if shared.server.invisible_widgets || visibility == widget.visibility {
                let updated = widget.update_from_event(&event, shared.server.icon_format);
                if let Some(widgets) = self.widgets.as_mut() {
                    replace_widget(widgets, &updated);
                }
                shared.listener.on_widget_updated(&self.url, &updated);
                return;
            }
        }

        debug!(url = %self.url, widget = %event.widget_id, "cannot apply widget event, reloading");
        self.reload(shared);
    }

    fn reload(&mut self, shared: &Shared) {
        self.pause();
        self.load(shared, Duration::ZERO);
    }

    pub(crate) fn handle_event_failure(&mut self, shared: &Shared, request: RequestId, error: SyncError) {
        if !self.is_current_stream(request) {
            trace!(url = %self.url, ?request, "dropping failure of stale stream");
            return;
        }
        if let SyncError::EventsUnsupported(reason) = &error {
            warn!(url = %self.url, %reason, "server-sent events unavailable, using long polling");
            self.events = None;
            if self.long_polling {
                self.load(shared, Duration::ZERO);
            }
        } else {
            warn!(url = %self.url, %error, "event stream failed, reconnecting");
            self.connect_events(shared, shared.config.retry_delay);
        }
    }
}

/// Sitemap name and page id are the last two path segments of a page url.
fn event_target(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [_, .., sitemap, page] => Some((sitemap.to_string(), page.to_string())),
        _ => None,
    }
}

fn with_query(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{key}={value}")
}
