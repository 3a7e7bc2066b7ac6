//! The request-issuing capability the engine consumes.
//!
//! Subscriptions never talk to reqwest directly. They build a [`PageRequest`]
//! and hand it to a [`PageClient`], which is shared read-only between all
//! subscriptions. Swapping the client is done by handing out a different
//! [`ClientHandle`]; identity, not equality, decides whether it changed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

pub const HEADER_TRACKING_ID: &str = "X-Atmosphere-tracking-id";
pub const HEADER_FRAMEWORK: &str = "X-Atmosphere-Framework";
pub const HEADER_TRANSPORT: &str = "X-Atmosphere-Transport";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl PageRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResponse {
    pub body: String,
    /// Value of the `X-Atmosphere-tracking-id` response header.
    pub tracking_id: Option<String>,
}

/// Payloads of one server-sent event subscription.
pub type EventStream = BoxStream<'static, SyncResult<String>>;

#[async_trait]
pub trait PageClient: Send + Sync {
    /// Issues a single GET. Dropping the returned future cancels the request.
    async fn get(&self, request: PageRequest) -> SyncResult<PageResponse>;

    /// Opens the event stream for one page of a sitemap.
    async fn subscribe_events(&self, sitemap: &str, page_id: &str) -> SyncResult<EventStream> {
        let _ = (sitemap, page_id);
        Err(SyncError::EventsUnsupported(
            "client does not support server-sent events".into(),
        ))
    }
}

pub type ClientHandle = Arc<dyn PageClient>;

/// True when both handles point at the same client instance.
pub fn same_client(a: &ClientHandle, b: &ClientHandle) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[derive(Clone)]
pub struct HttpPageClient {
    http: Client,
    base_url: Url,
    credentials: Option<(String, Option<String>)>,
}

#[derive(Debug, Deserialize)]
struct SubscribeResponse {
    status: String,
    context: SubscribeContext,
}

#[derive(Debug, Deserialize)]
struct SubscribeContext {
    headers: SubscribeHeaders,
}

#[derive(Debug, Deserialize)]
struct SubscribeHeaders {
    #[serde(rename = "Location")]
    location: Vec<String>,
}

impl HttpPageClient {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            credentials: None,
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some((username.into(), password));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves relative paths against the server base; absolute urls pass through.
    pub fn resolve(&self, url: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(url)?)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, password.as_deref()),
            None => builder,
        }
    }

    /// Plain GET returning the body of a successful response.
    pub async fn fetch_text(&self, path: &str) -> SyncResult<String> {
        let url = self.resolve(path)?;
        let res = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let res = check_status(res).await?;
        res.text().await.map_err(map_reqwest_error)
    }
}

#[async_trait]
impl PageClient for HttpPageClient {
    async fn get(&self, request: PageRequest) -> SyncResult<PageResponse> {
        let url = self.resolve(&request.url)?;
        let mut builder = self.authorize(self.http.get(url)).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let res = builder.send().await.map_err(map_reqwest_error)?;
        let res = check_status(res).await?;
        let tracking_id = res
            .headers()
            .get(HEADER_TRACKING_ID)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = res.text().await.map_err(map_reqwest_error)?;
        Ok(PageResponse { body, tracking_id })
    }

    async fn subscribe_events(&self, sitemap: &str, page_id: &str) -> SyncResult<EventStream> {
        let url = self.resolve("rest/sitemaps/events/subscribe")?;
        let res = self
            .authorize(self.http.post(url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|err| SyncError::EventsUnsupported(err.to_string()))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("server has no event subscription endpoint");
            return Err(SyncError::EventsUnsupported("subscribe returned 404".into()));
        }
        let res = check_status(res)
            .await
            .map_err(|err| SyncError::EventsUnsupported(err.to_string()))?;
        let created: SubscribeResponse = res
            .json()
            .await
            .map_err(|err| SyncError::EventsUnsupported(err.to_string()))?;
        if created.status != "CREATED" {
            return Err(SyncError::EventsUnsupported(format!(
                "unexpected subscription status {}",
                created.status
            )));
        }
        let location = created
            .context
            .headers
            .location
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::EventsUnsupported("subscription has no location".into()))?;
        let mut stream_url = self
            .resolve(&location)
            .map_err(|err| SyncError::EventsUnsupported(err.to_string()))?;
        stream_url
            .query_pairs_mut()
            .append_pair("sitemap", sitemap)
            .append_pair("pageid", page_id);

        let mut source = self
            .authorize(self.http.get(stream_url))
            .eventsource()
            .map_err(|err| SyncError::EventsUnsupported(err.to_string()))?;
        // Reconnects are driven by the subscription, not by the event source.
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        let stream = source.filter_map(|event| async move {
            match event {
                Ok(Event::Open) => None,
                Ok(Event::Message(message)) => Some(Ok(message.data)),
                Err(err) => {
                    warn!(error = %err, "event stream failed");
                    Some(Err(SyncError::EventStream(err.to_string())))
                }
            }
        });
        Ok(stream.boxed())
    }
}

async fn check_status(res: reqwest::Response) -> SyncResult<reqwest::Response> {
    if res.status().is_success() {
        Ok(res)
    } else {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Err(SyncError::UnexpectedStatus { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Http(err)
    }
}
