//! Capabilities of the connected server and the wire format they imply.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ParseError, SyncResult};
use crate::http::HttpPageClient;
use crate::model::Sitemap;
use crate::source::xml::{element_text, elements};

/// Encoding of page responses, chosen once per server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IconFormat {
    #[default]
    Png,
    Svg,
}

impl IconFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            IconFormat::Png => "PNG",
            IconFormat::Svg => "SVG",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerProperties {
    pub json_api: bool,
    pub sse: bool,
    pub icon_format_support: bool,
    pub invisible_widgets: bool,
    pub any_format_icon: bool,
    pub habpanel: bool,
    pub icon_format: IconFormat,
}

#[derive(Debug, Deserialize)]
struct RawRestRoot {
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    links: Option<Vec<RawLink>>,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl ServerProperties {
    /// Properties of a modern server speaking the JSON API without events.
    pub fn json() -> Self {
        Self {
            json_api: true,
            icon_format_support: true,
            ..Self::default()
        }
    }

    /// Properties of a legacy server that only answers XML.
    pub fn legacy_xml() -> Self {
        Self::default()
    }

    pub fn with_icon_format(mut self, icon_format: IconFormat) -> Self {
        self.icon_format = icon_format;
        self
    }

    pub fn response_format(&self) -> ResponseFormat {
        if self.json_api {
            ResponseFormat::Json
        } else {
            ResponseFormat::Xml
        }
    }

    /// Interprets the body returned for `GET rest`.
    pub fn from_rest_root(body: &str) -> Result<Self, ParseError> {
        let root = match serde_json::from_str::<RawRestRoot>(body) {
            Ok(root) => root,
            Err(_) if body.trim_start().starts_with("<?xml") => {
                return Ok(Self::legacy_xml());
            }
            Err(err) => return Err(ParseError::Json(err)),
        };

        let mut props = Self::json();
        // Versions that report a number have event support; older ones report nothing parsable.
        let version = match &root.version {
            Some(Value::String(text)) => text.trim().parse::<u32>().ok(),
            Some(Value::Number(number)) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        };
        if let Some(version) = version {
            props.sse = true;
            props.invisible_widgets = version >= 2;
            props.any_format_icon = version >= 3;
        }
        match root.links {
            Some(links) => {
                props.habpanel = links
                    .iter()
                    .any(|link| link.kind.as_deref() == Some("habpanel"));
            }
            None => warn!("server root lists no links"),
        }
        Ok(props)
    }

    /// Probes the server root and derives its capabilities.
    pub async fn fetch(client: &HttpPageClient) -> SyncResult<Self> {
        let body = client.fetch_text("rest").await?;
        let props = Self::from_rest_root(&body)?;
        debug!(?props, "probed server properties");
        Ok(props)
    }

    pub async fn fetch_sitemaps(&self, client: &HttpPageClient) -> SyncResult<Vec<Sitemap>> {
        let body = client.fetch_text("rest/sitemaps").await?;
        let sitemaps = match self.response_format() {
            ResponseFormat::Json => parse_sitemaps_json(&body)?,
            ResponseFormat::Xml => parse_sitemaps_xml(&body)?,
        };
        debug!(count = sitemaps.len(), "server returned sitemaps");
        Ok(sitemaps)
    }
}

#[derive(Debug, Deserialize)]
struct RawSitemap {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    homepage: Option<RawHomepage>,
}

#[derive(Debug, Deserialize)]
struct RawHomepage {
    #[serde(default)]
    link: Option<String>,
}

pub fn parse_sitemaps_json(body: &str) -> Result<Vec<Sitemap>, ParseError> {
    let raw: Vec<RawSitemap> = serde_json::from_str(body)?;
    Ok(raw
        .into_iter()
        .filter_map(|sitemap| {
            let name = sitemap.name?;
            let homepage_link = sitemap.homepage.and_then(|homepage| homepage.link)?;
            Some(Sitemap {
                label: sitemap.label.unwrap_or_else(|| name.clone()),
                name,
                homepage_link,
            })
        })
        .collect())
}

pub fn parse_sitemaps_xml(body: &str) -> Result<Vec<Sitemap>, ParseError> {
    let document = roxmltree::Document::parse(body)?;
    let root = document.root_element();
    Ok(elements(root, "sitemap")
        .filter_map(|node| {
            let name = element_text(node, "name")?;
            let homepage_link = elements(node, "homepage")
                .find_map(|homepage| element_text(homepage, "link"))?;
            Some(Sitemap {
                label: element_text(node, "label").unwrap_or_else(|| name.clone()),
                name,
                homepage_link,
            })
        })
        .collect())
}
