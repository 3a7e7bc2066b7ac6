//! Server-sent sitemap events.
//!
//! Servers with event support push one JSON object per change on the page
//! subscription stream. Only three shapes matter to the engine: a changed
//! widget, a changed sitemap and keep-alives.

use serde::Deserialize;

use crate::error::ParseError;
use crate::source::json::{lenient_bool, RawItem};
use crate::model::Item;

#[derive(Debug, Clone, PartialEq)]
pub enum SitemapEvent {
    /// The sitemap definition changed; the page must be reloaded.
    SitemapChanged { sitemap: Option<String>, page: Option<String> },
    Alive,
    Widget(WidgetEvent),
}

/// Presentation fields of one widget as reported by an event. Absent fields
/// keep their previous value.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetEvent {
    pub widget_id: String,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub state: Option<String>,
    pub label_color: Option<String>,
    pub value_color: Option<String>,
    pub visibility: Option<bool>,
    pub item: Option<Item>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEvent {
    #[serde(rename = "TYPE")]
    kind: Option<String>,
    #[serde(rename = "sitemapName")]
    sitemap_name: Option<String>,
    #[serde(rename = "pageId")]
    page_id: Option<String>,
    #[serde(rename = "widgetId")]
    widget_id: Option<String>,
    label: Option<String>,
    icon: Option<String>,
    state: Option<String>,
    #[serde(rename = "labelcolor")]
    label_color: Option<String>,
    #[serde(rename = "valuecolor")]
    value_color: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    visibility: Option<bool>,
    item: Option<RawItem>,
}

impl WidgetEvent {
    /// Whether the event addresses the page itself rather than a widget on it.
    pub fn targets_page(&self, page_id: &str) -> bool {
        self.widget_id == page_id
    }
}

pub fn parse_event(payload: &str) -> Result<SitemapEvent, ParseError> {
    let raw: RawEvent = serde_json::from_str(payload)?;
    match raw.kind.as_deref() {
        Some("SITEMAP_CHANGED") => Ok(SitemapEvent::SitemapChanged {
            sitemap: raw.sitemap_name,
            page: raw.page_id,
        }),
        Some("ALIVE") => Ok(SitemapEvent::Alive),
        _ => {
            let widget_id = raw
                .widget_id
                .ok_or_else(|| ParseError::Shape("widget event without widgetId".into()))?;
            Ok(SitemapEvent::Widget(WidgetEvent {
                widget_id,
                label: raw.label,
                icon: raw.icon,
                state: raw.state,
                label_color: raw.label_color,
                value_color: raw.value_color,
                visibility: raw.visibility,
                item: raw.item.and_then(RawItem::into_item),
            }))
        }
    }
}
