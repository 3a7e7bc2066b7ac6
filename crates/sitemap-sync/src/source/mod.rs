//! Widget data source: turns one page response body into typed widget records.
//!
//! Modern servers answer with JSON, legacy servers with XML. Both encodings
//! carry the same fields under the same names, so both parsers build the same
//! [`ParsedPage`]. Parsing is stateless per call.

pub(crate) mod json;
pub(crate) mod xml;

use crate::error::ParseError;
use crate::model::{strip_unlabeled_frames, Widget};
use crate::server::{IconFormat, ResponseFormat};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub id: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub link: Option<String>,
    pub widgets: Vec<Widget>,
    /// The server ended a long-poll without changes (JSON envelopes only).
    pub server_timeout: bool,
}

impl ParsedPage {
    /// Top-level widgets followed by their direct children, the order a page
    /// is displayed in.
    pub fn flattened(&self) -> Vec<&Widget> {
        flatten(&self.widgets)
    }
}

pub fn flatten(widgets: &[Widget]) -> Vec<&Widget> {
    let mut result = Vec::with_capacity(widgets.len());
    for widget in widgets {
        result.push(widget);
        result.extend(widget.children.iter());
    }
    result
}

/// Parses a page or long-poll body in the given encoding.
///
/// Frames with an empty label are removed; their children are lifted into
/// the frame's place.
pub fn parse(
    body: &str,
    format: ResponseFormat,
    icon_format: IconFormat,
) -> Result<ParsedPage, ParseError> {
    let mut page = match format {
        ResponseFormat::Json => json::parse_page(body, icon_format)?,
        ResponseFormat::Xml => xml::parse_page(body)?,
    };
    page.widgets = strip_unlabeled_frames(std::mem::take(&mut page.widgets));
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_PAGE: &str = r#"{
        "id": "demo",
        "title": "Demo",
        "widgets": [
            {"widgetId": "00", "type": "Frame", "label": "",
             "widgets": [{"widgetId": "0000", "type": "Switch", "label": "Lamp"}]},
            {"widgetId": "01", "type": "Frame", "label": "Outside",
             "widgets": [{"widgetId": "0100", "type": "Text", "label": "Temp"}]}
        ]
    }"#;

    const XML_PAGE: &str = "<page><id>demo</id><title>Demo</title>\
        <widget><widgetId>00</widgetId><type>Frame</type><label></label>\
          <widget><widgetId>0000</widgetId><type>Switch</type><label>Lamp</label></widget>\
        </widget>\
        <widget><widgetId>01</widgetId><type>Frame</type><label>Outside</label>\
          <widget><widgetId>0100</widgetId><type>Text</type><label>Temp</label></widget>\
        </widget></page>";

    fn ids(page: &ParsedPage) -> Vec<&str> {
        page.flattened().iter().map(|w| w.id.as_str()).collect()
    }

    #[test]
    fn unlabeled_frames_are_dropped_in_both_encodings() {
        let json = parse(JSON_PAGE, ResponseFormat::Json, IconFormat::Png).unwrap();
        let xml = parse(XML_PAGE, ResponseFormat::Xml, IconFormat::Png).unwrap();
        assert_eq!(ids(&json), ["0000", "01", "0100"]);
        assert_eq!(ids(&json), ids(&xml));
        assert_eq!(json.title.as_deref(), Some("Demo"));
        assert_eq!(xml.title.as_deref(), Some("Demo"));
    }

    #[test]
    fn malformed_bodies_fail() {
        assert!(matches!(
            parse("{not json", ResponseFormat::Json, IconFormat::Png),
            Err(ParseError::Json(_))
        ));
        assert!(matches!(
            parse("<page><title>", ResponseFormat::Xml, IconFormat::Png),
            Err(ParseError::Xml(_))
        ));
    }
}
