use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::ParsedPage;
use crate::error::ParseError;
use crate::model::{
    icon_path, sanitize_icon, sanitize_item_state, sanitize_min_max_step, sanitize_period,
    sanitize_refresh, widget_state, Item, ItemType, LabeledValue, LinkedPage, Widget, WidgetType,
};
use crate::server::IconFormat;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPage {
    id: Option<String>,
    title: Option<String>,
    icon: Option<String>,
    link: Option<String>,
    widgets: Option<Vec<RawWidget>>,
    #[serde(deserialize_with = "lenient_bool")]
    timeout: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWidget {
    #[serde(rename = "widgetId")]
    widget_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    label: Option<String>,
    icon: Option<String>,
    state: Option<String>,
    url: Option<String>,
    item: Option<RawItem>,
    #[serde(rename = "linkedPage")]
    linked_page: Option<RawLinkedPage>,
    mappings: Option<Vec<RawMapping>>,
    encoding: Option<String>,
    #[serde(rename = "iconcolor")]
    icon_color: Option<String>,
    #[serde(rename = "labelcolor")]
    label_color: Option<String>,
    #[serde(rename = "valuecolor")]
    value_color: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    refresh: Option<f64>,
    #[serde(rename = "minValue", deserialize_with = "lenient_number")]
    min_value: Option<f64>,
    #[serde(rename = "maxValue", deserialize_with = "lenient_number")]
    max_value: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    step: Option<f64>,
    period: Option<String>,
    service: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    legend: Option<bool>,
    #[serde(rename = "switchSupport", deserialize_with = "lenient_bool")]
    switch_support: Option<bool>,
    #[serde(deserialize_with = "lenient_number")]
    height: Option<f64>,
    #[serde(deserialize_with = "lenient_bool")]
    visibility: Option<bool>,
    widgets: Option<Vec<RawWidget>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawItem {
    name: Option<String>,
    label: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "groupType")]
    group_type: Option<String>,
    link: Option<String>,
    state: Option<String>,
    #[serde(rename = "stateDescription")]
    state_description: Option<RawStateDescription>,
    members: Option<Vec<RawItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStateDescription {
    #[serde(rename = "readOnly", deserialize_with = "lenient_bool")]
    read_only: Option<bool>,
    options: Option<Vec<RawOption>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOption {
    value: String,
    label: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMapping {
    command: String,
    label: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLinkedPage {
    id: Option<String>,
    title: Option<String>,
    icon: Option<String>,
    link: Option<String>,
}

impl RawItem {
    /// Items without a name are dropped.
    pub(crate) fn into_item(self) -> Option<Item> {
        let name = self.name?;
        let (read_only, options) = match self.state_description {
            Some(description) => (
                description.read_only.unwrap_or(false),
                description.options.map(|options| {
                    options
                        .into_iter()
                        .map(|option| LabeledValue {
                            value: option.value,
                            label: option.label,
                        })
                        .collect()
                }),
            ),
            None => (false, None),
        };
        let members = self
            .members
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawItem::into_item)
            .collect();
        Some(Item {
            label: Some(self.label.unwrap_or_else(|| name.clone())),
            name,
            kind: ItemType::parse(self.kind.as_deref()),
            group_type: ItemType::parse(self.group_type.as_deref()),
            link: self.link,
            read_only,
            members,
            options,
            state: sanitize_item_state(self.state),
        })
    }
}

pub(crate) fn parse_page(body: &str, icon_format: IconFormat) -> Result<ParsedPage, ParseError> {
    let raw: RawPage = serde_json::from_str(body)?;
    let server_timeout = raw.timeout.unwrap_or(false);
    // Envelopes without a widget array (such as a bare timeout) describe no page.
    let Some(widgets) = raw.widgets else {
        return Ok(ParsedPage {
            server_timeout,
            ..ParsedPage::default()
        });
    };
    let widgets = widgets
        .into_iter()
        .filter_map(|widget| convert_widget(widget, None, icon_format))
        .collect();
    Ok(ParsedPage {
        title: raw.title.or_else(|| raw.id.clone()),
        id: raw.id,
        icon: raw.icon,
        link: raw.link,
        widgets,
        server_timeout,
    })
}

fn convert_widget(raw: RawWidget, parent_id: Option<&str>, icon_format: IconFormat) -> Option<Widget> {
    let id = raw.widget_id?;
    let kind = WidgetType::parse(raw.kind.as_deref());
    let mappings: Vec<LabeledValue> = raw
        .mappings
        .unwrap_or_default()
        .into_iter()
        .map(|mapping| LabeledValue {
            value: mapping.command,
            label: mapping.label,
        })
        .collect();
    let item = raw.item.and_then(RawItem::into_item);
    let (min_value, max_value, step) = sanitize_min_max_step(
        raw.min_value.unwrap_or(0.0) as f32,
        raw.max_value.unwrap_or(100.0) as f32,
        raw.step.unwrap_or(1.0) as f32,
    );
    let icon_path = icon_path(
        item.as_ref(),
        kind,
        raw.icon.as_deref(),
        icon_format,
        !mappings.is_empty(),
    );
    let linked_page = raw.linked_page.and_then(|page| {
        let icon_path = format!("icon/{}", page.icon.as_deref().unwrap_or("none"));
        LinkedPage::build(page.id, page.title, page.icon, icon_path, page.link)
    });
    let children = raw
        .widgets
        .unwrap_or_default()
        .into_iter()
        .filter_map(|child| convert_widget(child, Some(&id), icon_format))
        .collect();

    Some(Widget {
        parent_id: parent_id.map(str::to_string),
        label: raw.label.unwrap_or_default(),
        icon: sanitize_icon(raw.icon),
        icon_path,
        state: widget_state(raw.state, item.as_ref()),
        kind,
        url: raw.url,
        item,
        linked_page,
        mappings,
        encoding: raw.encoding,
        icon_color: raw.icon_color,
        label_color: raw.label_color,
        value_color: raw.value_color,
        refresh: sanitize_refresh(raw.refresh.unwrap_or(0.0) as i64),
        min_value,
        max_value,
        step,
        period: sanitize_period(raw.period),
        service: raw.service.unwrap_or_default(),
        legend: raw.legend,
        switch_support: raw.switch_support.unwrap_or(false),
        height: raw.height.map(|h| h.max(0.0) as u32).unwrap_or(0),
        visibility: raw.visibility.unwrap_or(true),
        children,
        id,
    })
}

/// Accepts numbers and numeric strings; anything else reads as absent.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}
