use roxmltree::Node;
use tracing::debug;

use super::ParsedPage;
use crate::error::ParseError;
use crate::model::{
    sanitize_icon, sanitize_item_state, sanitize_min_max_step, sanitize_period, sanitize_refresh,
    Item, ItemType, LabeledValue, LinkedPage, Widget, WidgetType,
};

pub(crate) fn parse_page(body: &str) -> Result<ParsedPage, ParseError> {
    let document = roxmltree::Document::parse(body)?;
    let root = document.root_element();
    let widgets = elements(root, "widget")
        .filter_map(|node| convert_widget(node, None))
        .collect();
    Ok(ParsedPage {
        id: element_text(root, "id"),
        title: element_text(root, "title"),
        icon: element_text(root, "icon"),
        link: element_text(root, "link"),
        widgets,
        server_timeout: false,
    })
}

fn convert_widget(node: Node<'_, '_>, parent_id: Option<&str>) -> Option<Widget> {
    let id = element_text(node, "widgetId")?;
    let kind = WidgetType::parse(element_text(node, "type").as_deref());
    let icon = element_text(node, "icon");
    let item = elements(node, "item").next().and_then(convert_item);
    let linked_page = elements(node, "linkedPage").next().and_then(convert_linked_page);
    let mappings = elements(node, "mapping")
        .map(|mapping| LabeledValue {
            value: element_text(mapping, "command").unwrap_or_default(),
            label: element_text(mapping, "label").unwrap_or_default(),
        })
        .collect();
    let (min_value, max_value, step) = sanitize_min_max_step(
        number(node, "minValue").unwrap_or(0.0) as f32,
        number(node, "maxValue").unwrap_or(100.0) as f32,
        number(node, "step").unwrap_or(1.0) as f32,
    );
    let children = elements(node, "widget")
        .filter_map(|child| convert_widget(child, Some(&id)))
        .collect();

    Some(Widget {
        parent_id: parent_id.map(str::to_string),
        label: element_text(node, "label").unwrap_or_default(),
        icon_path: format!("images/{}.png", icon.as_deref().unwrap_or("none")),
        icon: sanitize_icon(icon),
        state: item.as_ref().and_then(|item| item.state.clone()),
        kind,
        url: element_text(node, "url"),
        item,
        linked_page,
        mappings,
        encoding: element_text(node, "encoding"),
        icon_color: element_text(node, "iconcolor"),
        label_color: element_text(node, "labelcolor"),
        value_color: element_text(node, "valuecolor"),
        refresh: sanitize_refresh(number(node, "refresh").unwrap_or(0.0) as i64),
        min_value,
        max_value,
        step,
        period: sanitize_period(element_text(node, "period")),
        service: element_text(node, "service").unwrap_or_default(),
        legend: None,
        switch_support: element_text(node, "switchSupport").as_deref() == Some("true"),
        height: number(node, "height").map(|h| h.max(0.0) as u32).unwrap_or(0),
        visibility: true,
        children,
        id,
    })
}

fn convert_item(node: Node<'_, '_>) -> Option<Item> {
    let name = element_text(node, "name")?;
    Some(Item {
        label: Some(name.clone()),
        kind: ItemType::parse(element_text(node, "type").as_deref()),
        group_type: ItemType::parse(element_text(node, "groupType").as_deref()),
        link: element_text(node, "link"),
        read_only: false,
        members: Vec::new(),
        options: None,
        state: sanitize_item_state(element_text(node, "state")),
        name,
    })
}

fn convert_linked_page(node: Node<'_, '_>) -> Option<LinkedPage> {
    let icon = element_text(node, "icon");
    let icon_path = format!("images/{}.png", icon.as_deref().unwrap_or("none"));
    LinkedPage::build(
        element_text(node, "id"),
        element_text(node, "title"),
        icon,
        icon_path,
        element_text(node, "link"),
    )
}

/// Direct child elements with the given tag name.
pub(crate) fn elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == name)
}

/// Text content of the first child element with the given name, if non-empty.
pub(crate) fn element_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    elements(node, name).next().and_then(text_content)
}

fn text_content(node: Node<'_, '_>) -> Option<String> {
    let text = node
        .descendants()
        .filter(|entry| entry.is_text())
        .filter_map(|entry| entry.text())
        .collect::<String>();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn number(node: Node<'_, '_>, name: &str) -> Option<f64> {
    let text = element_text(node, name)?;
    match text.parse::<f64>() {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(field = name, value = %text, error = %err, "ignoring malformed numeric field");
            None
        }
    }
}
