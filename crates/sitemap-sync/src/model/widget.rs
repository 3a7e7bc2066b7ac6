use serde::{Deserialize, Serialize};

use super::{Item, ItemType, LabeledValue, LinkedPage};
use crate::events::WidgetEvent;
use crate::server::IconFormat;

/// Refresh intervals below this many milliseconds are raised to it.
pub const MIN_REFRESH_MS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub parent_id: Option<String>,
    pub label: String,
    pub icon: Option<String>,
    pub icon_path: String,
    pub state: Option<String>,
    #[serde(rename = "type")]
    pub kind: WidgetType,
    pub url: Option<String>,
    pub item: Option<Item>,
    pub linked_page: Option<LinkedPage>,
    pub mappings: Vec<LabeledValue>,
    pub encoding: Option<String>,
    pub icon_color: Option<String>,
    pub label_color: Option<String>,
    pub value_color: Option<String>,
    pub refresh: u32,
    pub min_value: f32,
    pub max_value: f32,
    pub step: f32,
    pub period: String,
    pub service: String,
    pub legend: Option<bool>,
    pub switch_support: bool,
    pub height: u32,
    pub visibility: bool,
    /// Nested widgets of Frame and Group containers, in server order.
    pub children: Vec<Widget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WidgetType {
    Chart,
    Colorpicker,
    Default,
    Frame,
    Group,
    Image,
    Mapview,
    Rollershutter,
    Selection,
    Setpoint,
    Slider,
    Switch,
    Text,
    Video,
    Webview,
    Unknown,
}

impl WidgetType {
    pub fn parse(value: Option<&str>) -> WidgetType {
        match value.unwrap_or_default() {
            "Chart" => WidgetType::Chart,
            "Colorpicker" => WidgetType::Colorpicker,
            "Default" => WidgetType::Default,
            "Frame" => WidgetType::Frame,
            "Group" => WidgetType::Group,
            "Image" => WidgetType::Image,
            "Mapview" => WidgetType::Mapview,
            "Rollershutter" => WidgetType::Rollershutter,
            "Selection" => WidgetType::Selection,
            "Setpoint" => WidgetType::Setpoint,
            "Slider" => WidgetType::Slider,
            "Switch" => WidgetType::Switch,
            "Text" => WidgetType::Text,
            "Video" => WidgetType::Video,
            "Webview" => WidgetType::Webview,
            _ => WidgetType::Unknown,
        }
    }
}

impl Widget {
    /// Mappings, falling back to the bound item's state options.
    pub fn mappings_or_item_options(&self) -> &[LabeledValue] {
        if self.mappings.is_empty() {
            if let Some(options) = self.item.as_ref().and_then(|item| item.options.as_ref()) {
                return options;
            }
        }
        &self.mappings
    }

    /// Applies a server-sent widget change on top of this widget.
    pub fn update_from_event(&self, event: &WidgetEvent, icon_format: IconFormat) -> Widget {
        let item = match &event.item {
            Some(updated) => Some(Item::merge_event(self.item.as_ref(), updated.clone())),
            None => self.item.clone(),
        };
        let icon = event.icon.clone().or_else(|| self.icon.clone());
        let icon_path = icon_path(
            item.as_ref(),
            self.kind,
            icon.as_deref(),
            icon_format,
            !self.mappings.is_empty(),
        );
        Widget {
            label: event.label.clone().unwrap_or_else(|| self.label.clone()),
            icon: sanitize_icon(icon),
            icon_path,
            state: widget_state(event.state.clone(), item.as_ref()),
            item,
            label_color: event.label_color.clone().or_else(|| self.label_color.clone()),
            value_color: event.value_color.clone().or_else(|| self.value_color.clone()),
            visibility: event.visibility.unwrap_or(self.visibility),
            ..self.clone()
        }
    }
}

/// Depth-first search through a widget tree.
pub fn find_widget<'a>(widgets: &'a [Widget], id: &str) -> Option<&'a Widget> {
    widgets.iter().find_map(|widget| {
        if widget.id == id {
            Some(widget)
        } else {
            find_widget(&widget.children, id)
        }
    })
}

/// Replaces the widget with the same id, keeping the old children.
pub fn replace_widget(widgets: &mut [Widget], updated: &Widget) -> bool {
    for widget in widgets.iter_mut() {
        if widget.id == updated.id {
            let children = std::mem::take(&mut widget.children);
            *widget = Widget {
                children,
                ..updated.clone()
            };
            return true;
        }
        if replace_widget(&mut widget.children, updated) {
            return true;
        }
    }
    false
}

/// Frames without a label carry no information of their own; their children
/// take their place in the parent list.
pub(crate) fn strip_unlabeled_frames(widgets: Vec<Widget>) -> Vec<Widget> {
    let mut result = Vec::with_capacity(widgets.len());
    for mut widget in widgets {
        let children = std::mem::take(&mut widget.children);
        let children = strip_unlabeled_frames(children);
        if widget.kind == WidgetType::Frame && widget.label.is_empty() {
            result.extend(children.into_iter().map(|mut child| {
                child.parent_id = widget.parent_id.clone();
                child
            }));
        } else {
            widget.children = children;
            result.push(widget);
        }
    }
    result
}

pub(crate) fn sanitize_icon(icon: Option<String>) -> Option<String> {
    icon.filter(|icon| icon != "none")
}

pub(crate) fn sanitize_refresh(refresh: i64) -> u32 {
    // negative intervals are meaningless and count as no refresh
    if refresh <= 0 {
        0
    } else if refresh < i64::from(MIN_REFRESH_MS) {
        MIN_REFRESH_MS
    } else {
        u32::try_from(refresh).unwrap_or(u32::MAX)
    }
}

pub(crate) fn sanitize_period(period: Option<String>) -> String {
    period
        .filter(|period| !period.is_empty())
        .unwrap_or_else(|| "D".to_string())
}

/// Max is raised to at least min and the step is made positive.
pub(crate) fn sanitize_min_max_step(min: f32, max: f32, step: f32) -> (f32, f32, f32) {
    (min, min.max(max), step.abs())
}

pub(crate) fn widget_state(state: Option<String>, item: Option<&Item>) -> Option<String> {
    state.or_else(|| item.and_then(|item| item.state.clone()))
}

pub(crate) fn icon_path(
    item: Option<&Item>,
    kind: WidgetType,
    icon: Option<&str>,
    icon_format: IconFormat,
    has_mappings: bool,
) -> String {
    let icon_state = match item {
        Some(item) => match item.state.as_deref() {
            Some(state) => icon_state(item, state, kind, has_mappings),
            None => String::new(),
        },
        None => String::new(),
    };
    format!(
        "icon/{}?state={}&format={}",
        icon.unwrap_or("none"),
        icon_state,
        icon_format.as_str()
    )
}

fn icon_state(item: &Item, state: &str, kind: WidgetType, has_mappings: bool) -> String {
    let switch_without_mappings = kind == WidgetType::Switch && !has_mappings;
    if item.is_of_type_or_group_type(ItemType::Color) {
        if kind == WidgetType::Slider || switch_without_mappings {
            return match brightness(state) {
                Some(0) if kind == WidgetType::Switch => "OFF".to_string(),
                Some(_) if kind == WidgetType::Switch => "ON".to_string(),
                Some(level) => level.to_string(),
                None => "OFF".to_string(),
            };
        }
        if let Some((h, s, b)) = parse_hsb(state) {
            let (r, g, b) = hsb_to_rgb(h, s, b);
            return format!("#{r:02x}{g:02x}{b:02x}");
        }
        return state.to_string();
    }
    if switch_without_mappings && !item.is_of_type_or_group_type(ItemType::Rollershutter) {
        return if state == "0" || state == "OFF" { "OFF" } else { "ON" }.to_string();
    }
    state.to_string()
}

fn brightness(state: &str) -> Option<i64> {
    if let Some((_, _, b)) = parse_hsb(state) {
        return Some(b.round() as i64);
    }
    state.trim().parse::<f32>().ok().map(|value| value.round() as i64)
}

fn parse_hsb(state: &str) -> Option<(f32, f32, f32)> {
    let mut parts = state.split(',').map(|part| part.trim().parse::<f32>());
    let h = parts.next()?.ok()?;
    let s = parts.next()?.ok()?;
    let b = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((h, s, b))
}

/// Hue in degrees, saturation and brightness in percent.
fn hsb_to_rgb(hue: f32, saturation: f32, brightness: f32) -> (u8, u8, u8) {
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let v = (brightness / 100.0).clamp(0.0, 1.0);
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = v * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    let scale = |channel: f32| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (scale(r), scale(g), scale(b))
}
