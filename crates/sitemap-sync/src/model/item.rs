use serde::{Deserialize, Serialize};

use super::LabeledValue;

/// Automation item a widget is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub label: Option<String>,
    pub kind: ItemType,
    pub group_type: ItemType,
    pub link: Option<String>,
    pub read_only: bool,
    pub members: Vec<Item>,
    pub options: Option<Vec<LabeledValue>>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    None,
    Color,
    Contact,
    DateTime,
    Dimmer,
    Group,
    Image,
    Location,
    Number,
    NumberWithDimension,
    Player,
    Rollershutter,
    StringItem,
    Switch,
}

impl ItemType {
    /// Normalises server type names: `SwitchItem` and `Switch` are the same type,
    /// and `Number:Temperature` is a dimensioned number.
    pub fn parse(value: Option<&str>) -> ItemType {
        let Some(raw) = value else {
            return ItemType::None;
        };
        let raw = raw.strip_suffix("Item").unwrap_or(raw);
        let (base, dimensioned) = match raw.find(':') {
            Some(pos) if pos > 0 => (&raw[..pos], true),
            _ => (raw, false),
        };
        match base {
            "String" => ItemType::StringItem,
            "Number" if dimensioned => ItemType::NumberWithDimension,
            "Number" => ItemType::Number,
            "Color" => ItemType::Color,
            "Contact" => ItemType::Contact,
            "DateTime" => ItemType::DateTime,
            "Dimmer" => ItemType::Dimmer,
            "Group" => ItemType::Group,
            "Image" => ItemType::Image,
            "Location" => ItemType::Location,
            "Player" => ItemType::Player,
            "Rollershutter" => ItemType::Rollershutter,
            "Switch" => ItemType::Switch,
            _ => ItemType::None,
        }
    }
}

impl Item {
    pub fn is_of_type_or_group_type(&self, kind: ItemType) -> bool {
        self.kind == kind || self.group_type == kind
    }

    /// Events never carry the item link, so the previously known one is kept.
    pub fn merge_event(previous: Option<&Item>, mut updated: Item) -> Item {
        if let Some(previous) = previous {
            updated.link = previous.link.clone();
        }
        updated
    }
}

/// Maps the various "no state" markers servers emit to `None`.
pub(crate) fn sanitize_item_state(state: Option<String>) -> Option<String> {
    match state.as_deref() {
        None | Some("") => None,
        Some("NULL") | Some("UNDEF") | Some("Uninitialized") | Some("Undefined") => None,
        Some(value) if value.eq_ignore_ascii_case("undefined") => None,
        Some(_) => state,
    }
}
