//! Typed records produced by the widget data source.

mod item;
mod widget;

pub use item::{Item, ItemType};
pub(crate) use item::sanitize_item_state;
pub use widget::{find_widget, replace_widget, Widget, WidgetType, MIN_REFRESH_MS};
pub(crate) use widget::{
    icon_path, sanitize_icon, sanitize_min_max_step, sanitize_period, sanitize_refresh,
    strip_unlabeled_frames, widget_state,
};

use serde::{Deserialize, Serialize};

/// A label/command pair, used for widget mappings and item state options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledValue {
    pub value: String,
    pub label: String,
}

/// Reference to another page of the same sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedPage {
    pub id: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub icon_path: String,
    pub link: String,
}

impl LinkedPage {
    /// Returns `None` without a link. Titles carry a formatted state suffix
    /// (`Kitchen [21 °C]`) which is cut off unless it starts the title.
    pub fn build(
        id: Option<String>,
        title: Option<String>,
        icon: Option<String>,
        icon_path: String,
        link: Option<String>,
    ) -> Option<LinkedPage> {
        let link = link?;
        let title = title.map(|title| match title.find('[') {
            Some(pos) if pos > 0 => title[..pos].to_string(),
            _ => title,
        });
        Some(LinkedPage {
            id,
            title,
            icon,
            icon_path,
            link,
        })
    }
}

/// Entry of the server's sitemap listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sitemap {
    pub name: String,
    pub label: String,
    pub homepage_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_page_title_strips_state_suffix() {
        let page = LinkedPage::build(
            Some("0001".into()),
            Some("Kitchen [21 °C]".into()),
            None,
            "icon/none".into(),
            Some("http://server/rest/sitemaps/demo/0001".into()),
        )
        .expect("page");
        assert_eq!(page.title.as_deref(), Some("Kitchen "));

        let bracketed = LinkedPage::build(
            None,
            Some("[raw]".into()),
            None,
            String::new(),
            Some("/x".into()),
        )
        .expect("page");
        assert_eq!(bracketed.title.as_deref(), Some("[raw]"));
    }

    #[test]
    fn linked_page_requires_link() {
        assert!(LinkedPage::build(None, Some("t".into()), None, String::new(), None).is_none());
    }
}
