use std::fmt::Write as _;

use serde_json::json;
use sitemap_sync::{PageView, Widget, WidgetType};

pub fn page_json(page: &PageView) -> String {
    json!({
        "url": page.url,
        "title": page.title,
        "widgets": page.widgets,
    })
    .to_string()
}

pub fn page_text(page: &PageView) -> String {
    let mut out = String::new();
    let title = page.title.as_deref().unwrap_or("(untitled)");
    let _ = writeln!(out, "== {title} ==");
    for widget in &page.widgets {
        widget_lines(&mut out, widget, 0);
    }
    out
}

fn widget_lines(out: &mut String, widget: &Widget, depth: usize) {
    if !widget.visibility {
        return;
    }
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{indent}- {:?} {}", widget.kind, widget.label);
    let item_state = widget.item.as_ref().and_then(|item| item.state.as_deref());
    if let Some(state) = widget.state.as_deref().or(item_state) {
        if !state.is_empty() && !widget.label.contains(state) {
            let _ = write!(out, " = {state}");
        }
    }
    if widget.kind == WidgetType::Selection {
        let choices: Vec<&str> = widget
            .mappings_or_item_options()
            .iter()
            .map(|choice| choice.label.as_str())
            .collect();
        if !choices.is_empty() {
            let _ = write!(out, " [{}]", choices.join("|"));
        }
    }
    if let Some(page) = &widget.linked_page {
        let _ = write!(out, " -> {}", page.link);
    }
    out.push('\n');
    for child in &widget.children {
        widget_lines(out, child, depth + 1);
    }
}
