use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::model::Widget;

/// Receives page changes produced by the engine.
///
/// Callbacks run on the engine task. Implementations must not block.
pub trait PageListener: Send + Sync {
    fn on_page_updated(&self, url: &str, title: Option<&str>, widgets: &[Widget]);

    /// A single widget inside an already delivered page changed.
    fn on_widget_updated(&self, url: &str, widget: &Widget);

    fn on_page_title_updated(&self, url: &str, title: &str);
}

/// Owned form of a listener callback, for consumers that prefer a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    PageUpdated {
        url: String,
        title: Option<String>,
        widgets: Vec<Widget>,
    },
    WidgetUpdated {
        url: String,
        widget: Widget,
    },
    TitleUpdated {
        url: String,
        title: String,
    },
}

impl PageEvent {
    pub fn url(&self) -> &str {
        match self {
            PageEvent::PageUpdated { url, .. }
            | PageEvent::WidgetUpdated { url, .. }
            | PageEvent::TitleUpdated { url, .. } => url,
        }
    }
}

impl PageListener for UnboundedSender<PageEvent> {
    fn on_page_updated(&self, url: &str, title: Option<&str>, widgets: &[Widget]) {
        forward(
            self,
            PageEvent::PageUpdated {
                url: url.to_string(),
                title: title.map(str::to_string),
                widgets: widgets.to_vec(),
            },
        );
    }

    fn on_widget_updated(&self, url: &str, widget: &Widget) {
        forward(
            self,
            PageEvent::WidgetUpdated {
                url: url.to_string(),
                widget: widget.clone(),
            },
        );
    }

    fn on_page_title_updated(&self, url: &str, title: &str) {
        forward(
            self,
            PageEvent::TitleUpdated {
                url: url.to_string(),
                title: title.to_string(),
            },
        );
    }
}

fn forward(tx: &UnboundedSender<PageEvent>, event: PageEvent) {
    if tx.send(event).is_err() {
        trace!("page event receiver dropped");
    }
}

/// Listener that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl PageListener for NoopListener {
    fn on_page_updated(&self, _url: &str, _title: Option<&str>, _widgets: &[Widget]) {}
    fn on_widget_updated(&self, _url: &str, _widget: &Widget) {}
    fn on_page_title_updated(&self, _url: &str, _title: &str) {}
}
