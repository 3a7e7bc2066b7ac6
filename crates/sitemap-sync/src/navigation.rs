//! Page stack of the navigation layer and its link to the engine.
//!
//! The stack holds the sitemap homepage plus every page navigated into.
//! After each mutation the urls of all pages on the stack are the visible
//! set; [`Navigator`] pushes that set to the engine.

use std::collections::HashSet;

use tracing::debug;

use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::http::ClientHandle;
use crate::listener::PageEvent;
use crate::model::{replace_widget, LinkedPage, Sitemap, Widget};

/// Latest known content of one page on the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pub url: String,
    pub title: Option<String>,
    pub widgets: Vec<Widget>,
    /// Set once the first page update arrived.
    pub loaded: bool,
}

impl PageView {
    fn new(url: &str, title: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            title,
            widgets: Vec::new(),
            loaded: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct PageStack {
    sitemap: Option<Sitemap>,
    root: Option<PageView>,
    pages: Vec<(LinkedPage, PageView)>,
    pending: HashSet<String>,
}

impl PageStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sitemap(&self) -> Option<&Sitemap> {
        self.sitemap.as_ref()
    }

    pub fn open_sitemap(&mut self, sitemap: &Sitemap) {
        debug!(sitemap = %sitemap.name, "opening sitemap");
        self.pages.clear();
        self.root = Some(PageView::new(
            &sitemap.homepage_link,
            Some(sitemap.label.clone()),
        ));
        self.sitemap = Some(sitemap.clone());
        self.pending.clear();
        self.pending.insert(sitemap.homepage_link.clone());
    }

    /// Follows `page` from the page at `source_url`, dropping everything
    /// stacked above the source first.
    pub fn open_page(&mut self, page: LinkedPage, source_url: &str) {
        debug!(link = %page.link, source = %source_url, "opening page");
        while let Some((_, top)) = self.pages.last() {
            if top.url == source_url {
                break;
            }
            self.pages.pop();
        }
        self.push(page);
    }

    /// Brings a page already on the stack to the front, or replaces the stack
    /// with the page at `url`.
    pub fn open_url(&mut self, url: &str) {
        if self.root.as_ref().is_some_and(|root| root.url == url) {
            debug!(%url, "back to sitemap homepage");
            self.pages.clear();
            self.prune_pending();
            return;
        }
        match self.pages.iter().position(|(page, _)| page.link == url) {
            Some(index) => {
                debug!(%url, index, "page already on stack");
                self.pages.truncate(index + 1);
                self.prune_pending();
            }
            None => {
                debug!(%url, "opening page by url");
                self.pages.clear();
                self.push(LinkedPage {
                    id: None,
                    title: None,
                    icon: None,
                    icon_path: String::new(),
                    link: url.to_string(),
                });
            }
        }
    }

    pub fn can_go_back(&self) -> bool {
        !self.pages.is_empty()
    }

    /// Pops the top page. Returns false when only the sitemap is left.
    pub fn go_back(&mut self) -> bool {
        if self.pages.pop().is_some() {
            self.prune_pending();
            true
        } else {
            false
        }
    }

    /// Urls that need a live subscription, sitemap homepage first.
    pub fn visible_urls(&self) -> Vec<String> {
        self.views().map(|view| view.url.clone()).collect()
    }

    /// The page on top of the stack.
    pub fn current(&self) -> Option<&PageView> {
        self.pages
            .last()
            .map(|(_, view)| view)
            .or(self.root.as_ref())
    }

    pub fn page(&self, url: &str) -> Option<&PageView> {
        self.views().find(|view| view.url == url)
    }

    /// Whether a page opened since the last completed load has no data yet.
    pub fn is_loading(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Applies an engine update to the page it belongs to. Returns true when
    /// this update completed the last outstanding page load.
    pub fn apply(&mut self, event: &PageEvent) -> bool {
        let Some(view) = self.view_mut(event.url()) else {
            return false;
        };
        match event {
            PageEvent::PageUpdated { url, title, widgets } => {
                view.title = title.clone();
                view.widgets = widgets.clone();
                view.loaded = true;
                self.pending.remove(url) && self.pending.is_empty()
            }
            PageEvent::WidgetUpdated { widget, .. } => {
                replace_widget(&mut view.widgets, widget);
                false
            }
            PageEvent::TitleUpdated { title, .. } => {
                view.title = Some(title.clone());
                false
            }
        }
    }

    fn push(&mut self, page: LinkedPage) {
        let view = PageView::new(&page.link, page.title.clone());
        self.pending.insert(page.link.clone());
        self.pages.push((page, view));
        self.prune_pending();
    }

    fn views(&self) -> impl Iterator<Item = &PageView> {
        self.root
            .iter()
            .chain(self.pages.iter().map(|(_, view)| view))
    }

    fn view_mut(&mut self, url: &str) -> Option<&mut PageView> {
        self.root
            .iter_mut()
            .chain(self.pages.iter_mut().map(|(_, view)| view))
            .find(|view| view.url == url)
    }

    fn prune_pending(&mut self) {
        let visible: HashSet<String> = self.visible_urls().into_iter().collect();
        self.pending.retain(|url| visible.contains(url));
    }
}

/// Keeps the engine's tracked pages in line with a page stack.
pub struct Navigator {
    stack: PageStack,
    engine: SyncEngine,
    client: Option<ClientHandle>,
}

impl Navigator {
    pub fn new(engine: SyncEngine, client: Option<ClientHandle>) -> Self {
        Self {
            stack: PageStack::new(),
            engine,
            client,
        }
    }

    pub fn stack(&self) -> &PageStack {
        &self.stack
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Swaps the network client. `None` drops every subscription.
    pub fn set_client(&mut self, client: Option<ClientHandle>) -> SyncResult<()> {
        self.client = client;
        self.sync()
    }

    pub fn open_sitemap(&mut self, sitemap: &Sitemap) -> SyncResult<()> {
        self.stack.open_sitemap(sitemap);
        self.sync()
    }

    pub fn open_page(&mut self, page: LinkedPage, source_url: &str) -> SyncResult<()> {
        self.stack.open_page(page, source_url);
        self.sync()
    }

    pub fn open_url(&mut self, url: &str) -> SyncResult<()> {
        self.stack.open_url(url);
        self.sync()
    }

    pub fn go_back(&mut self) -> SyncResult<bool> {
        let popped = self.stack.go_back();
        if popped {
            self.sync()?;
        }
        Ok(popped)
    }

    pub fn trigger_page_update(&self, url: &str, force_reload: bool) -> SyncResult<()> {
        self.engine.trigger_update(url, force_reload)
    }

    pub fn apply(&mut self, event: &PageEvent) -> bool {
        self.stack.apply(event)
    }

    fn sync(&self) -> SyncResult<()> {
        self.engine
            .update_active_connections(self.stack.visible_urls(), self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sitemap() -> Sitemap {
        Sitemap {
            name: "demo".into(),
            label: "Demo".into(),
            homepage_link: "http://h/rest/sitemaps/demo/demo".into(),
        }
    }

    fn link(id: &str) -> LinkedPage {
        LinkedPage {
            id: Some(id.into()),
            title: Some(id.to_uppercase()),
            icon: None,
            icon_path: String::new(),
            link: format!("http://h/rest/sitemaps/demo/{id}"),
        }
    }

    fn updated(url: &str, title: &str) -> PageEvent {
        PageEvent::PageUpdated {
            url: url.into(),
            title: Some(title.into()),
            widgets: Vec::new(),
        }
    }

    #[test]
    fn open_page_pops_down_to_source() {
        let mut stack = PageStack::new();
        stack.open_sitemap(&sitemap());
        let root = sitemap().homepage_link;
        stack.open_page(link("a"), &root);
        stack.open_page(link("b"), "http://h/rest/sitemaps/demo/a");
        stack.open_page(link("c"), &root);
        assert_eq!(
            stack.visible_urls(),
            [root.as_str(), "http://h/rest/sitemaps/demo/c"]
        );
        assert_eq!(stack.current().and_then(|p| p.title.as_deref()), Some("C"));
    }

    #[test]
    fn open_url_reuses_stack_entries() {
        let mut stack = PageStack::new();
        stack.open_sitemap(&sitemap());
        let root = sitemap().homepage_link;
        stack.open_page(link("a"), &root);
        stack.open_page(link("b"), "http://h/rest/sitemaps/demo/a");
        stack.open_url("http://h/rest/sitemaps/demo/a");
        assert_eq!(stack.visible_urls().len(), 2);

        stack.open_url("http://h/rest/sitemaps/other/x");
        assert_eq!(
            stack.visible_urls(),
            [root.as_str(), "http://h/rest/sitemaps/other/x"]
        );
        assert!(stack.go_back());
        assert!(!stack.go_back());
        assert_eq!(stack.visible_urls(), [root]);
    }

    #[test]
    fn open_url_of_homepage_returns_to_root() {
        let mut stack = PageStack::new();
        stack.open_sitemap(&sitemap());
        let root = sitemap().homepage_link;
        stack.open_page(link("a"), &root);
        stack.open_url(&root);
        assert_eq!(stack.visible_urls(), [root.as_str()]);
        assert!(!stack.can_go_back());

        assert!(stack.apply(&updated(&root, "Home")));
        let current = stack.current().expect("current page");
        assert_eq!(current.url, root);
        assert!(current.loaded);
        assert_eq!(current.title.as_deref(), Some("Home"));
    }

    #[test]
    fn pending_loads_complete_once_all_pages_arrive() {
        let mut stack = PageStack::new();
        stack.open_sitemap(&sitemap());
        let root = sitemap().homepage_link;
        stack.open_page(link("a"), &root);
        assert!(stack.is_loading());

        assert!(!stack.apply(&updated(&root, "Home")));
        assert!(stack.apply(&updated("http://h/rest/sitemaps/demo/a", "A")));
        assert!(!stack.is_loading());
        assert_eq!(stack.page(&root).and_then(|p| p.title.as_deref()), Some("Home"));
        assert!(stack.page(&root).is_some_and(|p| p.loaded));

        // updates for pages not on the stack are ignored
        assert!(!stack.apply(&updated("http://h/elsewhere", "x")));
    }

    #[test]
    fn going_back_drops_pending_load_of_popped_page() {
        let mut stack = PageStack::new();
        stack.open_sitemap(&sitemap());
        let root = sitemap().homepage_link;
        stack.apply(&updated(&root, "Home"));
        stack.open_page(link("a"), &root);
        assert!(stack.is_loading());
        stack.go_back();
        assert!(!stack.is_loading());
    }

    #[test]
    fn title_updates_reach_the_page() {
        let mut stack = PageStack::new();
        stack.open_sitemap(&sitemap());
        let root = sitemap().homepage_link;
        stack.apply(&PageEvent::TitleUpdated {
            url: root.clone(),
            title: "Renamed".into(),
        });
        assert_eq!(stack.current().and_then(|p| p.title.as_deref()), Some("Renamed"));
    }
}
