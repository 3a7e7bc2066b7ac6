//! Sitemap Sync: keeps the visible pages of an openHAB sitemap live.
//!
//! Responsibilities:
//! - one long-polling subscription per visible page, continued with the
//!   server's tracking id and restarted on failure
//! - parsing page bodies (JSON or legacy XML) into typed widget trees
//! - following server-sent widget events on servers that offer them
//! - reconciling subscriptions with the pages a navigation layer shows

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
pub mod listener;
pub mod model;
pub mod navigation;
pub mod registry;
pub mod server;
pub mod source;
pub mod subscription;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{ParseError, SyncError, SyncResult};
pub use http::{ClientHandle, HttpPageClient, PageClient, PageRequest, PageResponse};
pub use listener::{PageEvent, PageListener};
pub use model::{Item, ItemType, LinkedPage, Sitemap, Widget, WidgetType};
pub use navigation::{Navigator, PageStack, PageView};
pub use registry::{Completion, StopReason, SubscriptionRegistry};
pub use server::{IconFormat, ResponseFormat, ServerProperties};
pub use subscription::{PageSubscription, SubscriptionState};
