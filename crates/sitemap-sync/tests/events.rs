mod support;

use sitemap_sync::{PageEvent, ServerProperties, SubscriptionState};
use support::Harness;

const PAGE_URL: &str = "http://openhab.local/rest/sitemaps/demo/0001";

const PAGE: &str = r#"{
    "id": "0001",
    "title": "Living Room",
    "widgets": [
        {"widgetId": "000100", "type": "Switch", "label": "Lamp",
         "item": {"name": "Lamp", "type": "Switch", "state": "OFF"}},
        {"widgetId": "000101", "type": "Text", "label": "Window", "visibility": true}
    ]
}"#;

fn sse_server() -> ServerProperties {
    ServerProperties {
        sse: true,
        ..ServerProperties::json()
    }
}

/// Starts the page and delivers its first body; events take over afterwards.
async fn loaded(server: ServerProperties) -> (Harness, support::EventSubscription) {
    let mut h = Harness::with_events(server, true);
    h.track(&[PAGE_URL]);
    h.registry.start();
    let request = h.script.next_request().await;
    assert!(!request.is_long_poll());
    let subscription = h.script.next_subscription().await;
    assert_eq!(subscription.sitemap, "demo");
    assert_eq!(subscription.page_id, "0001");

    request.respond(PAGE, Some("t1"));
    h.pump().await;
    assert!(matches!(h.page_event(), Some(PageEvent::PageUpdated { .. })));
    (h, subscription)
}

#[tokio::test]
async fn events_replace_long_polling() {
    let (mut h, _events) = loaded(sse_server()).await;
    assert!(h.script.no_request().await);
    let subscription = h.registry.subscription(PAGE_URL).expect("tracked");
    assert!(subscription.follows_events());
    assert!(!subscription.has_request_in_flight());
    assert_eq!(subscription.state(), SubscriptionState::LongPolling);
}

#[tokio::test]
async fn widget_events_update_in_place() {
    let (mut h, events) = loaded(sse_server()).await;

    events.push(
        r#"{"widgetId":"000100","label":"Lamp [ON]",
            "item":{"name":"Lamp","type":"Switch","state":"ON"}}"#,
    );
    h.pump().await;
    match h.page_event() {
        Some(PageEvent::WidgetUpdated { url, widget }) => {
            assert_eq!(url, PAGE_URL);
            assert_eq!(widget.label, "Lamp [ON]");
            assert_eq!(widget.state.as_deref(), Some("ON"));
        }
        other => panic!("expected widget update, got {other:?}"),
    }
    let cached = h
        .registry
        .subscription(PAGE_URL)
        .and_then(|s| s.last_widgets())
        .expect("widgets");
    assert_eq!(cached[0].label, "Lamp [ON]");
    assert!(h.script.no_request().await);
}

#[tokio::test]
async fn page_events_update_the_title() {
    let (mut h, events) = loaded(sse_server()).await;
    events.push(r#"{"widgetId":"0001","label":"Lounge"}"#);
    h.pump().await;
    assert_eq!(
        h.page_event(),
        Some(PageEvent::TitleUpdated {
            url: PAGE_URL.into(),
            title: "Lounge".into()
        })
    );
    assert_eq!(
        h.registry.subscription(PAGE_URL).and_then(|s| s.last_title()),
        Some("Lounge")
    );
}

#[tokio::test]
async fn alive_and_garbage_events_are_ignored() {
    let (mut h, events) = loaded(sse_server()).await;
    events.push(r#"{"TYPE":"ALIVE"}"#);
    h.pump().await;
    events.push("<<not json>>");
    h.pump().await;
    assert!(h.page_event().is_none());
    assert!(h.script.no_request().await);
}

#[tokio::test]
async fn sitemap_change_reloads_page() {
    let (mut h, events) = loaded(sse_server()).await;
    events.push(r#"{"TYPE":"SITEMAP_CHANGED","sitemapName":"demo","pageId":"0001"}"#);
    h.pump().await;

    let reload = h.script.next_request().await;
    assert!(!reload.is_long_poll());
    assert_eq!(reload.tracking_id(), Some("0"));
    let resubscribed = h.script.next_subscription().await;
    assert_eq!(resubscribed.page_id, "0001");
    assert!(events.is_closed());
}

#[tokio::test]
async fn untrusted_visibility_change_reloads_on_old_servers() {
    let (mut h, events) = loaded(sse_server()).await;
    events.push(r#"{"widgetId":"000101","label":"Window","visibility":false}"#);
    h.pump().await;
    assert!(h.page_event().is_none());
    assert!(!h.script.next_request().await.is_long_poll());
}

#[tokio::test]
async fn visibility_change_applies_on_servers_with_invisible_widgets() {
    let server = ServerProperties {
        invisible_widgets: true,
        ..sse_server()
    };
    let (mut h, events) = loaded(server).await;
    events.push(r#"{"widgetId":"000101","label":"Window","visibility":false}"#);
    h.pump().await;
    match h.page_event() {
        Some(PageEvent::WidgetUpdated { widget, .. }) => assert!(!widget.visibility),
        other => panic!("expected widget update, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_widget_reloads_page() {
    let (mut h, events) = loaded(sse_server()).await;
    events.push(r#"{"widgetId":"999999","label":"Hidden"}"#);
    h.pump().await;
    assert!(!h.script.next_request().await.is_long_poll());
}

#[tokio::test]
async fn broken_stream_reconnects() {
    let (mut h, events) = loaded(sse_server()).await;
    events.fail("connection reset");
    h.pump().await;
    let again = h.script.next_subscription().await;
    assert_eq!(again.sitemap, "demo");
    assert!(h.script.no_request().await);
}

#[tokio::test]
async fn unsupported_events_fall_back_to_long_polling() {
    let mut h = Harness::with_events(sse_server(), false);
    h.track(&[PAGE_URL]);
    h.registry.start();
    let request = h.script.next_request().await;
    // the failed subscription is reported first
    h.pump().await;
    assert!(!h
        .registry
        .subscription(PAGE_URL)
        .expect("tracked")
        .follows_events());

    request.respond(PAGE, Some("t1"));
    h.pump().await;
    let long_poll = h.script.next_request().await;
    assert!(long_poll.is_long_poll());
    assert_eq!(long_poll.tracking_id(), Some("t1"));
}

#[tokio::test]
async fn short_urls_never_subscribe() {
    let mut h = Harness::with_events(sse_server(), true);
    h.track(&["http://openhab.local/demo"]);
    h.registry.start();
    let _request = h.script.next_request().await;
    assert!(!h
        .registry
        .subscription("http://openhab.local/demo")
        .expect("tracked")
        .follows_events());
}
