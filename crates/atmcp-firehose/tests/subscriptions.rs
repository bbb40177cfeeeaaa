//! Subscriber fan-out and the recent-events buffer

mod common;

use std::sync::Arc;
use std::time::Duration;

use atmcp_firehose::{CollectionFilter, EventKind, EventStreamClient, StreamConfig, StreamEvent};
use common::{Script, ScriptedConnector, commit_frame, endpoint, identity_frame};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::time::sleep;

fn recorder() -> (Arc<Mutex<Vec<u64>>>, impl Fn(&StreamEvent) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &StreamEvent| sink.lock().push(event.sequence))
}

fn sequences(events: &[StreamEvent]) -> Vec<u64> {
    events.iter().map(|e| e.sequence).collect()
}

#[tokio::test(start_paused = true)]
async fn test_filtered_and_unfiltered_subscribers() {
    let connector = ScriptedConnector::new([Script::serve(vec![
        commit_frame(10, "app.bsky.feed.post"),
        commit_frame(11, "app.bsky.feed.like"),
        identity_frame(12),
        commit_frame(13, "app.bsky.graph.follow"),
    ])]);
    let client = EventStreamClient::with_connector(
        StreamConfig::new(endpoint()),
        Arc::new(connector.clone()),
    );

    let (all, all_cb) = recorder();
    let (posts, posts_cb) = recorder();
    let (social, social_cb) = recorder();
    client.subscribe("all", CollectionFilter::default(), all_cb);
    client.subscribe("posts", CollectionFilter::new(["post"]), posts_cb);
    client.subscribe(
        "social",
        CollectionFilter::new(["like", "app.bsky.graph.follow"]),
        social_cb,
    );

    client.connect();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(*all.lock(), vec![10, 11, 12, 13]);
    assert_eq!(*posts.lock(), vec![10]);
    assert_eq!(*social.lock(), vec![11, 13]);

    let status = client.status();
    assert!(status.connected);
    assert_eq!(status.subscription_count, 3);
    assert_eq!(status.buffered_events, 4);
    assert_eq!(status.last_sequence, Some(13));

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_and_replace() {
    let connector = ScriptedConnector::new([Script::serve(vec![commit_frame(
        1,
        "app.bsky.feed.post",
    )])]);
    let client = EventStreamClient::with_connector(
        StreamConfig::new(endpoint()),
        Arc::new(connector.clone()),
    );

    let (first, first_cb) = recorder();
    let (second, second_cb) = recorder();
    let (gone, gone_cb) = recorder();
    client.subscribe("feed", CollectionFilter::default(), first_cb);
    client.subscribe("feed", CollectionFilter::new(["post"]), second_cb);
    client.subscribe("temp", CollectionFilter::default(), gone_cb);
    assert!(client.unsubscribe("temp"));
    assert!(!client.unsubscribe("temp"));

    client.connect();
    sleep(Duration::from_secs(1)).await;

    assert!(first.lock().is_empty());
    assert_eq!(*second.lock(), vec![1]);
    assert!(gone.lock().is_empty());
    assert_eq!(client.status().subscription_count, 1);

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_frames_are_dropped() {
    let connector = ScriptedConnector::new([Script::serve(vec![
        "not json".to_string(),
        r#"{"kind":"commit"}"#.to_string(),
        commit_frame(5, "app.bsky.feed.post"),
    ])]);
    let client = EventStreamClient::with_connector(
        StreamConfig::new(endpoint()),
        Arc::new(connector.clone()),
    );
    let (all, all_cb) = recorder();
    client.subscribe("all", CollectionFilter::default(), all_cb);

    client.connect();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(*all.lock(), vec![5]);
    assert_eq!(client.status().buffered_events, 1);
    // Still on the first socket
    assert_eq!(connector.connect_count(), 1);

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_recent_events_newest_first_with_filter() {
    let connector = ScriptedConnector::new([Script::serve(vec![
        commit_frame(1, "app.bsky.feed.post"),
        commit_frame(2, "app.bsky.feed.like"),
        commit_frame(3, "app.bsky.feed.post"),
        identity_frame(4),
        commit_frame(5, "app.bsky.feed.post"),
    ])]);
    let config = StreamConfig::new(endpoint()).with_buffer_capacity(4);
    let client = EventStreamClient::with_connector(config, Arc::new(connector.clone()));

    client.connect();
    sleep(Duration::from_secs(1)).await;

    // Capacity 4 evicted the first event
    assert_eq!(sequences(&client.recent_events(10, None)), vec![5, 4, 3, 2]);
    assert_eq!(sequences(&client.recent_events(2, None)), vec![5, 4]);
    assert_eq!(sequences(&client.recent_events(10, Some("post"))), vec![5, 3]);
    assert_eq!(
        sequences(&client.recent_events(10, Some("app.bsky.feed.like"))),
        vec![2]
    );
    assert!(client.recent_events(0, None).is_empty());

    let newest = &client.recent_events(1, None)[0];
    assert_eq!(newest.kind, EventKind::Commit);
    assert_eq!(
        newest.uri().as_deref(),
        Some("at://did:plc:author/app.bsky.feed.post/rk5")
    );

    client.disconnect().await;
}

#[tokio::test]
async fn test_status_before_connect() {
    let client = EventStreamClient::with_connector(
        StreamConfig::new(endpoint()),
        Arc::new(ScriptedConnector::default()),
    );
    let status = client.status();
    assert!(!status.connected);
    assert_eq!(status.endpoint, "wss://jetstream.test/subscribe");
    assert_eq!(status.last_sequence, None);
    assert_eq!(status.buffered_events, 0);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"], "disconnected");
}
