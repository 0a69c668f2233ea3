use std::time::Duration;

use chamber_store::KeyRoot;
use chamber_store::Watch;
use chamber_store::WatchEvent;
use chamber_store::WatchEventType;

use crate::common::cluster;
use crate::common::connect;

async fn next(watch: &mut Watch) -> WatchEvent {
    tokio::time::timeout(Duration::from_secs(1), watch.recv())
        .await
        .expect("timed out waiting for a watch event")
        .expect("watch ended")
}

#[tokio::test]
async fn test_record_lifecycle_events() {
    let cluster = cluster();
    let store = connect(&cluster).await;
    let mut watch = store.watch(KeyRoot::Workloads, "job-7").await.unwrap();

    let r1 = store.create(KeyRoot::Workloads, "job-7", "queued").await.unwrap();
    let r2 = store.update(KeyRoot::Workloads, "job-7", r1, "running").await.unwrap();
    let r3 = store.delete(KeyRoot::Workloads, "job-7", r2).await.unwrap();

    let events = [next(&mut watch).await, next(&mut watch).await, next(&mut watch).await];
    let types: Vec<WatchEventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![WatchEventType::Create, WatchEventType::Update, WatchEventType::Delete]
    );
    assert_eq!(
        events.iter().map(|e| e.revision).collect::<Vec<_>>(),
        vec![r1, r2, r3]
    );
    for pair in events.windows(2) {
        assert_eq!(pair[1].old_revision, pair[0].new_revision);
        assert_eq!(pair[1].old_value, pair[0].new_value);
    }

    watch.close().await.unwrap();
    assert!(watch.close().await.is_err());
}

#[tokio::test]
async fn test_independent_subscriptions_each_see_their_keys() {
    let cluster = cluster();
    let store = connect(&cluster).await;
    let mut users = store.watch_with_prefix(KeyRoot::Users, "").await.unwrap();
    let mut inventory = store.watch_with_prefix(KeyRoot::Inventory, "").await.unwrap();

    store.create(KeyRoot::Users, "alice", "a").await.unwrap();
    store.create(KeyRoot::Inventory, "rack-1", "r").await.unwrap();
    store.create(KeyRoot::Users, "bob", "b").await.unwrap();

    assert_eq!(next(&mut users).await.key, "alice");
    assert_eq!(next(&mut users).await.key, "bob");
    assert_eq!(next(&mut inventory).await.key, "rack-1");

    users.close().await.unwrap();
    inventory.close().await.unwrap();
    assert_eq!(cluster.watcher_count(), 0);
}

#[tokio::test]
async fn test_disconnect_releases_every_subscription() {
    let cluster = cluster();
    let store = connect(&cluster).await;

    let mut watches = Vec::new();
    for i in 0..5 {
        watches.push(store.watch(KeyRoot::StoreTest, &format!("w{i}")).await.unwrap());
    }
    assert_eq!(cluster.watcher_count(), 5);

    store.disconnect().await.unwrap();
    for watch in &mut watches {
        let ended = tokio::time::timeout(Duration::from_secs(1), watch.recv()).await;
        assert_eq!(ended, Ok(None));
    }
    assert_eq!(cluster.watcher_count(), 0);
}
