use std::sync::Arc;
use std::time::Duration;

use chamber_store::Condition;
use chamber_store::Error;
use chamber_store::KeyRoot;
use chamber_store::LifecycleError;
use chamber_store::Request;
use chamber_store::Store;
use tracing_test::traced_test;

use crate::common::cluster;
use crate::common::config;
use crate::common::connect;
use crate::common::ENDPOINTS;

#[tokio::test]
#[traced_test]
async fn test_connect_use_disconnect_reconnect() {
    let cluster = cluster();
    let store = Store::new(config(), Arc::new(cluster.clone()));

    assert_eq!(
        store.create(KeyRoot::Users, "alice", "v").await,
        Err(Error::from(LifecycleError::NotConnected))
    );

    store.connect().await.unwrap();
    let namespace = store.namespace().unwrap();
    store.create(KeyRoot::Users, "alice", "v").await.unwrap();
    assert!(cluster.get(&format!("{namespace}/users/alice")).is_some());

    store.disconnect().await.unwrap();
    store.disconnect().await.unwrap();
    assert_eq!(
        store.read(KeyRoot::Users, "alice").await,
        Err(Error::from(LifecycleError::NotConnected))
    );

    // a fresh connection gets a fresh, clean namespace
    store.connect().await.unwrap();
    assert_ne!(store.namespace().unwrap(), namespace);
    assert_eq!(store.read(KeyRoot::Users, "alice").await, Ok(None));
    store.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_membership_change_refreshes_connections() {
    let cluster = cluster();
    let store = connect(&cluster).await;

    let members = store.get_cluster_members().await.unwrap();
    assert_eq!(members.len(), 3);
    let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["member-1", "member-2", "member-3"]);

    cluster.remove_member(2);
    store.update_cluster_connections().await.unwrap();
    assert_eq!(
        store.connected_endpoints().unwrap(),
        vec![ENDPOINTS[0].to_string(), ENDPOINTS[2].to_string()]
    );

    store.disconnect().await.unwrap();
    assert_eq!(store.connected_endpoints(), None);
}

#[tokio::test]
async fn test_partition_surfaces_backend_errors() {
    let cluster = cluster();
    let store = connect(&cluster).await;
    store.create(KeyRoot::Inventory, "rack", "v").await.unwrap();

    cluster.set_reachable(false);
    let err = store.read(KeyRoot::Inventory, "rack").await.unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert!(err.is_retryable());

    cluster.set_reachable(true);
    assert!(store.read(KeyRoot::Inventory, "rack").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_slow_cluster_hits_request_timeout_without_side_effects() {
    let cluster = cluster();
    let store = connect(&cluster).await;
    store.set_timeout_request(Duration::from_millis(50));
    let revision = cluster.revision();

    cluster.set_latency(Duration::from_millis(500));
    let result = store
        .write_txn(&Request::new("slow").write("k", "v", Condition::Unconditional))
        .await;
    assert!(matches!(result, Err(Error::Backend(_))));

    cluster.set_latency(Duration::ZERO);
    assert_eq!(cluster.revision(), revision);
}
