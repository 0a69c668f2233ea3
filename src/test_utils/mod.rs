//! Shared fixtures for the unit tests
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::Change;
use crate::ChangeFeed;
use crate::Commit;
use crate::MemCluster;
use crate::MockConnector;
use crate::MockStoreDriver;
use crate::Record;
use crate::Revision;
use crate::Snapshot;
use crate::Store;
use crate::StoreConfig;
use crate::StoreDriver;
use crate::TestNamespaceConfig;
use crate::WatchEvent;

pub(crate) const ENDPOINT: &str = "http://127.0.0.1:2379";

/// Config rooted under a per-connection test namespace
pub(crate) fn test_config() -> StoreConfig {
    StoreConfig {
        endpoints: vec![ENDPOINT.to_string()],
        test_namespace: TestNamespaceConfig {
            use_test_namespace: true,
            clean_on_connect: true,
            uniquify: true,
        },
        ..Default::default()
    }
}

pub(crate) fn mem_cluster() -> MemCluster {
    MemCluster::new(vec![ENDPOINT.to_string()])
}

/// Store on a fresh cluster, not yet connected
pub(crate) fn mem_store() -> (Store, MemCluster) {
    let cluster = mem_cluster();
    let store = Store::new(test_config(), Arc::new(cluster.clone()));
    (store, cluster)
}

/// Connected store on a fresh cluster
pub(crate) async fn connected_store() -> (Store, MemCluster) {
    let (store, cluster) = mem_store();
    store.connect().await.unwrap();
    (store, cluster)
}

/// Store whose connector hands out `driver`
pub(crate) async fn connected_mock_store(driver: MockStoreDriver) -> Store {
    let driver: Arc<dyn StoreDriver> = Arc::new(driver);
    let mut connector = MockConnector::new();
    connector.expect_connect().returning(move |_| Ok(driver.clone()));

    let config = StoreConfig {
        test_namespace: TestNamespaceConfig::default(),
        ..test_config()
    };
    let store = Store::new(config, Arc::new(connector));
    store.connect().await.unwrap();
    store
}

/// Mock driver whose guarded commits always lose to a concurrent writer
pub(crate) fn contended_driver(revision: Revision) -> MockStoreDriver {
    let mut driver = MockStoreDriver::new();
    driver.expect_fetch().returning(move |_| {
        Ok(Snapshot {
            revision,
            records: Default::default(),
        })
    });
    driver.expect_commit().returning(move |_, _| {
        Ok(Commit {
            succeeded: false,
            revision,
            records: Default::default(),
        })
    });
    driver.expect_close().returning(|| ());
    driver
}

/// Raw change for feeding a delivery task by hand
pub(crate) fn change(
    key: &str,
    revision: Revision,
    current: Option<&str>,
    previous: Option<(Revision, &str)>,
) -> Change {
    Change {
        key: key.to_string(),
        revision,
        current: current.map(|v| Record::new(revision, v)),
        previous: previous.map(|(r, v)| Record::new(r, v)),
    }
}

pub(crate) fn feed() -> (mpsc::Sender<Change>, ChangeFeed) {
    mpsc::channel(16)
}

/// Next event within one second
pub(crate) async fn next_event(events: &mut mpsc::Receiver<WatchEvent>) -> WatchEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for a watch event")
        .expect("watch ended")
}

/// Let spawned tasks run to quiescence
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
