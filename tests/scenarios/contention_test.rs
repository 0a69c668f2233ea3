use std::sync::Arc;

use chamber_store::Condition;
use chamber_store::KeyRoot;
use chamber_store::Request;
use chamber_store::Store;

use crate::common::cluster;
use crate::common::connect;

const WORKERS: usize = 8;
const INCREMENTS: usize = 25;

/// Read-modify-write with caller-side retry on stale revisions
async fn increment(store: &Store) {
    loop {
        let record = store.read_required(KeyRoot::StoreTest, "counter").await.unwrap();
        let value: u64 = record.value.parse().unwrap();
        match store
            .update(KeyRoot::StoreTest, "counter", record.revision, (value + 1).to_string())
            .await
        {
            Ok(_) => return,
            Err(e) if e.is_retryable() => continue,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() {
    let cluster = cluster();
    let store = connect(&cluster).await;
    store.create(KeyRoot::StoreTest, "counter", "0").await.unwrap();

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..INCREMENTS {
                    increment(&store).await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let record = store.read_required(KeyRoot::StoreTest, "counter").await.unwrap();
    assert_eq!(record.value, (WORKERS * INCREMENTS).to_string());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_have_one_winner() {
    let cluster = cluster();
    let store = connect(&cluster).await;

    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .write_txn(&Request::new("claim").write("lease", format!("worker-{i}"), Condition::Create))
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
