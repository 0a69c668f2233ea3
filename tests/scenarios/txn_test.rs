use chamber_store::Condition;
use chamber_store::ConditionError;
use chamber_store::Error;
use chamber_store::Record;
use chamber_store::Request;

use crate::common::cluster;
use crate::common::connect;

#[tokio::test]
async fn test_write_update_read_scenario() {
    let cluster = cluster();
    let store = connect(&cluster).await;

    let r1 = store
        .write_txn(&Request::new("create k1").write("k1", "v1", Condition::Create))
        .await
        .unwrap()
        .revision;
    assert!(r1 > 0);

    let r2 = store
        .write_txn(&Request::new("update k1").write("k1", "v2", Condition::RevisionEqual(r1)))
        .await
        .unwrap()
        .revision;
    assert!(r2 > r1);

    let read = store
        .read_txn(&Request::new("read k1").key("k1", Condition::Unconditional))
        .await
        .unwrap();
    assert_eq!(read.records.len(), 1);
    assert_eq!(read.records["k1"], Record::new(r2, "v2"));
}

#[tokio::test]
async fn test_delete_required_on_absent_key() {
    let cluster = cluster();
    let store = connect(&cluster).await;

    let result = store
        .delete_txn(&Request::new("delete kX").key("kX", Condition::Required))
        .await;
    assert_eq!(result, Err(Error::from(ConditionError::NotFound { key: "kX".to_string() })));
}

#[tokio::test]
async fn test_multi_key_write_is_atomic() {
    let cluster = cluster();
    let store = connect(&cluster).await;

    let seeded = store
        .write_txn(
            &Request::new("seed")
                .write("servers/s1", "idle", Condition::Create)
                .write("servers/s2", "idle", Condition::Create),
        )
        .await
        .unwrap();
    let before = store.list_with_prefix("servers/").await.unwrap();

    let result = store
        .write_txn(
            &Request::new("assign")
                .write("servers/s1", "busy", Condition::RevisionEqual(seeded.revision))
                .write("servers/s2", "busy", Condition::RevisionGreater(seeded.revision))
                .write("servers/s3", "busy", Condition::Create),
        )
        .await;
    assert!(matches!(
        result,
        Err(Error::Condition(ConditionError::ConditionFail { ref key, .. })) if key == "servers/s2"
    ));

    let after = store.list_with_prefix("servers/").await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_revisions_are_global_and_increasing() {
    let cluster = cluster();
    let store = connect(&cluster).await;

    let mut last = 0;
    for i in 0..5 {
        let revision = store
            .write_txn(&Request::new("seq").write(format!("seq/{i}"), "v", Condition::Create))
            .await
            .unwrap()
            .revision;
        assert!(revision > last);
        last = revision;
    }

    let listed = store.list_with_prefix("seq/").await.unwrap();
    assert_eq!(listed.revision, last);
    assert_eq!(listed.records.len(), 5);

    let deleted = store.delete_with_prefix("seq/").await.unwrap();
    assert!(deleted.revision > last);
    assert!(store.list_with_prefix("seq/").await.unwrap().records.is_empty());
}

#[tokio::test]
async fn test_empty_prefix_listing_is_not_an_error() {
    let cluster = cluster();
    let store = connect(&cluster).await;

    let listed = store.list_with_prefix("nothing-here/").await.unwrap();
    assert!(listed.records.is_empty());
    assert_eq!(listed.revision, cluster.revision());
}
