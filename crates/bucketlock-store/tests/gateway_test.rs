//! Marker gateway behaviour shared by the in-memory and object_store backends

use std::sync::Arc;

use bucketlock_store::{InMemoryGateway, MarkerGateway, ObjectStoreGateway};
use object_store::memory::InMemory;
use object_store::path::Path;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Create,
    Delete,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Create), Just(Op::Delete)]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn check_exists_follows_last_op(gateway: &dyn MarkerGateway, key: &str, ops: &[Op]) {
    assert!(!gateway.exists(key).await.unwrap());
    for op in ops {
        match op {
            Op::Create => gateway.create_marker(key).await.unwrap(),
            Op::Delete => gateway.delete(key).await.unwrap(),
        }
        let expected = matches!(op, Op::Create);
        assert_eq!(gateway.exists(key).await.unwrap(), expected);
    }
}

proptest! {
    #[test]
    fn in_memory_exists_follows_last_op(
        suffix in 0u32..1_000_000,
        ops in prop::collection::vec(op_strategy(), 1..20),
    ) {
        let key = format!("PREFIX-{:06}", suffix);
        let gateway = InMemoryGateway::new();
        runtime().block_on(check_exists_follows_last_op(&gateway, &key, &ops));
    }

    #[test]
    fn object_store_exists_follows_last_op(
        suffix in 0u32..1_000_000,
        ops in prop::collection::vec(op_strategy(), 1..20),
    ) {
        let key = format!("PREFIX-{:06}", suffix);
        let gateway = ObjectStoreGateway::new(Arc::new(InMemory::new()));
        runtime().block_on(check_exists_follows_last_op(&gateway, &key, &ops));
    }
}

#[tokio::test]
async fn test_object_store_list_by_prefix() {
    let gateway = ObjectStoreGateway::new(Arc::new(InMemory::new()));
    gateway.create_marker("ACCESS_FILE_000001").await.unwrap();
    gateway.create_marker("ACCESS_FILE_000002").await.unwrap();
    gateway.create_marker("data/ACCESS_FILE_000003").await.unwrap();
    gateway.create_marker("channel_0.dat").await.unwrap();

    let mut keys: Vec<String> = gateway
        .list_by_prefix("ACCESS_FILE_")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["ACCESS_FILE_000001", "ACCESS_FILE_000002"]);
}

#[tokio::test]
async fn test_object_store_list_nested_prefix_with_root() {
    let store = Arc::new(InMemory::new());
    let gateway = ObjectStoreGateway::with_root(store.clone(), Path::from("storage"));
    gateway.create_marker("locks/ACCESS_FILE_000001").await.unwrap();
    gateway.create_marker("locks/OTHER").await.unwrap();

    let markers = gateway.list_by_prefix("locks/ACCESS_FILE_").await.unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].key, "locks/ACCESS_FILE_000001");

    // The root is part of the real object location
    let unrooted = ObjectStoreGateway::new(store);
    assert!(
        unrooted
            .exists("storage/locks/ACCESS_FILE_000001")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_object_store_delete_missing_key() {
    let gateway = ObjectStoreGateway::new(Arc::new(InMemory::new()));
    gateway.delete("ACCESS_FILE_404404").await.unwrap();
    assert!(!gateway.exists("ACCESS_FILE_404404").await.unwrap());
}

#[tokio::test]
async fn test_object_store_marker_refresh() {
    let gateway = ObjectStoreGateway::new(Arc::new(InMemory::new()));
    gateway.create_marker("ACCESS_FILE_000001").await.unwrap();
    let first = gateway.list_by_prefix("ACCESS_FILE_").await.unwrap()[0].last_modified;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    gateway.create_marker("ACCESS_FILE_000001").await.unwrap();
    let second = gateway.list_by_prefix("ACCESS_FILE_").await.unwrap()[0].last_modified;

    assert!(second > first);
}
