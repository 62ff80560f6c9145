use std::time::{Duration, Instant};

use group_buy_engine::DistributedLock;

mod support;
use support::{setup, tear_down};

const LEASE: Duration = Duration::from_secs(10);

#[tokio::test]
async fn only_one_holder_at_a_time() {
    let db = setup().await;
    let node_a = db.lock_provider();
    let node_b = db.lock_provider().with_poll_interval(Duration::from_millis(10));
    assert!(node_a.try_lock("create_order:1:alice", Duration::ZERO, LEASE).await.unwrap());

    let start = Instant::now();
    assert!(!node_b.try_lock("create_order:1:alice", Duration::from_millis(100), LEASE).await.unwrap());
    assert!(start.elapsed() >= Duration::from_millis(80));
    // Different keys do not interfere
    assert!(node_b.try_lock("create_order:1:bob", Duration::ZERO, LEASE).await.unwrap());

    // Only the holder can unlock
    assert!(!node_b.unlock("create_order:1:alice").await.unwrap());
    assert!(node_a.unlock("create_order:1:alice").await.unwrap());
    assert!(!node_a.unlock("create_order:1:alice").await.unwrap());
    assert!(node_b.try_lock("create_order:1:alice", Duration::ZERO, LEASE).await.unwrap());
    tear_down(db).await;
}

#[tokio::test]
async fn waiter_gets_the_lock_once_it_is_released() {
    let db = setup().await;
    let node_a = db.lock_provider();
    let node_b = db.lock_provider().with_poll_interval(Duration::from_millis(10));
    assert!(node_a.try_lock("k", Duration::ZERO, LEASE).await.unwrap());
    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        node_a.unlock("k").await.unwrap()
    });
    assert!(node_b.try_lock("k", Duration::from_secs(2), LEASE).await.unwrap());
    assert!(releaser.await.unwrap());
    tear_down(db).await;
}

#[tokio::test]
async fn leases_expire() {
    let db = setup().await;
    let node_a = db.lock_provider();
    let node_b = db.lock_provider().with_poll_interval(Duration::from_millis(10));
    assert!(node_a.try_lock("k", Duration::ZERO, Duration::from_millis(50)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(node_b.try_lock("k", Duration::ZERO, LEASE).await.unwrap());
    // node_a's lease is gone, so it cannot release node_b's lock
    assert!(!node_a.unlock("k").await.unwrap());
    assert!(node_b.unlock("k").await.unwrap());
    tear_down(db).await;
}

#[tokio::test]
async fn markers_are_set_once_until_deleted_or_expired() {
    let db = setup().await;
    let locks = db.lock_provider();
    assert!(locks.set_if_absent("refund:TRD1", LEASE).await.unwrap());
    assert!(!locks.set_if_absent("refund:TRD1", LEASE).await.unwrap());
    assert!(locks.delete("refund:TRD1").await.unwrap());
    assert!(!locks.delete("refund:TRD1").await.unwrap());
    assert!(locks.set_if_absent("refund:TRD1", Duration::from_millis(30)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(locks.set_if_absent("refund:TRD1", LEASE).await.unwrap());
    tear_down(db).await;
}
