use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use futures_util::FutureExt;
use group_buy_engine::{
    db_types::{NotifyConfig, TradeOrder},
    events::{EventHandlers, EventHooks},
    order_objects::LockOrderOutcome,
    NotificationTaskManagement,
    SettlementApi,
};
use log::*;

mod support;
use support::{activity, callback_for, flow_api_with_producers, lock_request, seed_catalog, setup, tear_down};

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

fn locked_leg(outcome: LockOrderOutcome) -> TradeOrder {
    match outcome {
        LockOrderOutcome::Locked { trade_order, .. } => trade_order,
        other => panic!("Expected a locked slot, got {other:?}"),
    }
}

#[tokio::test]
async fn team_lifecycle_fires_hooks_and_settles() {
    let db = setup().await;
    seed_catalog(&db, &activity(2)).await;
    let created = HookCalled::default();
    let joined = HookCalled::default();
    let paid = HookCalled::default();
    let completed = HookCalled::default();

    let mut hooks = EventHooks::default();
    let c = created.clone();
    hooks.on_order_created(move |ev| {
        info!("🪝️ Team created: {}", ev.order.order_id);
        c.called();
        async {}.boxed()
    });
    let j = joined.clone();
    hooks.on_user_joined(move |ev| {
        info!("🪝️ {} joined {}", ev.trade_order.user_id, ev.order.order_id);
        j.called();
        async {}.boxed()
    });
    let p = paid.clone();
    hooks.on_payment_completed(move |_| {
        p.called();
        async {}.boxed()
    });
    let settlement = Arc::new(SettlementApi::new(db.clone(), 3));
    let done = completed.clone();
    hooks.on_group_complete(move |ev| {
        let settlement = Arc::clone(&settlement);
        let done = done.clone();
        async move {
            assert!(!ev.virtual_completion);
            let result = settlement.settle_completed_order(&ev.order.order_id).await.expect("Settlement failed");
            assert_eq!(result.settled.len(), 2);
            done.called();
        }
        .boxed()
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    let worker = tokio::spawn(handlers.start_handlers());

    let api = flow_api_with_producers(&db, producers);
    let notify = NotifyConfig::mq("group-buy.settled");
    let leader = locked_leg(api.lock_order(lock_request("alice", "out-1").with_notify(notify.clone())).await.unwrap());
    let member = locked_leg(
        api.lock_order(lock_request("bob", "out-2").with_notify(notify).joining(leader.order_id.clone()))
            .await
            .unwrap(),
    );
    api.process_payment_callback(callback_for(&leader, "cb-1")).await.unwrap();
    api.process_payment_callback(callback_for(&member, "cb-2")).await.unwrap();
    // A redelivered callback fires nothing
    api.process_payment_callback(callback_for(&member, "cb-2")).await.unwrap();

    drop(api);
    worker.await.unwrap();
    // The handlers run detached; give them a moment to drain
    for _ in 0..50 {
        if completed.count() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(created.count(), 1);
    assert_eq!(joined.count(), 1);
    assert_eq!(paid.count(), 2);
    assert_eq!(completed.count(), 1);
    assert_eq!(db.find_by_trade_order_id(&leader.trade_order_id).await.unwrap().len(), 1);
    assert_eq!(db.find_by_trade_order_id(&member.trade_order_id).await.unwrap().len(), 1);
    tear_down(db).await;
}
