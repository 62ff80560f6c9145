use group_buy_engine::{
    db_types::{NotificationTaskStatus, NotifyConfig, NotifyType, OrderStatusType, TradeOrder, TradeOrderStatus},
    order_objects::LockOrderOutcome,
    NotificationTaskManagement,
    SettlementApi,
    SettlementError,
    TradeOrderManagement,
};

mod support;
use support::{activity, callback_for, flow_api, lock_request, seed_catalog, setup, tear_down};

fn locked_leg(outcome: LockOrderOutcome) -> TradeOrder {
    match outcome {
        LockOrderOutcome::Locked { trade_order, .. } => trade_order,
        other => panic!("Expected a locked slot, got {other:?}"),
    }
}

#[tokio::test]
async fn completed_team_is_settled_once() {
    let db = setup().await;
    seed_catalog(&db, &activity(2)).await;
    let flow = flow_api(&db);
    let settlement = SettlementApi::new(db.clone(), 3);
    let http = NotifyConfig::http("http://127.0.0.1:1/settled");
    let leader = locked_leg(flow.lock_order(lock_request("alice", "out-1").with_notify(http)).await.unwrap());
    let member = locked_leg(
        flow.lock_order(lock_request("bob", "out-2").joining(leader.order_id.clone())).await.unwrap(),
    );

    let err = settlement.settle_completed_order(&leader.order_id).await.unwrap_err();
    assert!(matches!(err, SettlementError::OrderNotCompleted(_, OrderStatusType::Pending)));

    flow.process_payment_callback(callback_for(&leader, "cb-1")).await.unwrap();
    flow.process_payment_callback(callback_for(&member, "cb-2")).await.unwrap();
    let result = settlement.settle_completed_order(&leader.order_id).await.unwrap();
    assert_eq!(result.order.status, OrderStatusType::Success);
    assert_eq!(result.settled.len(), 2);
    assert!(result.settled.iter().all(|t| t.status == TradeOrderStatus::Settled && t.settlement_time.is_some()));
    // Only the leader asked to be notified
    assert_eq!(result.tasks.len(), 1);
    let task = &result.tasks[0];
    assert_eq!(task.task_id, format!("NOTIFY-{}", leader.trade_order_id));
    assert_eq!(task.notify_type, NotifyType::Http);
    assert_eq!(task.notify_target, "http://127.0.0.1:1/settled");
    assert_eq!(task.status, NotificationTaskStatus::Pending);
    assert_eq!(task.max_retry_count, 3);
    let payload: serde_json::Value = serde_json::from_str(&task.payload).unwrap();
    assert_eq!(payload["tradeOrderId"], leader.trade_order_id.as_str());
    assert_eq!(payload["userId"], "alice");
    assert_eq!(payload["status"], "SETTLED");

    let again = settlement.settle_completed_order(&leader.order_id).await.unwrap();
    assert!(again.settled.is_empty());
    assert!(again.tasks.is_empty());
    assert_eq!(db.find_by_trade_order_id(&leader.trade_order_id).await.unwrap().len(), 1);
    let legs = db.fetch_trade_orders_for_order(&leader.order_id).await.unwrap();
    assert!(legs.iter().all(|t| t.status == TradeOrderStatus::Settled));
    tear_down(db).await;
}

#[tokio::test]
async fn teams_missed_by_the_event_are_settled_by_the_sweep() {
    let db = setup().await;
    seed_catalog(&db, &activity(1)).await;
    // No group-complete subscriber, so nothing settles the team when it fills
    let flow = flow_api(&db);
    let settlement = SettlementApi::new(db.clone(), 3);
    let http = NotifyConfig::http("http://127.0.0.1:1/settled");
    let leg = locked_leg(flow.lock_order(lock_request("alice", "out-1").with_notify(http)).await.unwrap());
    flow.process_payment_callback(callback_for(&leg, "cb-1")).await.unwrap();
    flow.sweep_expired_orders(None, 10).await.unwrap();
    let stored = db.fetch_trade_order(&leg.trade_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeOrderStatus::Paid);

    let results = settlement.settle_outstanding_orders(10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].order.order_id, leg.order_id);
    assert_eq!(results[0].settled.len(), 1);
    assert_eq!(results[0].tasks.len(), 1);
    let stored = db.fetch_trade_order(&leg.trade_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeOrderStatus::Settled);

    assert!(settlement.settle_outstanding_orders(10).await.unwrap().is_empty());
    assert_eq!(db.find_by_trade_order_id(&leg.trade_order_id).await.unwrap().len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn unknown_team_cannot_be_settled() {
    let db = setup().await;
    let settlement = SettlementApi::new(db.clone(), 3);
    let err = settlement.settle_completed_order(&"ORD-missing".into()).await.unwrap_err();
    assert!(matches!(err, SettlementError::OrderNotFound(_)));
    tear_down(db).await;
}
