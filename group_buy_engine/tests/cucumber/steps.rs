use cucumber::{then, when};
use group_buy_engine::{
    db_types::{Money, NotificationTaskStatus, NotifyConfig, OrderStatusType, TradeOrderStatus},
    order_objects::{DeclineReason, LockOrderOutcome, LockOrderRequest},
    NotificationTaskManagement,
    OrderManagement,
    PaymentResult,
    TradeOrderManagement,
};

use crate::cucumber::GroupBuyWorld;

fn request(user: &str, goods_id: &str, out_trade_no: &str) -> LockOrderRequest {
    LockOrderRequest::new(user, goods_id, "s01", "c01", out_trade_no)
        .with_notify(NotifyConfig::http(format!("http://127.0.0.1:1/{out_trade_no}")))
}

async fn lock(world: &mut GroupBuyWorld, request: LockOrderRequest) {
    let out_trade_no = request.out_trade_no.clone();
    let outcome = world.system().orders.lock_order(request).await.expect("Error locking slot");
    if let Some(leg) = outcome.trade_order() {
        world.legs.insert(out_trade_no, leg.clone());
    }
    world.last_outcome = Some(outcome);
}

#[when(expr = "'{word}' starts a team for {word} with out_trade_no {word}")]
async fn start_team(world: &mut GroupBuyWorld, user: String, goods_id: String, out_trade_no: String) {
    lock(world, request(&user, &goods_id, &out_trade_no)).await;
}

#[when(expr = "'{word}' joins the team of {word} for {word} with out_trade_no {word}")]
async fn join_team(world: &mut GroupBuyWorld, user: String, leader_leg: String, goods_id: String, out_trade_no: String) {
    let team = world.leg(&leader_leg).order_id.clone();
    lock(world, request(&user, &goods_id, &out_trade_no).joining(team)).await;
}

#[when(expr = "the payment processor reports callback {word} for {word}")]
async fn payment_callback(world: &mut GroupBuyWorld, callback_id: String, out_trade_no: String) {
    let leg = world.leg(&out_trade_no);
    let callback = group_buy_engine::db_types::NewPaymentCallback {
        callback_id: callback_id.clone(),
        trade_order_id: leg.trade_order_id.clone(),
        amount: leg.pay_price,
        pay_time: chrono::Utc::now(),
        channel: "alipay".into(),
        payment_no: format!("PAY-{callback_id}"),
    };
    let result = world.system().orders.process_payment_callback(callback).await.expect("Error applying payment");
    assert!(result.is_success(), "Callback {callback_id} was rejected: {result:?}");
    if let PaymentResult::Applied { completion, order, .. } = result {
        if completion.is_completed() {
            world.system().settlement.settle_completed_order(&order.order_id).await.expect("Error settling");
        }
    }
}

#[then(expr = "the slot is declined because the team is full")]
async fn declined_full(world: &mut GroupBuyWorld) {
    match &world.last_outcome {
        Some(LockOrderOutcome::Declined(DeclineReason::TeamFull)) => {},
        other => panic!("Expected a full team, got {other:?}"),
    }
}

#[then(expr = "{word} pays {int} yuan")]
async fn check_pay_price(world: &mut GroupBuyWorld, out_trade_no: String, yuan: i64) {
    assert_eq!(world.leg(&out_trade_no).pay_price, Money::from_yuan(yuan));
}

#[then(expr = "the team of {word} has {int} locked and {int} paid members")]
async fn check_counts(world: &mut GroupBuyWorld, out_trade_no: String, locked: i64, paid: i64) {
    let order_id = world.leg(&out_trade_no).order_id.clone();
    let order = world.system().db.fetch_order(&order_id).await.expect("Error fetching order").expect("No such team");
    assert_eq!((order.lock_count, order.complete_count), (locked, paid));
}

#[then(expr = "the team of {word} is {word}")]
async fn check_team_status(world: &mut GroupBuyWorld, out_trade_no: String, status: String) {
    let order_id = world.leg(&out_trade_no).order_id.clone();
    let order = world.system().db.fetch_order(&order_id).await.expect("Error fetching order").expect("No such team");
    let expected = status.parse::<OrderStatusType>().expect("Not a valid order status");
    assert_eq!(order.status, expected);
}

#[then(expr = "trade order {word} is {word}")]
async fn check_leg_status(world: &mut GroupBuyWorld, out_trade_no: String, status: String) {
    let db = &world.system().db;
    let leg = db.fetch_trade_order_by_out_trade_no(&out_trade_no).await.expect("Error fetching leg").expect("No leg");
    let expected = status.parse::<TradeOrderStatus>().expect("Not a valid trade order status");
    assert_eq!(leg.status, expected);
}

#[then(expr = "a notification is pending for {word}")]
async fn check_notification(world: &mut GroupBuyWorld, out_trade_no: String) {
    let leg = world.leg(&out_trade_no);
    let tasks = world.system().db.find_by_trade_order_id(&leg.trade_order_id).await.expect("Error fetching tasks");
    assert_eq!(tasks.len(), 1, "Expected exactly one notification for {out_trade_no}");
    assert_eq!(tasks[0].status, NotificationTaskStatus::Pending);
}
