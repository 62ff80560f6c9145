#![allow(dead_code)]
//! Shared fixtures for the integration tests.
use chrono::{Duration, Utc};
use group_buy_engine::{
    db_types::{
        Activity,
        ActivityGoods,
        ActivityStatus,
        Discount,
        DiscountType,
        GroupType,
        MarketPlan,
        Money,
        NewOrder,
        NewPaymentCallback,
        Order,
        OrderId,
        Sku,
        TagScope,
        TradeOrder,
    },
    events::EventProducers,
    order_objects::LockOrderRequest,
    test_utils::prepare_env::prepare_test_db,
    DatabaseBackend,
    OrderFlowApi,
    OrderManagement,
    SqliteDatabase,
    SqliteLockProvider,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const GOODS_ID: &str = "9890001";
pub const GOODS_NAME: &str = "Organic jasmine tea, 500g";
pub const SOURCE: &str = "s01";
pub const CHANNEL: &str = "c01";
pub const ACTIVITY_ID: i64 = 100123;
pub const DISCOUNT_ID: i64 = 25120207;

pub async fn setup() -> SqliteDatabase {
    prepare_test_db().await
}

pub async fn tear_down(mut db: SqliteDatabase) {
    db.close().await;
    if let Err(e) = Sqlite::drop_database(db.url()).await {
        warn!("🚀️ Could not drop test database {}: {e}", db.url());
    }
}

/// An open activity: teams of `target_count`, an hour to fill up, one leg per user.
pub fn activity(target_count: i64) -> Activity {
    let now = Utc::now();
    Activity {
        id: ACTIVITY_ID,
        name: "Tea lovers team buy".into(),
        discount_id: DISCOUNT_ID,
        tag_id: None,
        tag_scope: TagScope::Strict,
        group_type: GroupType::Real,
        target_count,
        valid_seconds: 3600,
        participation_limit: 1,
        status: ActivityStatus::Active,
        start_time: now - Duration::days(1),
        end_time: now + Duration::days(1),
    }
}

/// A flat reduction of 20.00 off 100.00
pub fn discount() -> Discount {
    Discount {
        id: DISCOUNT_ID,
        name: "20 off".into(),
        discount_type: DiscountType::Base,
        market_plan: MarketPlan::DirectReduction,
        market_expr: "20.00".into(),
        tag_id: None,
    }
}

pub fn sku() -> Sku {
    Sku { goods_id: GOODS_ID.into(), goods_name: GOODS_NAME.into(), original_price: Money::from_yuan(100) }
}

pub fn binding() -> ActivityGoods {
    ActivityGoods {
        activity_id: ACTIVITY_ID,
        goods_id: GOODS_ID.into(),
        source: SOURCE.into(),
        channel: CHANNEL.into(),
        discount_id: None,
    }
}

pub async fn seed_catalog(db: &SqliteDatabase, activity: &Activity) {
    db.upsert_sku(&sku()).await.expect("Error seeding sku");
    db.upsert_discount(&discount()).await.expect("Error seeding discount");
    db.upsert_activity(activity).await.expect("Error seeding activity");
    db.upsert_activity_goods(&binding()).await.expect("Error seeding activity goods");
}

pub fn flow_api(db: &SqliteDatabase) -> OrderFlowApi<SqliteDatabase, SqliteLockProvider> {
    flow_api_with_producers(db, EventProducers::default())
}

pub fn flow_api_with_producers(
    db: &SqliteDatabase,
    producers: EventProducers,
) -> OrderFlowApi<SqliteDatabase, SqliteLockProvider> {
    OrderFlowApi::new(db.clone(), db.lock_provider(), producers)
}

pub fn lock_request(user_id: &str, out_trade_no: &str) -> LockOrderRequest {
    LockOrderRequest::new(user_id, GOODS_ID, SOURCE, CHANNEL, out_trade_no)
}

pub fn callback_for(trade_order: &TradeOrder, callback_id: &str) -> NewPaymentCallback {
    NewPaymentCallback {
        callback_id: callback_id.into(),
        trade_order_id: trade_order.trade_order_id.clone(),
        amount: trade_order.pay_price,
        pay_time: Utc::now(),
        channel: "alipay".into(),
        payment_no: format!("PAY-{callback_id}"),
    }
}

/// Stores a bare team order, bypassing the order flow.
pub async fn new_team(db: &SqliteDatabase, target_count: i64, lifetime: Duration) -> Order {
    let now = Utc::now();
    let order = NewOrder {
        order_id: db.next_id(),
        activity_id: ACTIVITY_ID,
        goods_id: GOODS_ID.into(),
        leader_user_id: "leader".into(),
        target_count,
        deadline: now + lifetime,
        source: SOURCE.into(),
        channel: CHANNEL.into(),
    };
    db.save(order).await.expect("Error saving team order")
}

pub async fn fetch_order(db: &SqliteDatabase, order_id: &OrderId) -> Order {
    db.fetch_order(order_id).await.expect("Error fetching order").expect("Order does not exist")
}
