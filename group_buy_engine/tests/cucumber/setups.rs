use chrono::{Duration, Utc};
use cucumber::given;
use group_buy_engine::db_types::{
    Activity,
    ActivityGoods,
    ActivityStatus,
    Discount,
    DiscountType,
    GroupType,
    MarketPlan,
    Money,
    Sku,
    TagScope,
};

use crate::cucumber::{group_buy_world::GroupBuySystem, GroupBuyWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut GroupBuyWorld) {
    let system = GroupBuySystem::new().await;
    world.system = Some(system);
}

#[given(expr = "goods {word} priced at {int} yuan")]
async fn goods(world: &mut GroupBuyWorld, goods_id: String, yuan: i64) {
    let sku = Sku { goods_id: goods_id.clone(), goods_name: format!("Goods {goods_id}"), original_price: Money::from_yuan(yuan) };
    world.system().db.upsert_sku(&sku).await.expect("Error saving sku");
}

#[given(expr = "a {word} team-buy activity {int} for {word} with teams of {int}, {int} yuan off")]
async fn activity(
    world: &mut GroupBuyWorld,
    group_type: String,
    activity_id: i64,
    goods_id: String,
    target_count: i64,
    reduction: i64,
) {
    let group_type = group_type.to_uppercase().parse::<GroupType>().expect("REAL or VIRTUAL");
    let db = &world.system().db;
    let discount = Discount {
        id: activity_id,
        name: format!("{reduction} off"),
        discount_type: DiscountType::Base,
        market_plan: MarketPlan::DirectReduction,
        market_expr: format!("{reduction}.00"),
        tag_id: None,
    };
    let now = Utc::now();
    let activity = Activity {
        id: activity_id,
        name: format!("Activity {activity_id}"),
        discount_id: activity_id,
        tag_id: None,
        tag_scope: TagScope::Strict,
        group_type,
        target_count,
        valid_seconds: 3600,
        participation_limit: 1,
        status: ActivityStatus::Active,
        start_time: now - Duration::days(1),
        end_time: now + Duration::days(1),
    };
    let binding = ActivityGoods {
        activity_id,
        goods_id,
        source: "s01".into(),
        channel: "c01".into(),
        discount_id: None,
    };
    db.upsert_discount(&discount).await.expect("Error saving discount");
    db.upsert_activity(&activity).await.expect("Error saving activity");
    db.upsert_activity_goods(&binding).await.expect("Error saving activity goods");
}
