use group_buy_engine::{
    db_types::{DiscountType, MarketPlan, Money, TagScope, CUT_PERCENTAGE_KEY, DOWNGRADE_SWITCH_KEY},
    trial::{TrialErrorCode, TrialRequest, TrialStage},
    CrowdTagManagement,
    TrialApi,
};

mod support;
use support::{activity, discount, seed_catalog, setup, tear_down, ACTIVITY_ID, CHANNEL, GOODS_ID, SOURCE};

fn request(user_id: &str) -> TrialRequest {
    TrialRequest::new(user_id, GOODS_ID, SOURCE, CHANNEL)
}

#[tokio::test]
async fn quote_is_deterministic() {
    let db = setup().await;
    seed_catalog(&db, &activity(3)).await;
    let api = TrialApi::new(db.clone());
    let first = api.trial(request("alice").with_trace_id("trace-1")).await;
    let second = api.trial(request("alice").with_trace_id("trace-1")).await;
    assert_eq!(first, second);
    assert_eq!(first.trace_id.as_deref(), Some("trace-1"));
    let quote = first.quote().expect("Expected a quote");
    assert_eq!(quote.original_price, Money::from_yuan(100));
    assert_eq!(quote.pay_price, Money::from_yuan(80));
    assert_eq!(quote.deduction_price, Money::from_yuan(20));
    assert_eq!(quote.activity_id, Some(ACTIVITY_ID));
    assert_eq!(quote.target_count, Some(3));
    assert!(quote.visible && quote.participable && !quote.fallback);
    assert_eq!(first.trace, vec![
        TrialStage::ParameterValidation,
        TrialStage::FlowControl,
        TrialStage::DiscountCalculation,
        TrialStage::CrowdTagValidation,
        TrialStage::ResultAssembly,
    ]);
    tear_down(db).await;
}

#[tokio::test]
async fn missing_discount_is_a_structured_error() {
    let db = setup().await;
    let mut orphan = activity(3);
    orphan.discount_id = 404;
    seed_catalog(&db, &orphan).await;
    let result = TrialApi::new(db.clone()).trial(request("alice")).await;
    assert_eq!(result.error_code(), Some(TrialErrorCode::DiscountNotFound));
    assert_eq!(TrialErrorCode::DiscountNotFound.code(), "A0404-DISCOUNT");
    assert!(result.quote().is_none());
    assert_eq!(result.trace.last(), Some(&TrialStage::ErrorHandling));
    tear_down(db).await;
}

#[tokio::test]
async fn blank_parameters_are_rejected_first() {
    let db = setup().await;
    let result = TrialApi::new(db.clone()).trial(TrialRequest::new("alice", "", SOURCE, " ")).await;
    assert_eq!(result.error_code(), Some(TrialErrorCode::InvalidParameter));
    assert_eq!(result.trace, vec![TrialStage::ParameterValidation, TrialStage::ErrorHandling]);
    tear_down(db).await;
}

#[tokio::test]
async fn activity_filter_must_match_the_binding() {
    let db = setup().await;
    seed_catalog(&db, &activity(3)).await;
    let api = TrialApi::new(db.clone());
    assert!(api.trial(request("alice").with_activity_id(ACTIVITY_ID)).await.quote().is_some());
    let result = api.trial(request("alice").with_activity_id(ACTIVITY_ID + 1)).await;
    assert_eq!(result.error_code(), Some(TrialErrorCode::ActivityNotFound));
    tear_down(db).await;
}

#[tokio::test]
async fn flow_switches_force_fallback_quotes() {
    let db = setup().await;
    seed_catalog(&db, &activity(3)).await;
    let api = TrialApi::new(db.clone());
    db.set_config(DOWNGRADE_SWITCH_KEY, "true").await.unwrap();
    api.invalidate_caches();
    let result = api.trial(request("alice")).await;
    let quote = result.quote().expect("Expected a fallback quote");
    assert!(quote.fallback && quote.visible && !quote.participable);
    assert_eq!(quote.pay_price, quote.original_price);
    assert_eq!(quote.deduction_price, Money::default());
    assert_eq!(result.trace.last(), Some(&TrialStage::FlowControl));

    db.set_config(DOWNGRADE_SWITCH_KEY, "false").await.unwrap();
    db.set_config(CUT_PERCENTAGE_KEY, "0").await.unwrap();
    api.invalidate_caches();
    assert!(api.trial(request("alice")).await.quote().unwrap().fallback);

    db.set_config(CUT_PERCENTAGE_KEY, "100").await.unwrap();
    api.invalidate_caches();
    assert!(!api.trial(request("alice")).await.quote().unwrap().fallback);
    tear_down(db).await;
}

#[tokio::test]
async fn audience_tag_scopes() {
    let db = setup().await;
    db.add_users_to_tag("vip", &["alice".to_string()]).await.unwrap();
    for (scope, expected) in [
        (TagScope::Strict, (false, false)),
        (TagScope::VisibleOnly, (true, false)),
        (TagScope::Open, (true, true)),
    ] {
        let mut tagged = activity(3);
        tagged.tag_id = Some("vip".into());
        tagged.tag_scope = scope;
        seed_catalog(&db, &tagged).await;
        let api = TrialApi::new(db.clone());
        let member = api.trial(request("alice")).await;
        assert!(member.is_participable(), "{scope} member");
        let outsider = api.trial(request("bob")).await;
        let quote = outsider.quote().expect("Outsiders still get a priced quote");
        assert_eq!((quote.visible, quote.participable), expected, "{scope} outsider");
        assert_eq!(quote.pay_price, Money::from_yuan(80));
    }
    tear_down(db).await;
}

#[tokio::test]
async fn tag_discounts_only_apply_to_members() {
    let db = setup().await;
    seed_catalog(&db, &activity(3)).await;
    let mut members_only = discount();
    members_only.discount_type = DiscountType::Tag;
    members_only.tag_id = Some("newcomers".into());
    members_only.market_plan = MarketPlan::Percentage;
    members_only.market_expr = "0.85".into();
    db.upsert_discount(&members_only).await.unwrap();
    db.add_users_to_tag("newcomers", &["alice".to_string()]).await.unwrap();
    let api = TrialApi::new(db.clone());
    assert_eq!(api.trial(request("alice")).await.quote().unwrap().pay_price, Money::from_yuan(85));
    let outsider = api.trial(request("bob")).await;
    let quote = outsider.quote().unwrap();
    assert_eq!(quote.pay_price, Money::from_yuan(100));
    assert!(quote.participable);
    tear_down(db).await;
}

#[tokio::test]
async fn crowd_tag_store() {
    let db = setup().await;
    let users = ["u1", "u2", "u3"].map(String::from);
    assert_eq!(db.add_users_to_tag("t1", &users).await.unwrap(), 3);
    assert_eq!(db.add_users_to_tag("t1", &users[..1]).await.unwrap(), 0);
    assert_eq!(db.count_users_by_tag_id("t1").await.unwrap(), 3);
    assert!(db.check_user_in_tag("t1", "u2").await.unwrap());
    assert!(!db.check_user_in_tag("t1", "u9").await.unwrap());
    let mut ids = db.get_user_ids_by_tag_id("t1").await.unwrap();
    ids.sort();
    assert_eq!(ids, users.to_vec());
    let batch = db.batch_check_users_in_tag("t1", &["u1".to_string(), "u9".to_string()]).await.unwrap();
    assert_eq!(batch.get("u1"), Some(&true));
    assert_eq!(batch.get("u9"), Some(&false));
    tear_down(db).await;
}
