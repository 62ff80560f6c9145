//! The stages of the price trial. Each is a pure function of the context.
use log::{debug, trace};

use super::{
    calculators::calculate_pay_price,
    trial_objects::{StageOutcome, TrialContext, TrialErrorCode, TrialOutcome, TrialQuote, TrialResult, TrialStage},
};
use crate::{
    db_types::{DiscountType, Money, TagScope},
    helpers::is_in_traffic_split,
};

pub fn validate_parameters(mut ctx: TrialContext) -> StageOutcome {
    ctx.enter(TrialStage::ParameterValidation);
    let r = &ctx.request;
    let missing = [("user_id", &r.user_id), ("goods_id", &r.goods_id), ("source", &r.source), ("channel", &r.channel)]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
    if missing.is_empty() {
        StageOutcome::Continue(ctx)
    } else {
        let message = format!("Missing required parameters: {}", missing.join(", "));
        StageOutcome::ShortCircuit(handle_error(ctx, TrialErrorCode::InvalidParameter, message))
    }
}

/// Applies the downgrade switch and the traffic split. Users who are turned away here still get a quote, at the
/// original price and without the option to join.
pub fn flow_control(mut ctx: TrialContext) -> StageOutcome {
    ctx.enter(TrialStage::FlowControl);
    let Some(sku) = ctx.sku.clone() else {
        let message = format!("Goods {} do not exist", ctx.request.goods_id);
        return StageOutcome::ShortCircuit(handle_error(ctx, TrialErrorCode::SkuNotFound, message));
    };
    let switches = ctx.switches;
    let reason = if switches.downgraded {
        Some("the downgrade switch is on")
    } else if !is_in_traffic_split(&ctx.request.user_id, switches.cut_percentage) {
        Some("the user is outside the traffic split")
    } else {
        None
    };
    match reason {
        Some(reason) => {
            debug!("🧮️ Fallback quote for {} on {}: {reason}", ctx.request.user_id, sku.goods_id);
            let quote = TrialQuote {
                goods_id: sku.goods_id,
                goods_name: sku.goods_name,
                original_price: sku.original_price,
                deduction_price: Money::default(),
                pay_price: sku.original_price,
                activity_id: None,
                activity_name: None,
                target_count: None,
                start_time: None,
                end_time: None,
                visible: true,
                participable: false,
                fallback: true,
            };
            StageOutcome::ShortCircuit(finish(ctx, TrialOutcome::Quote(quote)))
        },
        None => StageOutcome::Continue(ctx),
    }
}

pub fn calculate_discount(mut ctx: TrialContext) -> StageOutcome {
    ctx.enter(TrialStage::DiscountCalculation);
    let Some(activity) = ctx.activity.as_ref() else {
        let message = format!(
            "No activity for goods {} on {}/{}",
            ctx.request.goods_id, ctx.request.source, ctx.request.channel
        );
        return StageOutcome::ShortCircuit(handle_error(ctx, TrialErrorCode::ActivityNotFound, message));
    };
    let Some(sku) = ctx.sku.as_ref() else {
        let message = format!("Goods {} do not exist", ctx.request.goods_id);
        return StageOutcome::ShortCircuit(handle_error(ctx, TrialErrorCode::SkuNotFound, message));
    };
    let Some(discount) = ctx.discount.as_ref() else {
        let message = format!("Activity {} has no discount configured", activity.id);
        return StageOutcome::ShortCircuit(handle_error(ctx, TrialErrorCode::DiscountNotFound, message));
    };
    let original = sku.original_price;
    let eligible = match discount.discount_type {
        DiscountType::Base => true,
        DiscountType::Tag => discount.tag().is_none() || ctx.in_discount_tag.unwrap_or(false),
    };
    let pay_price = if eligible {
        calculate_pay_price(discount.market_plan, &discount.market_expr, original)
    } else {
        trace!("🧮️ {} is not in discount tag {:?}", ctx.request.user_id, discount.tag_id);
        original
    };
    ctx.pay_price = Some(pay_price);
    ctx.deduction_price = Some(original - pay_price);
    StageOutcome::Continue(ctx)
}

/// Decides visibility and participability from the activity's audience tag.
pub fn check_crowd_tag(mut ctx: TrialContext) -> StageOutcome {
    ctx.enter(TrialStage::CrowdTagValidation);
    let (tag, scope) = match ctx.activity.as_ref() {
        Some(a) => (a.tag().map(str::to_string), a.tag_scope),
        None => (None, TagScope::default()),
    };
    let (visible, participable) = match tag {
        None => (true, true),
        Some(_) if ctx.in_activity_tag.unwrap_or(false) => (true, true),
        Some(_) => match scope {
            TagScope::Strict => (false, false),
            TagScope::VisibleOnly => (true, false),
            TagScope::Open => (true, true),
        },
    };
    ctx.visible = visible;
    ctx.participable = participable;
    StageOutcome::Continue(ctx)
}

pub fn assemble_result(mut ctx: TrialContext) -> TrialResult {
    ctx.enter(TrialStage::ResultAssembly);
    let (Some(sku), Some(activity), Some(pay_price), Some(deduction_price)) =
        (ctx.sku.clone(), ctx.activity.clone(), ctx.pay_price, ctx.deduction_price)
    else {
        let message = "Trial reached result assembly without a priced activity".to_string();
        return handle_error(ctx, TrialErrorCode::SystemBusy, message);
    };
    let quote = TrialQuote {
        goods_id: sku.goods_id,
        goods_name: sku.goods_name,
        original_price: sku.original_price,
        deduction_price,
        pay_price,
        activity_id: Some(activity.id),
        activity_name: Some(activity.name),
        target_count: Some(activity.target_count),
        start_time: Some(activity.start_time),
        end_time: Some(activity.end_time),
        visible: ctx.visible,
        participable: ctx.participable,
        fallback: false,
    };
    finish(ctx, TrialOutcome::Quote(quote))
}

/// Terminal stage for every failure.
pub fn handle_error(mut ctx: TrialContext, code: TrialErrorCode, message: String) -> TrialResult {
    ctx.enter(TrialStage::ErrorHandling);
    debug!("🧮️ Trial for {} failed with {code}: {message}", ctx.request.user_id);
    finish(ctx, TrialOutcome::Failure { code, message })
}

fn finish(ctx: TrialContext, outcome: TrialOutcome) -> TrialResult {
    TrialResult { trace_id: ctx.request.trace_id, trace: ctx.trace, outcome }
}
