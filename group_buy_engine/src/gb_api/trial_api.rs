//! Runs the price trial against the catalog.
use std::{fmt::Debug, time::Duration};

use log::*;

use crate::{
    db::traits::{CatalogManagement, CrowdTagManagement},
    db_types::FlowSwitches,
    helpers::TtlCache,
    trial::{stages, StageOutcome, TrialContext, TrialErrorCode, TrialRequest, TrialResult},
};

const DEFAULT_SWITCH_TTL: Duration = Duration::from_secs(5);
const DEFAULT_TAG_TTL: Duration = Duration::from_secs(60);

/// `TrialApi` produces price quotes. Flow switches and tag memberships are read through short-lived caches; each
/// trial works from a single switch snapshot.
#[derive(Clone)]
pub struct TrialApi<B> {
    db: B,
    switches: TtlCache<(), FlowSwitches>,
    memberships: TtlCache<(String, String), bool>,
}

impl<B: Debug> Debug for TrialApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrialApi ({:?})", self.db)
    }
}

impl<B> TrialApi<B> {
    pub fn new(db: B) -> Self {
        Self::with_cache_ttl(db, DEFAULT_SWITCH_TTL, DEFAULT_TAG_TTL)
    }

    pub fn with_cache_ttl(db: B, switch_ttl: Duration, tag_ttl: Duration) -> Self {
        Self { db, switches: TtlCache::new(switch_ttl), memberships: TtlCache::new(tag_ttl) }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Drops cached switches and memberships, e.g. after changing them.
    pub fn invalidate_caches(&self) {
        self.switches.clear();
        self.memberships.clear();
    }
}

impl<B> TrialApi<B>
where B: CatalogManagement + CrowdTagManagement
{
    /// Runs the trial. Store failures surface as a `B0001` (system busy) result rather than as an error.
    pub async fn trial(&self, request: TrialRequest) -> TrialResult {
        match self.run(request.clone()).await {
            Ok(result) => result,
            Err(e) => {
                error!("🧮️ Price trial for {} on {} failed: {e}", request.user_id, request.goods_id);
                let ctx = TrialContext::new(request);
                stages::handle_error(ctx, TrialErrorCode::SystemBusy, "The system is busy. Try again later.".into())
            },
        }
    }

    async fn run(&self, request: TrialRequest) -> Result<TrialResult, B::Error> {
        let mut ctx = match stages::validate_parameters(TrialContext::new(request)) {
            StageOutcome::Continue(ctx) => ctx,
            StageOutcome::ShortCircuit(result) => return Ok(result),
        };
        ctx.switches = self.flow_switches().await?;
        ctx.sku = self.db.fetch_sku(&ctx.request.goods_id).await?;
        let mut ctx = match stages::flow_control(ctx) {
            StageOutcome::Continue(ctx) => ctx,
            StageOutcome::ShortCircuit(result) => return Ok(result),
        };
        self.load_activity(&mut ctx).await?;
        let mut ctx = match stages::calculate_discount(ctx) {
            StageOutcome::Continue(ctx) => ctx,
            StageOutcome::ShortCircuit(result) => return Ok(result),
        };
        if let Some(tag) = ctx.activity.as_ref().and_then(|a| a.tag()).map(str::to_string) {
            ctx.in_activity_tag = Some(self.is_member(&tag, &ctx.request.user_id).await?);
        }
        let ctx = match stages::check_crowd_tag(ctx) {
            StageOutcome::Continue(ctx) => ctx,
            StageOutcome::ShortCircuit(result) => return Ok(result),
        };
        let result = stages::assemble_result(ctx);
        trace!("🧮️ Trial result: {result:?}");
        Ok(result)
    }

    /// Resolves the activity bound to the goods, then its discount (a goods-level override wins over the activity
    /// default). Anything missing is left as `None` for the discount stage to report.
    async fn load_activity(&self, ctx: &mut TrialContext) -> Result<(), B::Error> {
        let r = &ctx.request;
        let Some(binding) = self.db.fetch_activity_goods(&r.goods_id, &r.source, &r.channel).await? else {
            return Ok(());
        };
        if r.activity_id.is_some_and(|id| id != binding.activity_id) {
            debug!("🧮️ Goods {} are not bound to activity {:?}", r.goods_id, r.activity_id);
            return Ok(());
        }
        let Some(activity) = self.db.fetch_activity(binding.activity_id).await? else {
            return Ok(());
        };
        let discount_id = binding.discount_id.unwrap_or(activity.discount_id);
        let discount = self.db.fetch_discount(discount_id).await?;
        if let Some(tag) = discount.as_ref().and_then(|d| d.tag()) {
            ctx.in_discount_tag = Some(self.is_member(tag, &ctx.request.user_id).await?);
        }
        ctx.activity = Some(activity);
        ctx.discount = discount;
        Ok(())
    }

    async fn flow_switches(&self) -> Result<FlowSwitches, B::Error> {
        if let Some(switches) = self.switches.get(&()) {
            return Ok(switches);
        }
        let switches = self.db.fetch_flow_switches().await?;
        self.switches.insert((), switches);
        Ok(switches)
    }

    async fn is_member(&self, tag_id: &str, user_id: &str) -> Result<bool, B::Error> {
        let key = (tag_id.to_string(), user_id.to_string());
        if let Some(member) = self.memberships.get(&key) {
            return Ok(member);
        }
        let member = self.db.check_user_in_tag(tag_id, user_id).await?;
        self.memberships.insert(key, member);
        Ok(member)
    }
}
