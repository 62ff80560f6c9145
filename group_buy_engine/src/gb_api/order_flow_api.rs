use std::fmt::Debug;

use chrono::Utc;
use log::*;

use super::{
    errors::OrderFlowError,
    order_objects::{DeclineReason, LockOrderOutcome, LockOrderRequest, OrderFlowConfig, RefundOutcome, SweepSummary},
    trial_api::TrialApi,
};
use crate::{
    db::traits::{
        CatalogManagement,
        CrowdTagManagement,
        DistributedLock,
        GroupBuyDatabase,
        LockSlotResult,
        PaymentResult,
        VirtualCompletionPolicy,
    },
    db_types::{
        NewOrder,
        NewPaymentCallback,
        NewTradeOrder,
        Order,
        OrderId,
        OrderStatusType,
        TradeOrder,
        TradeOrderId,
        TradeOrderStatus,
    },
    events::{
        EventProducers,
        GroupCompleteEvent,
        OrderCreatedEvent,
        OrderFailedEvent,
        PaymentCompletedEvent,
        UserJoinedEvent,
    },
    trial::{TrialOutcome, TrialQuote, TrialRequest},
};

const EXPIRED_REASON: &str = "expired";
const TEAM_FAILED_REASON: &str = "team order failed";
const PAYMENT_FAILED_REASON: &str = "payment failed";
const PAYMENT_TIMEOUT_REASON: &str = "payment timeout";

/// `OrderFlowApi` drives a team order through its life: locking slots, applying payment callbacks, releasing and
/// refunding legs, and sweeping expired teams.
///
/// Slot increments never take the distributed lock. The lock only serialises the "start a new team" path per
/// (activity, user), and the refund marker keeps concurrent refunds of one leg apart.
pub struct OrderFlowApi<B, L> {
    db: B,
    locks: L,
    trial: TrialApi<B>,
    producers: EventProducers,
    config: OrderFlowConfig,
}

impl<B, L> Debug for OrderFlowApi<B, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.config)
    }
}

impl<B: Clone, L> OrderFlowApi<B, L> {
    pub fn new(db: B, locks: L, producers: EventProducers) -> Self {
        Self::with_config(db, locks, producers, OrderFlowConfig::default())
    }

    pub fn with_config(db: B, locks: L, producers: EventProducers, config: OrderFlowConfig) -> Self {
        let trial = TrialApi::new(db.clone());
        Self { db, locks, trial, producers, config }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn trial_api(&self) -> &TrialApi<B> {
        &self.trial
    }
}

impl<B, L> OrderFlowApi<B, L>
where
    B: GroupBuyDatabase + CatalogManagement + CrowdTagManagement,
    L: DistributedLock,
    OrderFlowError: From<B::Error>,
{
    /// Locks a slot for the user, starting a new team when `request.order_id` is absent.
    ///
    /// Repeating a request with the same `out_trade_no` returns the leg created the first time, whatever has happened
    /// to it since. Business refusals are reported as [`LockOrderOutcome::Declined`]; only store and lock failures
    /// are errors.
    pub async fn lock_order(&self, request: LockOrderRequest) -> Result<LockOrderOutcome, OrderFlowError> {
        if request.out_trade_no.trim().is_empty() {
            return Ok(declined(DeclineReason::InvalidRequest("out_trade_no is required".into())));
        }
        if request.notify.as_ref().is_some_and(|n| !n.is_valid()) {
            return Ok(declined(DeclineReason::InvalidRequest("the notify config has no target".into())));
        }
        if let Some(existing) = self.db.fetch_trade_order_by_out_trade_no(&request.out_trade_no).await? {
            debug!("🔄️ [{}] was already locked as [{}]", request.out_trade_no, existing.trade_order_id);
            return Ok(LockOrderOutcome::Existing(existing));
        }
        let mut trial_request =
            TrialRequest::new(&request.user_id, &request.goods_id, &request.source, &request.channel);
        trial_request.activity_id = request.activity_id;
        let trial = self.trial.trial(trial_request).await;
        let quote = match trial.outcome {
            TrialOutcome::Quote(quote) if quote.participable => quote,
            TrialOutcome::Quote(_) => return Ok(declined(DeclineReason::NotParticipable)),
            TrialOutcome::Failure { code, message } => {
                return Ok(declined(DeclineReason::TrialFailed { code, message }));
            },
        };
        let Some(activity_id) = quote.activity_id else {
            return Ok(declined(DeclineReason::NotParticipable));
        };
        let now = Utc::now();
        let activity = match self.db.fetch_activity(activity_id).await? {
            Some(a) if a.is_open_at(now) => a,
            _ => return Ok(declined(DeclineReason::ActivityClosed)),
        };
        // Fast path. The binding check happens inside `lock_slot`.
        let live = self.db.count_live_trade_orders(activity.id, &request.user_id).await?;
        if live >= activity.participation_limit {
            debug!(
                "🔄️ {} holds {live} legs in activity {}, the limit is {}",
                request.user_id, activity.id, activity.participation_limit
            );
            return Ok(declined(DeclineReason::ParticipationLimitReached));
        }
        match request.order_id.clone() {
            None => {
                let key = format!("create_order:{}:{}", activity.id, request.user_id);
                if !self.locks.try_lock(&key, self.config.lock_wait, self.config.lock_lease).await? {
                    info!("🔄️ Could not take {key}. Another team creation is in flight.");
                    return Ok(declined(DeclineReason::LockContention));
                }
                let order_id = self.db.next_id();
                let new_order = NewOrder {
                    order_id: order_id.clone(),
                    activity_id: activity.id,
                    goods_id: quote.goods_id.clone(),
                    leader_user_id: request.user_id.clone(),
                    target_count: activity.target_count,
                    deadline: activity.team_deadline(now),
                    source: request.source.clone(),
                    channel: request.channel.clone(),
                };
                let trade_order = self.new_trade_order(&request, &quote, order_id, activity.id);
                let result = self.db.lock_slot(Some(new_order), trade_order, activity.participation_limit).await;
                if let Err(e) = self.locks.unlock(&key).await {
                    warn!("🔄️ Could not release {key}. It will expire with its lease. {e}");
                }
                self.handle_lock_result(result?, true).await
            },
            Some(order_id) => {
                let Some(order) = self.db.fetch_order(&order_id).await? else {
                    return Ok(declined(DeclineReason::OrderNotFound));
                };
                if order.activity_id != activity.id || order.goods_id != quote.goods_id {
                    return Ok(declined(DeclineReason::ActivityMismatch));
                }
                let trade_order = self.new_trade_order(&request, &quote, order_id, activity.id);
                let result = self.db.lock_slot(None, trade_order, activity.participation_limit).await?;
                self.handle_lock_result(result, false).await
            },
        }
    }

    fn new_trade_order(
        &self,
        request: &LockOrderRequest,
        quote: &TrialQuote,
        order_id: OrderId,
        activity_id: i64,
    ) -> NewTradeOrder {
        NewTradeOrder {
            trade_order_id: self.db.next_trade_order_id(),
            order_id,
            activity_id,
            user_id: request.user_id.clone(),
            goods_id: quote.goods_id.clone(),
            goods_name: quote.goods_name.clone(),
            original_price: quote.original_price,
            deduction_price: quote.deduction_price,
            pay_price: quote.pay_price,
            out_trade_no: request.out_trade_no.clone(),
            source: request.source.clone(),
            channel: request.channel.clone(),
            notify: request.notify.clone(),
        }
    }

    async fn handle_lock_result(
        &self,
        result: LockSlotResult,
        created_team: bool,
    ) -> Result<LockOrderOutcome, OrderFlowError> {
        match result {
            LockSlotResult::Locked { order, trade_order } => {
                info!(
                    "🔄️ {} locked slot {}/{} of [{}] as [{}]",
                    trade_order.user_id, order.lock_count, order.target_count, order.order_id, trade_order.trade_order_id
                );
                if created_team {
                    self.call_order_created_hook(&order, &trade_order).await;
                } else {
                    self.call_user_joined_hook(&order, &trade_order).await;
                }
                Ok(LockOrderOutcome::Locked { order, trade_order, created_team })
            },
            LockSlotResult::AlreadyLocked(existing) => Ok(LockOrderOutcome::Existing(existing)),
            LockSlotResult::LimitReached => Ok(declined(DeclineReason::ParticipationLimitReached)),
            LockSlotResult::Rejected(rejection) => {
                debug!("🔄️ Slot lock declined: {rejection}");
                Ok(declined(rejection.into()))
            },
        }
    }

    /// Applies a payment callback from the payment processor.
    ///
    /// A callback id that was seen before short-circuits to [`PaymentResult::Duplicate`] without touching anything.
    /// A concurrent duplicate that slips past the fast path is caught by the unique callback id inside the
    /// transaction.
    pub async fn process_payment_callback(
        &self,
        callback: NewPaymentCallback,
    ) -> Result<PaymentResult, OrderFlowError> {
        if self.db.exists_by_callback_id(&callback.callback_id).await? {
            debug!("💰️ Callback [{}] was already processed", callback.callback_id);
            return Ok(PaymentResult::Duplicate(callback.callback_id));
        }
        let callback_id = callback.callback_id.clone();
        let result = self.db.apply_payment(callback).await?;
        match &result {
            PaymentResult::Applied { trade_order, order, completion } => {
                info!(
                    "💰️ Callback [{callback_id}] paid [{}]. [{}] has {}/{} paid members",
                    trade_order.trade_order_id, order.order_id, order.complete_count, order.target_count
                );
                self.call_payment_completed_hook(trade_order, order).await;
                if completion.is_completed() {
                    info!("💰️ Team [{}] is complete", order.order_id);
                    self.call_group_complete_hook(order).await;
                }
            },
            PaymentResult::Duplicate(_) => debug!("💰️ Callback [{callback_id}] was a concurrent duplicate"),
            PaymentResult::AlreadyPaid(t) => {
                info!("💰️ Callback [{callback_id}] is for [{}], which was already paid", t.trade_order_id)
            },
            PaymentResult::Rejected(reason) => warn!("💰️ Callback [{callback_id}] was rejected: {reason}"),
        }
        Ok(result)
    }

    /// The payment for a leg failed. An unpaid leg is timed out and its slot released; a leg in any other state is
    /// left alone and `None` is returned.
    pub async fn handle_payment_failed(
        &self,
        trade_order_id: &TradeOrderId,
    ) -> Result<Option<TradeOrder>, OrderFlowError> {
        let released =
            self.db.release_trade_order(trade_order_id, TradeOrderStatus::Timeout, PAYMENT_FAILED_REASON).await?;
        match &released {
            Some(_) => info!("💰️ Payment for [{trade_order_id}] failed. The slot was released."),
            None => debug!("💰️ Payment failure for [{trade_order_id}] ignored, the leg is not awaiting payment"),
        }
        Ok(released)
    }

    /// Refunds a single leg. Unpaid legs release their slot. Paid legs can only be refunded once their team has
    /// failed.
    pub async fn refund_trade_order(
        &self,
        trade_order_id: &TradeOrderId,
        reason: &str,
    ) -> Result<RefundOutcome, OrderFlowError> {
        let marker = format!("refund:{trade_order_id}");
        if !self.locks.set_if_absent(&marker, self.config.refund_marker_ttl).await? {
            debug!("💰️ A refund of [{trade_order_id}] is already in progress");
            return Ok(RefundOutcome::InProgress);
        }
        let result = self.refund_unguarded(trade_order_id, reason).await;
        if let Err(e) = self.locks.delete(&marker).await {
            warn!("💰️ Could not clear {marker}. It will expire on its own. {e}");
        }
        result
    }

    async fn refund_unguarded(
        &self,
        trade_order_id: &TradeOrderId,
        reason: &str,
    ) -> Result<RefundOutcome, OrderFlowError> {
        let trade_order = self
            .db
            .fetch_trade_order(trade_order_id)
            .await?
            .ok_or_else(|| OrderFlowError::TradeOrderNotFound(trade_order_id.clone()))?;
        let refunded = match trade_order.status {
            TradeOrderStatus::Refund => return Ok(RefundOutcome::AlreadyRefunded(trade_order)),
            TradeOrderStatus::Create => {
                self.db.release_trade_order(trade_order_id, TradeOrderStatus::Refund, reason).await?
            },
            TradeOrderStatus::Paid => self.db.refund_paid_trade_order(trade_order_id, reason).await?,
            status => return Ok(RefundOutcome::NotAllowed(format!("the trade order is {status}"))),
        };
        match refunded {
            Some(t) => {
                info!("💰️ [{trade_order_id}] refunded ({reason})");
                Ok(RefundOutcome::Refunded(t))
            },
            None if trade_order.status == TradeOrderStatus::Paid => {
                Ok(RefundOutcome::NotAllowed("paid legs are only refunded once the team order has failed".into()))
            },
            None => Ok(RefundOutcome::NotAllowed("the trade order changed state during the refund".into())),
        }
    }

    /// Refunds every unpaid or paid leg of a `FAILED` team order.
    pub async fn refund_failed_order(&self, order_id: &OrderId) -> Result<Vec<RefundOutcome>, OrderFlowError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatusType::Failed {
            return Err(OrderFlowError::OrderNotFailed(order_id.clone(), order.status));
        }
        let legs = self.db.fetch_trade_orders_for_order(order_id).await?;
        let mut outcomes = Vec::with_capacity(legs.len());
        for leg in legs.into_iter().filter(|t| t.status.can_refund()) {
            outcomes.push(self.refund_trade_order(&leg.trade_order_id, TEAM_FAILED_REASON).await?);
        }
        debug!("💰️ Team refund of [{order_id}] processed {} legs", outcomes.len());
        Ok(outcomes)
    }

    /// One pass of the expired-team sweep. Virtual completion runs first (when a policy is given), so that a team
    /// which qualifies is completed rather than failed. Timed-out teams are then failed.
    ///
    /// Refunds run last, over every `FAILED` team that still has open legs. That includes the teams failed in this
    /// pass, and any earlier team whose refund errored or was held up by a concurrent refund marker. A team whose
    /// refund fails is logged and retried on the next pass; it does not stop the rest of the batch.
    pub async fn sweep_expired_orders(
        &self,
        policy: Option<&VirtualCompletionPolicy>,
        batch_size: i64,
    ) -> Result<SweepSummary, OrderFlowError> {
        let mut summary = SweepSummary::default();
        if let Some(policy) = policy {
            for order in self.db.find_virtual_completable_orders(policy, batch_size).await? {
                if let Some(closed) = self.db.complete_order_virtually(&order.order_id).await? {
                    info!(
                        "🔄️ Team [{}] completed virtually with {}/{} paid members",
                        closed.order.order_id, closed.order.complete_count, closed.order.target_count
                    );
                    summary.virtually_completed.push(closed.order.order_id.clone());
                    self.call_group_complete_hook(&closed.order).await;
                }
            }
        }
        for order in self.db.find_timeout_orders(batch_size).await? {
            let Some(closed) = self.db.fail_order(&order.order_id, EXPIRED_REASON).await? else {
                continue;
            };
            info!(
                "🔄️ Team [{}] expired with {}/{} paid members",
                closed.order.order_id, closed.order.complete_count, closed.order.target_count
            );
            summary.failed.push(closed.order.order_id.clone());
            self.call_order_failed_hook(&closed.order, closed.timed_out).await;
        }
        for order in self.db.find_failed_orders_with_open_legs(batch_size).await? {
            match self.refund_failed_order(&order.order_id).await {
                Ok(outcomes) => {
                    summary.refunded += outcomes.iter().filter(|o| matches!(o, RefundOutcome::Refunded(_))).count();
                    let held = outcomes.iter().filter(|o| matches!(o, RefundOutcome::InProgress)).count();
                    if held > 0 {
                        debug!("🔄️ {held} refunds of [{}] are in flight elsewhere", order.order_id);
                    }
                },
                Err(e) => {
                    warn!("🔄️ Could not refund team [{}]. The next sweep retries it. {e}", order.order_id);
                    summary.refund_errors += 1;
                },
            }
        }
        if !summary.virtually_completed.is_empty() || !summary.failed.is_empty() || summary.refunded > 0 {
            debug!("🔄️ Sweep summary: {summary:?}");
        }
        Ok(summary)
    }

    /// Times out unpaid legs older than `older_than` and releases their slots.
    pub async fn expire_unpaid_trade_orders(
        &self,
        older_than: chrono::Duration,
        batch_size: i64,
    ) -> Result<Vec<TradeOrder>, OrderFlowError> {
        let cutoff = Utc::now() - older_than;
        let mut expired = Vec::new();
        for leg in self.db.find_unpaid_trade_orders(cutoff, batch_size).await? {
            if let Some(t) =
                self.db.release_trade_order(&leg.trade_order_id, TradeOrderStatus::Timeout, PAYMENT_TIMEOUT_REASON).await?
            {
                expired.push(t);
            }
        }
        if !expired.is_empty() {
            info!("💰️ {} unpaid trade orders timed out", expired.len());
        }
        Ok(expired)
    }

    async fn call_order_created_hook(&self, order: &Order, trade_order: &TradeOrder) {
        for emitter in &self.producers.order_created_producer {
            debug!("🔄️ Notifying order created hook subscribers");
            let event = OrderCreatedEvent { order: order.clone(), trade_order: trade_order.clone() };
            emitter.publish_event(event).await;
        }
    }

    async fn call_user_joined_hook(&self, order: &Order, trade_order: &TradeOrder) {
        for emitter in &self.producers.user_joined_producer {
            debug!("🔄️ Notifying user joined hook subscribers");
            let event = UserJoinedEvent { order: order.clone(), trade_order: trade_order.clone() };
            emitter.publish_event(event).await;
        }
    }

    async fn call_payment_completed_hook(&self, trade_order: &TradeOrder, order: &Order) {
        for emitter in &self.producers.payment_completed_producer {
            debug!("💰️ Notifying payment completed hook subscribers");
            let event = PaymentCompletedEvent { trade_order: trade_order.clone(), order: order.clone() };
            emitter.publish_event(event).await;
        }
    }

    async fn call_group_complete_hook(&self, order: &Order) {
        for emitter in &self.producers.group_complete_producer {
            debug!("🔄️ Notifying group complete hook subscribers");
            emitter.publish_event(GroupCompleteEvent::new(order.clone())).await;
        }
    }

    async fn call_order_failed_hook(&self, order: &Order, timed_out: Vec<TradeOrder>) {
        for emitter in &self.producers.order_failed_producer {
            debug!("🔄️ Notifying order failed hook subscribers");
            let event = OrderFailedEvent { order: order.clone(), timed_out: timed_out.clone() };
            emitter.publish_event(event).await;
        }
    }
}

fn declined(reason: DeclineReason) -> LockOrderOutcome {
    LockOrderOutcome::Declined(reason)
}
