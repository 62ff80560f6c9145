use super::{
    data_objects::{ClosedTeam, LockSlotResult, PaymentResult, SettlementResult},
    NotificationTaskManagement,
    OrderManagement,
    PaymentCallbackManagement,
    TradeOrderManagement,
};
use crate::db_types::{NewOrder, NewPaymentCallback, NewTradeOrder, OrderId, TradeOrder, TradeOrderId, TradeOrderStatus};

/// The highest level of behaviour for group-buy backends: the multi-statement units of work. Each method runs in a
/// single transaction, so either all of its effects are visible or none are.
#[allow(async_fn_in_trait)]
pub trait GroupBuyDatabase:
    OrderManagement + TradeOrderManagement + PaymentCallbackManagement + NotificationTaskManagement
{
    /// Locks a slot for a new member.
    ///
    /// * If a leg with the same `out_trade_no` exists, it is returned as [`LockSlotResult::AlreadyLocked`] and nothing
    ///   else happens.
    /// * The leg is only inserted while the user holds fewer than `participation_limit` live legs in the activity.
    ///   The count and the insert are one statement, so concurrent requests from the same user cannot both pass.
    /// * If `new_order` is given, the team order is created first. Its id must match `trade_order.order_id`.
    /// * The lock counter is incremented. If the increment is rejected, the whole transaction is rolled back.
    async fn lock_slot(
        &self,
        new_order: Option<NewOrder>,
        trade_order: NewTradeOrder,
        participation_limit: i64,
    ) -> Result<LockSlotResult, Self::Error>;

    /// Applies a payment callback.
    ///
    /// The callback record is inserted first. If it already exists the callback is a duplicate and nothing else is
    /// done. Otherwise the trade order must be `CREATE` and the amount must equal its pay price; the leg becomes
    /// `PAID` and the order's completion counter is incremented. A rejection rolls back the record as well, so the
    /// payment processor may redeliver.
    async fn apply_payment(&self, callback: NewPaymentCallback) -> Result<PaymentResult, Self::Error>;

    /// Settles every `PAID` leg of a `SUCCESS` order and queues a notification for each leg with a valid notify
    /// config. Re-running it is harmless: a settled order has no `PAID` legs left.
    async fn settle_order(&self, order_id: &OrderId, max_retry_count: i64) -> Result<SettlementResult, Self::Error>;

    /// Moves a `CREATE` leg to `status` (`TIMEOUT` or `REFUND`) and releases its slot. Returns `None` if the leg is not
    /// in `CREATE`.
    async fn release_trade_order(
        &self,
        trade_order_id: &TradeOrderId,
        status: TradeOrderStatus,
        reason: &str,
    ) -> Result<Option<TradeOrder>, Self::Error>;

    /// Refunds a `PAID` leg. Only legs of `FAILED` team orders can be refunded; returns `None` otherwise.
    async fn refund_paid_trade_order(
        &self,
        trade_order_id: &TradeOrderId,
        reason: &str,
    ) -> Result<Option<TradeOrder>, Self::Error>;

    /// Marks a `PENDING` order `FAILED` and times out its unpaid legs. Returns `None` if the order was no longer
    /// `PENDING`.
    async fn fail_order(&self, order_id: &OrderId, reason: &str) -> Result<Option<ClosedTeam>, Self::Error>;

    /// Completes a `PENDING` order without filling it. The unpaid legs are timed out and their slots released, and the
    /// order is marked `SUCCESS` with the virtual completion flag set. Returns `None` if the order was no longer
    /// `PENDING` or had no paid members.
    async fn complete_order_virtually(&self, order_id: &OrderId) -> Result<Option<ClosedTeam>, Self::Error>;
}
