use chrono::Utc;
use rand::Rng;

use super::{
    data_objects::{CompletionUpdate, LockCountUpdate, VirtualCompletionPolicy},
    DatabaseBackend,
};
use crate::db_types::{NewOrder, Order, OrderId, OrderStatusType};

/// The order store. It owns the team-order counters.
///
/// Every counter method is a single conditional update. Callers never read a counter, modify it and write it back, so
/// any number of concurrent callers can hit the same order without application-level locking.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: DatabaseBackend {
    /// Generates a fresh team order id of the form `ORD{unix millis}{6 random digits}`.
    fn next_id(&self) -> OrderId {
        let suffix = rand::thread_rng().gen_range(0..1_000_000);
        OrderId(format!("ORD{}{suffix:06}", Utc::now().timestamp_millis()))
    }

    /// Stores a new team order with zeroed counters and `PENDING` status.
    async fn save(&self, order: NewOrder) -> Result<Order, Self::Error>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, Self::Error>;

    /// Reserves a slot in the team.
    ///
    /// Succeeds only if the order is `PENDING`, has a free slot and its deadline has not passed. On success the
    /// post-increment lock count is returned. On failure the reason is established by re-reading the order.
    async fn increment_lock_count(&self, order_id: &OrderId) -> Result<LockCountUpdate, Self::Error>;

    /// Releases a reserved slot. Returns `false` when there is no unpaid slot to release, or the order is no longer
    /// `PENDING`.
    async fn decrement_lock_count(&self, order_id: &OrderId) -> Result<bool, Self::Error>;

    /// Records a paid member.
    ///
    /// When the new count reaches the target, the same statement marks the order `SUCCESS` and stamps the completion
    /// time, so exactly one caller ever sees [`CompletionUpdate::Completed`]. An increment past the target is rejected
    /// and never clamped.
    async fn try_increment_complete_count(&self, order_id: &OrderId) -> Result<CompletionUpdate, Self::Error>;

    async fn fetch_pending_orders_by_activity(&self, activity_id: i64) -> Result<Vec<Order>, Self::Error>;

    /// `PENDING` orders whose deadline has passed, oldest deadline first.
    async fn find_timeout_orders(&self, limit: i64) -> Result<Vec<Order>, Self::Error>;

    /// `PENDING` orders of virtual activities that satisfy `policy` at the current time.
    async fn find_virtual_completable_orders(
        &self,
        policy: &VirtualCompletionPolicy,
        limit: i64,
    ) -> Result<Vec<Order>, Self::Error>;

    /// `FAILED` orders that still have `CREATE` or `PAID` legs. A refund sweep retries these until every leg is
    /// closed.
    async fn find_failed_orders_with_open_legs(&self, limit: i64) -> Result<Vec<Order>, Self::Error>;

    /// `SUCCESS` orders that still have `PAID` legs, i.e. completed teams whose settlement has not happened yet.
    async fn find_unsettled_success_orders(&self, limit: i64) -> Result<Vec<Order>, Self::Error>;

    /// Moves a `PENDING` order into a terminal state. Returns `false` if the order was not `PENDING`.
    async fn update_status(
        &self,
        order_id: &OrderId,
        status: OrderStatusType,
        reason: Option<&str>,
    ) -> Result<bool, Self::Error>;
}
