use chrono::{DateTime, Utc};
use rand::Rng;

use super::DatabaseBackend;
use crate::db_types::{OrderId, TradeOrder, TradeOrderId};

/// Queries over the per-member legs of team orders. State changes to trade orders always happen inside the
/// transactions of [`crate::GroupBuyDatabase`].
#[allow(async_fn_in_trait)]
pub trait TradeOrderManagement: DatabaseBackend {
    /// Generates a fresh trade order id of the form `TRD{unix millis}{6 random digits}`.
    fn next_trade_order_id(&self) -> TradeOrderId {
        let suffix = rand::thread_rng().gen_range(0..1_000_000);
        TradeOrderId(format!("TRD{}{suffix:06}", Utc::now().timestamp_millis()))
    }

    async fn fetch_trade_order(&self, trade_order_id: &TradeOrderId) -> Result<Option<TradeOrder>, Self::Error>;

    async fn fetch_trade_order_by_out_trade_no(&self, out_trade_no: &str) -> Result<Option<TradeOrder>, Self::Error>;

    async fn fetch_trade_orders_for_order(&self, order_id: &OrderId) -> Result<Vec<TradeOrder>, Self::Error>;

    /// The number of `CREATE`, `PAID` or `SETTLED` legs the user holds in the activity.
    async fn count_live_trade_orders(&self, activity_id: i64, user_id: &str) -> Result<i64, Self::Error>;

    /// `CREATE` legs created before `created_before`, oldest first.
    async fn find_unpaid_trade_orders(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TradeOrder>, Self::Error>;
}
