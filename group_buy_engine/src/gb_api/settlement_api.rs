use std::fmt::Debug;

use log::*;

use super::errors::SettlementError;
use crate::{
    db::traits::{GroupBuyDatabase, SettlementResult},
    db_types::{OrderId, OrderStatusType},
};

/// Settles completed teams: every paid leg moves to `SETTLED` and gets a notification task.
///
/// The `GroupCompleteEvent` subscriber settles a team as soon as it completes. That event lives in memory only, so
/// [`SettlementApi::settle_outstanding_orders`] is run periodically to pick up any completed team whose event was
/// lost or whose settlement failed.
pub struct SettlementApi<B> {
    db: B,
    max_retry_count: i64,
}

impl<B> Debug for SettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B> SettlementApi<B> {
    /// `max_retry_count` is the delivery budget given to each new notification task.
    pub fn new(db: B, max_retry_count: i64) -> Self {
        Self { db, max_retry_count }
    }
}

impl<B> SettlementApi<B>
where
    B: GroupBuyDatabase,
    SettlementError: From<B::Error>,
{
    /// Settles a `SUCCESS` team. Running it again for the same team settles nothing and queues nothing.
    pub async fn settle_completed_order(&self, order_id: &OrderId) -> Result<SettlementResult, SettlementError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| SettlementError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatusType::Success {
            return Err(SettlementError::OrderNotCompleted(order_id.clone(), order.status));
        }
        let result = self.db.settle_order(order_id, self.max_retry_count).await?;
        if result.settled.is_empty() {
            debug!("🔄️ [{order_id}] has nothing left to settle");
        } else {
            info!(
                "🔄️ [{order_id}] settled {} legs and queued {} notifications",
                result.settled.len(),
                result.tasks.len()
            );
        }
        Ok(result)
    }

    /// Settles up to `batch_size` `SUCCESS` teams that still have `PAID` legs. A team that fails to settle is logged
    /// and skipped; the next call will find it again.
    pub async fn settle_outstanding_orders(&self, batch_size: i64) -> Result<Vec<SettlementResult>, SettlementError> {
        let orders = self.db.find_unsettled_success_orders(batch_size).await?;
        let mut results = Vec::with_capacity(orders.len());
        for order in orders {
            match self.settle_completed_order(&order.order_id).await {
                Ok(result) => results.push(result),
                Err(e) => warn!("🔄️ Could not settle [{}]. It will be retried. {e}", order.order_id),
            }
        }
        if !results.is_empty() {
            info!("🔄️ Settlement sweep settled {} outstanding teams", results.len());
        }
        Ok(results)
    }
}
