use chrono::{DateTime, Utc};

use super::{data_objects::InsertTaskResult, DatabaseBackend};
use crate::db_types::{NewNotificationTask, NotificationTask, TradeOrderId};

/// Storage for outbound notification tasks.
///
/// A task only moves out of `PENDING` through [`Self::claim_task`], and only the claimant moves it out of
/// `PROCESSING`. That is what stops two concurrent sweeps from delivering the same task twice.
#[allow(async_fn_in_trait)]
pub trait NotificationTaskManagement: DatabaseBackend {
    /// Inserts a task. Saving a task id that already exists returns the stored task unchanged.
    async fn save_task(&self, task: NewNotificationTask) -> Result<InsertTaskResult, Self::Error>;

    /// Overwrites the mutable fields (status, counters, schedule, error) of a task.
    async fn update_task(&self, task: &NotificationTask) -> Result<NotificationTask, Self::Error>;

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<NotificationTask>, Self::Error>;

    async fn find_by_trade_order_id(&self, trade_order_id: &TradeOrderId) -> Result<Vec<NotificationTask>, Self::Error>;

    /// `PENDING` tasks that are due, oldest first.
    async fn find_pending_tasks(&self, limit: i64) -> Result<Vec<NotificationTask>, Self::Error>;

    /// Pages through due `PENDING` tasks. `page` is zero-based.
    async fn find_pending_tasks_page(&self, page: i64, page_size: i64) -> Result<Vec<NotificationTask>, Self::Error>;

    /// Atomically moves a due `PENDING` task to `PROCESSING`. Returns `None` if another worker got there first, or the
    /// task is not due.
    async fn claim_task(&self, task_id: &str) -> Result<Option<NotificationTask>, Self::Error>;

    async fn record_delivery_success(&self, task_id: &str) -> Result<Option<NotificationTask>, Self::Error>;

    /// Bumps the retry count of a claimed task. The task goes back to `PENDING`, eligible again at `next_attempt_at`,
    /// or to `FAILED` once the retry count reaches its maximum.
    async fn record_delivery_failure(
        &self,
        task_id: &str,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Option<NotificationTask>, Self::Error>;

    /// Returns `PROCESSING` tasks claimed before `claimed_before` to `PENDING`. Returns the number of tasks reset.
    async fn reset_stale_tasks(&self, claimed_before: DateTime<Utc>) -> Result<u64, Self::Error>;
}
