use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use futures_util::{stream, StreamExt};
use log::*;

use super::errors::NotificationError;
use crate::{
    db::traits::NotificationTaskManagement,
    db_types::{NotificationTask, NotificationTaskStatus, TradeOrderId},
    notifications::{NotificationTransport, RetryPolicy},
};

const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Delivered(NotificationTask),
    /// The attempt failed and the task is scheduled for another one.
    Retrying(NotificationTask),
    /// The attempt failed and no retries are left.
    Failed(NotificationTask),
    /// Another worker holds the task, or it is not due yet.
    NotClaimed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub retrying: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// `NotificationApi` delivers queued settlement notifications with bounded retries.
///
/// A task is only delivered after this worker has claimed it, so concurrent sweeps, in this process or others, never
/// deliver the same task twice in one round. Delivery is at-least-once: a crash between delivery and bookkeeping
/// leaves the task claimed until [`Self::recover_stale_tasks`] returns it to the queue.
pub struct NotificationApi<B, T> {
    db: B,
    transport: T,
    policy: RetryPolicy,
    concurrency: usize,
}

impl<B, T> Debug for NotificationApi<B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationApi ({:?})", self.policy)
    }
}

impl<B, T> NotificationApi<B, T> {
    pub fn new(db: B, transport: T, policy: RetryPolicy) -> Self {
        Self { db, transport, policy, concurrency: DEFAULT_CONCURRENCY }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<B, T> NotificationApi<B, T>
where
    B: NotificationTaskManagement,
    T: NotificationTransport,
    NotificationError: From<B::Error>,
{
    /// Makes one delivery attempt for the task, if it can be claimed.
    pub async fn execute(&self, task_id: &str) -> Result<DeliveryOutcome, NotificationError> {
        let Some(task) = self.db.claim_task(task_id).await? else {
            trace!("📨️ [{task_id}] was not claimable");
            return Ok(DeliveryOutcome::NotClaimed);
        };
        match self.transport.deliver(&task).await {
            Ok(()) => {
                let task = self
                    .db
                    .record_delivery_success(task_id)
                    .await?
                    .ok_or_else(|| NotificationError::TaskNotFound(task_id.to_string()))?;
                info!("📨️ [{task_id}] delivered to {}", task.notify_target);
                Ok(DeliveryOutcome::Delivered(task))
            },
            Err(e) => {
                let delay = self.policy.delay_for(task.retry_count + 1);
                let next_attempt_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                let task = self
                    .db
                    .record_delivery_failure(task_id, &e.to_string(), next_attempt_at)
                    .await?
                    .ok_or_else(|| NotificationError::TaskNotFound(task_id.to_string()))?;
                if task.status == NotificationTaskStatus::Failed {
                    error!(
                        "📨️ [{task_id}] failed for the last time after {} attempts: {e}. It needs manual attention.",
                        task.retry_count
                    );
                    Ok(DeliveryOutcome::Failed(task))
                } else {
                    warn!(
                        "📨️ [{task_id}] attempt {} of {} failed: {e}. Retrying in {}s",
                        task.retry_count,
                        task.max_retry_count,
                        delay.as_secs()
                    );
                    Ok(DeliveryOutcome::Retrying(task))
                }
            },
        }
    }

    /// Attempts every due task, up to `batch_size`, a few at a time.
    pub async fn run_sweep(&self, batch_size: i64) -> Result<DeliverySummary, NotificationError> {
        let tasks = self.db.find_pending_tasks(batch_size).await?;
        if tasks.is_empty() {
            return Ok(DeliverySummary::default());
        }
        debug!("📨️ {} notification tasks are due", tasks.len());
        let attempts = tasks.iter().map(|task| self.execute(&task.task_id)).collect::<Vec<_>>();
        let outcomes = stream::iter(attempts)
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
        let mut summary = DeliverySummary::default();
        for outcome in outcomes {
            match outcome {
                Ok(DeliveryOutcome::Delivered(_)) => summary.delivered += 1,
                Ok(DeliveryOutcome::Retrying(_)) => summary.retrying += 1,
                Ok(DeliveryOutcome::Failed(_)) => summary.failed += 1,
                Ok(DeliveryOutcome::NotClaimed) => summary.skipped += 1,
                Err(e) => {
                    error!("📨️ Notification bookkeeping failed: {e}");
                    summary.errors += 1;
                },
            }
        }
        debug!("📨️ Notification sweep: {summary:?}");
        Ok(summary)
    }

    /// Returns tasks that have been claimed for longer than `older_than` to the queue.
    pub async fn recover_stale_tasks(&self, older_than: Duration) -> Result<u64, NotificationError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::zero());
        let reset = self.db.reset_stale_tasks(cutoff).await?;
        if reset > 0 {
            warn!("📨️ {reset} notification tasks were stuck in PROCESSING and have been re-queued");
        }
        Ok(reset)
    }

    /// Puts a `FAILED` task back in the queue with a fresh retry budget. Returns `None` if the task is not `FAILED`.
    pub async fn retry_failed_task(&self, task_id: &str) -> Result<Option<NotificationTask>, NotificationError> {
        let mut task = self
            .db
            .find_by_task_id(task_id)
            .await?
            .ok_or_else(|| NotificationError::TaskNotFound(task_id.to_string()))?;
        if task.status != NotificationTaskStatus::Failed {
            return Ok(None);
        }
        task.status = NotificationTaskStatus::Pending;
        task.retry_count = 0;
        task.next_attempt_at = Utc::now();
        task.claimed_at = None;
        let task = self.db.update_task(&task).await?;
        info!("📨️ [{task_id}] re-queued by hand");
        Ok(Some(task))
    }

    pub async fn fetch_task(&self, task_id: &str) -> Result<Option<NotificationTask>, NotificationError> {
        Ok(self.db.find_by_task_id(task_id).await?)
    }

    pub async fn tasks_for_trade_order(
        &self,
        trade_order_id: &TradeOrderId,
    ) -> Result<Vec<NotificationTask>, NotificationError> {
        Ok(self.db.find_by_trade_order_id(trade_order_id).await?)
    }

    /// Due `PENDING` tasks, one zero-based page at a time.
    pub async fn pending_tasks(&self, page: i64, page_size: i64) -> Result<Vec<NotificationTask>, NotificationError> {
        Ok(self.db.find_pending_tasks_page(page, page_size).await?)
    }
}
