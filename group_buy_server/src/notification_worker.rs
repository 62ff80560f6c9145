use group_buy_engine::{notifications::NotifierRouter, DeliverySummary, NotificationApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

use crate::config::NotificationConfig;

pub type WorkerNotificationApi = NotificationApi<SqliteDatabase, NotifierRouter>;

/// Starts the notification worker. Each tick first returns abandoned claims to the queue, then delivers a batch of
/// due tasks. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_notification_worker(api: WorkerNotificationApi, config: NotificationConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(config.interval);
        info!("🕰️ Notification worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running notification job");
            match api.recover_stale_tasks(config.stale_after).await {
                Ok(0) => {},
                Ok(n) => warn!("🕰️ {n} notifications were claimed but never resolved. They are queued again."),
                Err(e) => error!("🕰️ Error recovering stale notifications: {e}"),
            }
            match api.run_sweep(config.batch_size).await {
                Ok(summary) => log_summary(&summary),
                Err(e) => error!("🕰️ Error running notification job: {e}"),
            }
        }
    })
}

fn log_summary(summary: &DeliverySummary) {
    if summary.delivered + summary.retrying + summary.failed + summary.errors == 0 {
        return;
    }
    info!(
        "🕰️ Notifications: {} delivered, {} to retry, {} failed, {} skipped, {} errors",
        summary.delivered, summary.retrying, summary.failed, summary.skipped, summary.errors
    );
}
