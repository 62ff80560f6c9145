use std::{future::Future, pin::Pin, sync::Arc};

use group_buy_engine::{
    events::{EventHandlers, EventHooks, GroupCompleteEvent, NotificationMessage, OrderFailedEvent},
    SettlementApi,
    SqliteDatabase,
};
use log::*;

/// Creates the worker's event handlers.
///
/// 1. GroupCompleteEvent - the team is settled: every paid leg moves to SETTLED and a notification task is queued
///    for it. The notification worker picks the tasks up on its next pass. A team this handler misses is settled by
///    the expiry worker's settlement sweep.
/// 2. OrderFailedEvent - logged. The sweep that failed the team refunds it later in the same pass.
/// 3. NotificationMessage - relayed to the log. Deployments with a message broker register their own hook here.
pub fn create_event_handlers(db: SqliteDatabase, max_retry_count: i64, buffer_size: usize) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let settlement = Arc::new(SettlementApi::new(db, max_retry_count));
    // --- On GroupComplete Handler ---
    hooks.on_group_complete(move |ev| {
        let GroupCompleteEvent { order, virtual_completion } = ev;
        let settlement = Arc::clone(&settlement);
        Box::pin(async move {
            match settlement.settle_completed_order(&order.order_id).await {
                Ok(result) => info!(
                    "📬️ Team [{}] settled{}. {} legs settled, {} notifications queued",
                    order.order_id,
                    if virtual_completion { " after virtual completion" } else { "" },
                    result.settled.len(),
                    result.tasks.len()
                ),
                Err(e) => warn!("📬️ Could not settle team [{}]. The settlement sweep retries it. {e}", order.order_id),
            }
        })
    });
    // --- On OrderFailed Handler ---
    hooks.on_order_failed(|ev| {
        let OrderFailedEvent { order, timed_out } = ev;
        info!(
            "📬️ Team [{}] failed ({}). {} unpaid legs were timed out",
            order.order_id,
            order.fail_reason.as_deref().unwrap_or("no reason given"),
            timed_out.len()
        );
        no_op()
    });
    // --- On MQ message Handler ---
    hooks.on_mq_message(|msg| {
        let NotificationMessage { task_id, topic, payload } = msg;
        info!("📨️ [{task_id}] {topic}: {payload}");
        no_op()
    });
    EventHandlers::new(buffer_size, hooks)
}

fn no_op() -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async {})
}
