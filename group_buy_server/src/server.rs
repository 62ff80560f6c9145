use group_buy_engine::{
    notifications::{HttpNotifier, MqNotifier, NotifierRouter},
    NotificationApi,
    OrderFlowApi,
    SettlementApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    hooks::create_event_handlers,
    notification_worker::start_notification_worker,
};

/// Runs the worker until it receives Ctrl-C or one of its jobs stops.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await?;

    let max_retry_count = config.notifications.retry_policy.max_attempts;
    let handlers = create_event_handlers(db.clone(), max_retry_count, config.event_buffer_size);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let orders = OrderFlowApi::with_config(db.clone(), db.lock_provider(), producers.clone(), config.order_flow);
    let settlement = SettlementApi::new(db.clone(), max_retry_count);
    let http = HttpNotifier::new(config.notifications.http_timeout)?;
    let mq = MqNotifier::new(producers.mq_message_producer.clone());
    let notifications = NotificationApi::new(db, NotifierRouter::new(http, mq), config.notifications.retry_policy);

    let expiry = start_expiry_worker(orders, settlement, config.expiry.clone());
    let notifier = start_notification_worker(notifications, config.notifications.clone());
    info!("🚀️ Group-buy worker is running");

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("🚀️ Shutting down");
            Ok(())
        },
        res = expiry => Err(ServerError::WorkerStopped(format!("Expiry worker: {res:?}"))),
        res = notifier => Err(ServerError::WorkerStopped(format!("Notification worker: {res:?}"))),
    }
}
