//! `SqliteDatabase` is the concrete group-buy backend. It implements every storage trait in [`crate::db::traits`].
use std::{collections::HashMap, fmt::Debug};

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::{
    catalog,
    crowd_tags,
    db_url,
    locks::SqliteLockProvider,
    new_pool,
    notification_tasks,
    orders,
    payment_callbacks,
    trade_orders,
    SqliteDatabaseError,
};
use crate::{
    db::traits::{
        CatalogManagement,
        ClosedTeam,
        CompletionUpdate,
        CrowdTagManagement,
        DatabaseBackend,
        GroupBuyDatabase,
        InsertCallbackResult,
        InsertTaskResult,
        InsertTradeOrderResult,
        LockCountUpdate,
        LockSlotResult,
        NotificationTaskManagement,
        OrderManagement,
        PaymentCallbackManagement,
        PaymentRejection,
        PaymentResult,
        SettlementResult,
        TradeOrderManagement,
        VirtualCompletionPolicy,
    },
    db_types::{
        Activity,
        ActivityGoods,
        Discount,
        FlowSwitches,
        NewNotificationTask,
        NewOrder,
        NewPaymentCallback,
        NewTradeOrder,
        NotificationTask,
        Order,
        OrderId,
        OrderStatusType,
        PaymentCallbackRecord,
        Sku,
        TradeOrder,
        TradeOrderId,
        TradeOrderStatus,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `GB_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A distributed lock provider that shares this database's pool.
    pub fn lock_provider(&self) -> SqliteLockProvider {
        SqliteLockProvider::new(self.pool.clone())
    }

    pub async fn upsert_activity(&self, activity: &Activity) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_activity(activity, &mut conn).await?;
        Ok(())
    }

    pub async fn upsert_activity_goods(&self, goods: &ActivityGoods) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_activity_goods(goods, &mut conn).await?;
        Ok(())
    }

    pub async fn upsert_discount(&self, discount: &Discount) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_discount(discount, &mut conn).await?;
        Ok(())
    }

    pub async fn upsert_sku(&self, sku: &Sku) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_sku(sku, &mut conn).await?;
        Ok(())
    }

    /// Sets a dynamic config value and returns its new version.
    pub async fn set_config(&self, key: &str, value: &str) -> Result<i64, SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let version = catalog::set_config(key, value, Utc::now(), &mut conn).await?;
        debug!("🗃️ Config {key} set to '{value}' (version {version})");
        Ok(version)
    }

    async fn decrement_in_tx(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
        conn: &mut sqlx::SqliteConnection,
    ) -> Result<(), SqliteDatabaseError> {
        if !orders::decrement_lock_count(order_id, now, conn).await? {
            debug!("🗃️ No slot released on [{order_id}]; the team is closed or has no unpaid slot");
        }
        Ok(())
    }
}

impl DatabaseBackend for SqliteDatabase {
    type Error = SqliteDatabaseError;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) {
        self.pool.close().await;
    }
}

impl OrderManagement for SqliteDatabase {
    async fn save(&self, order: NewOrder) -> Result<Order, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let order_id = order.order_id.clone();
        orders::insert_order(order, Utc::now(), &mut conn).await.map_err(|e| {
            if super::is_unique_violation(&e) {
                SqliteDatabaseError::DuplicateOrder(order_id.to_string())
            } else {
                e.into()
            }
        })
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_id(order_id, &mut conn).await?)
    }

    async fn increment_lock_count(&self, order_id: &OrderId) -> Result<LockCountUpdate, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let now = Utc::now();
        let result = match orders::increment_lock_count(order_id, now, &mut conn).await? {
            Some(order) => LockCountUpdate::Locked(order.lock_count),
            None => LockCountUpdate::Rejected(orders::classify_lock_rejection(order_id, now, &mut conn).await?),
        };
        Ok(result)
    }

    async fn decrement_lock_count(&self, order_id: &OrderId) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::decrement_lock_count(order_id, Utc::now(), &mut conn).await?)
    }

    async fn try_increment_complete_count(&self, order_id: &OrderId) -> Result<CompletionUpdate, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let now = Utc::now();
        let result = match orders::increment_complete_count(order_id, now, &mut conn).await? {
            Some(order) => completion_update(&order),
            None => CompletionUpdate::Rejected(orders::classify_completion_rejection(order_id, now, &mut conn).await?),
        };
        Ok(result)
    }

    async fn fetch_pending_orders_by_activity(&self, activity_id: i64) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_pending_orders_by_activity(activity_id, &mut conn).await?)
    }

    async fn find_timeout_orders(&self, limit: i64) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::find_timeout_orders(Utc::now(), limit, &mut conn).await?)
    }

    async fn find_virtual_completable_orders(
        &self,
        policy: &VirtualCompletionPolicy,
        limit: i64,
    ) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::find_virtual_completable_orders(policy, Utc::now(), limit, &mut conn).await?)
    }

    async fn find_failed_orders_with_open_legs(&self, limit: i64) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::find_failed_with_open_legs(limit, &mut conn).await?)
    }

    async fn find_unsettled_success_orders(&self, limit: i64) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::find_unsettled_success(limit, &mut conn).await?)
    }

    async fn update_status(
        &self,
        order_id: &OrderId,
        status: OrderStatusType,
        reason: Option<&str>,
    ) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let updated = orders::update_status(order_id, status, reason, Utc::now(), &mut conn).await?;
        Ok(updated.is_some())
    }
}

fn completion_update(order: &Order) -> CompletionUpdate {
    if order.status == OrderStatusType::Success {
        info!("🗃️ Team order [{}] reached its target of {}", order.order_id, order.target_count);
        CompletionUpdate::Completed(order.complete_count)
    } else {
        CompletionUpdate::Incremented(order.complete_count)
    }
}

impl TradeOrderManagement for SqliteDatabase {
    async fn fetch_trade_order(&self, trade_order_id: &TradeOrderId) -> Result<Option<TradeOrder>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(trade_orders::fetch_by_trade_order_id(trade_order_id, &mut conn).await?)
    }

    async fn fetch_trade_order_by_out_trade_no(&self, out_trade_no: &str) -> Result<Option<TradeOrder>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(trade_orders::fetch_by_out_trade_no(out_trade_no, &mut conn).await?)
    }

    async fn fetch_trade_orders_for_order(&self, order_id: &OrderId) -> Result<Vec<TradeOrder>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(trade_orders::fetch_for_order(order_id, &mut conn).await?)
    }

    async fn count_live_trade_orders(&self, activity_id: i64, user_id: &str) -> Result<i64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(trade_orders::count_live(activity_id, user_id, &mut conn).await?)
    }

    async fn find_unpaid_trade_orders(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TradeOrder>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(trade_orders::find_unpaid(created_before, limit, &mut conn).await?)
    }
}

impl PaymentCallbackManagement for SqliteDatabase {
    async fn save_callback(&self, callback: NewPaymentCallback) -> Result<InsertCallbackResult, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(payment_callbacks::idempotent_insert(callback, Utc::now(), &mut conn).await?)
    }

    async fn exists_by_callback_id(&self, callback_id: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(payment_callbacks::exists(callback_id, &mut conn).await?)
    }

    async fn find_by_callback_id(&self, callback_id: &str) -> Result<Option<PaymentCallbackRecord>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(payment_callbacks::fetch_by_callback_id(callback_id, &mut conn).await?)
    }
}

impl NotificationTaskManagement for SqliteDatabase {
    async fn save_task(&self, task: NewNotificationTask) -> Result<InsertTaskResult, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::idempotent_insert(task, Utc::now(), &mut conn).await?)
    }

    async fn update_task(&self, task: &NotificationTask) -> Result<NotificationTask, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        notification_tasks::update_task(task, Utc::now(), &mut conn)
            .await?
            .ok_or_else(|| SqliteDatabaseError::QueryError(format!("Notification task {} does not exist", task.task_id)))
    }

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<NotificationTask>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::fetch_by_task_id(task_id, &mut conn).await?)
    }

    async fn find_by_trade_order_id(&self, trade_order_id: &TradeOrderId) -> Result<Vec<NotificationTask>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::fetch_by_trade_order_id(trade_order_id, &mut conn).await?)
    }

    async fn find_pending_tasks(&self, limit: i64) -> Result<Vec<NotificationTask>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::fetch_due(Utc::now(), 0, limit, &mut conn).await?)
    }

    async fn find_pending_tasks_page(&self, page: i64, page_size: i64) -> Result<Vec<NotificationTask>, Self::Error> {
        if page < 0 || page_size <= 0 {
            return Err(SqliteDatabaseError::QueryError(format!("Invalid page {page} of size {page_size}")));
        }
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::fetch_due(Utc::now(), page * page_size, page_size, &mut conn).await?)
    }

    async fn claim_task(&self, task_id: &str) -> Result<Option<NotificationTask>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::claim(task_id, Utc::now(), &mut conn).await?)
    }

    async fn record_delivery_success(&self, task_id: &str) -> Result<Option<NotificationTask>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::mark_success(task_id, Utc::now(), &mut conn).await?)
    }

    async fn record_delivery_failure(
        &self,
        task_id: &str,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Option<NotificationTask>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::mark_failure(task_id, error, next_attempt_at, Utc::now(), &mut conn).await?)
    }

    async fn reset_stale_tasks(&self, claimed_before: DateTime<Utc>) -> Result<u64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(notification_tasks::reset_stale(claimed_before, Utc::now(), &mut conn).await?)
    }
}

impl CrowdTagManagement for SqliteDatabase {
    async fn check_user_in_tag(&self, tag_id: &str, user_id: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(crowd_tags::is_member(tag_id, user_id, &mut conn).await?)
    }

    async fn batch_check_users_in_tag(
        &self,
        tag_id: &str,
        user_ids: &[String],
    ) -> Result<HashMap<String, bool>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(crowd_tags::batch_check(tag_id, user_ids, &mut conn).await?)
    }

    async fn get_user_ids_by_tag_id(&self, tag_id: &str) -> Result<Vec<String>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(crowd_tags::user_ids_for_tag(tag_id, &mut conn).await?)
    }

    async fn count_users_by_tag_id(&self, tag_id: &str) -> Result<i64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(crowd_tags::count_for_tag(tag_id, &mut conn).await?)
    }

    async fn add_users_to_tag(&self, tag_id: &str, user_ids: &[String]) -> Result<u64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(crowd_tags::add_users(tag_id, user_ids, Utc::now(), &mut conn).await?)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_activity(&self, activity_id: i64) -> Result<Option<Activity>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_activity(activity_id, &mut conn).await?)
    }

    async fn fetch_activity_goods(
        &self,
        goods_id: &str,
        source: &str,
        channel: &str,
    ) -> Result<Option<ActivityGoods>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_activity_goods(goods_id, source, channel, &mut conn).await?)
    }

    async fn fetch_discount(&self, discount_id: i64) -> Result<Option<Discount>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_discount(discount_id, &mut conn).await?)
    }

    async fn fetch_sku(&self, goods_id: &str) -> Result<Option<Sku>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_sku(goods_id, &mut conn).await?)
    }

    async fn fetch_flow_switches(&self) -> Result<FlowSwitches, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_flow_switches(&mut conn).await?)
    }
}

impl GroupBuyDatabase for SqliteDatabase {
    async fn lock_slot(
        &self,
        new_order: Option<NewOrder>,
        trade_order: NewTradeOrder,
        participation_limit: i64,
    ) -> Result<LockSlotResult, Self::Error> {
        let now = Utc::now();
        let order_id = trade_order.order_id.clone();
        let mut tx = self.pool.begin().await?;
        let trade_order = match trade_orders::idempotent_insert(trade_order, participation_limit, now, &mut tx).await? {
            InsertTradeOrderResult::Inserted(t) => t,
            InsertTradeOrderResult::AlreadyExists(existing) => {
                tx.rollback().await?;
                return Ok(LockSlotResult::AlreadyLocked(existing));
            },
            InsertTradeOrderResult::LimitReached => {
                tx.rollback().await?;
                return Ok(LockSlotResult::LimitReached);
            },
        };
        if let Some(new_order) = new_order {
            if new_order.order_id != order_id {
                return Err(SqliteDatabaseError::QueryError(format!(
                    "Trade order [{}] does not belong to new team order [{}]",
                    trade_order.trade_order_id, new_order.order_id
                )));
            }
            orders::insert_order(new_order, now, &mut tx).await.map_err(|e| {
                if super::is_unique_violation(&e) {
                    SqliteDatabaseError::DuplicateOrder(order_id.to_string())
                } else {
                    e.into()
                }
            })?;
        }
        let order = match orders::increment_lock_count(&order_id, now, &mut tx).await? {
            Some(order) => order,
            None => {
                let rejection = orders::classify_lock_rejection(&order_id, now, &mut tx).await?;
                tx.rollback().await?;
                debug!("🗃️ Slot lock for [{}] on [{order_id}] rolled back: {rejection}", trade_order.out_trade_no);
                return Ok(LockSlotResult::Rejected(rejection));
            },
        };
        tx.commit().await?;
        debug!(
            "🗃️ [{}] locked slot {}/{} of [{order_id}]",
            trade_order.trade_order_id, order.lock_count, order.target_count
        );
        Ok(LockSlotResult::Locked { order, trade_order })
    }

    async fn apply_payment(&self, callback: NewPaymentCallback) -> Result<PaymentResult, Self::Error> {
        let now = Utc::now();
        let trade_order_id = callback.trade_order_id.clone();
        let amount = callback.amount;
        let pay_time = callback.pay_time;
        let mut tx = self.pool.begin().await?;
        let record = match payment_callbacks::idempotent_insert(callback, now, &mut tx).await? {
            InsertCallbackResult::Inserted(record) => record,
            InsertCallbackResult::AlreadyExists(callback_id) => {
                tx.rollback().await?;
                return Ok(PaymentResult::Duplicate(callback_id));
            },
        };
        let trade_order = match trade_orders::fetch_by_trade_order_id(&trade_order_id, &mut tx).await? {
            Some(t) => t,
            None => {
                tx.rollback().await?;
                return Ok(PaymentResult::Rejected(PaymentRejection::TradeOrderNotFound));
            },
        };
        match trade_order.status {
            TradeOrderStatus::Create => {},
            TradeOrderStatus::Paid | TradeOrderStatus::Settled => {
                tx.commit().await?;
                info!(
                    "🗃️ Callback {} is for [{trade_order_id}], which is already {}. Recorded without side effects.",
                    record.callback_id, trade_order.status
                );
                return Ok(PaymentResult::AlreadyPaid(trade_order));
            },
            status => {
                tx.rollback().await?;
                return Ok(PaymentResult::Rejected(PaymentRejection::InvalidStatus(status)));
            },
        }
        if amount != trade_order.pay_price {
            tx.rollback().await?;
            return Ok(PaymentResult::Rejected(PaymentRejection::AmountMismatch {
                expected: trade_order.pay_price,
                actual: amount,
            }));
        }
        let Some(trade_order) = trade_orders::mark_paid(&trade_order_id, pay_time, now, &mut tx).await? else {
            tx.rollback().await?;
            return Ok(PaymentResult::Rejected(PaymentRejection::InvalidStatus(trade_order.status)));
        };
        let order = match orders::increment_complete_count(&trade_order.order_id, now, &mut tx).await? {
            Some(order) => order,
            None => {
                let rejection = orders::classify_completion_rejection(&trade_order.order_id, now, &mut tx).await?;
                tx.rollback().await?;
                return Ok(PaymentResult::Rejected(PaymentRejection::Counter(rejection)));
            },
        };
        tx.commit().await?;
        let completion = completion_update(&order);
        debug!(
            "🗃️ Callback {} applied. [{trade_order_id}] is PAID and [{}] has {}/{} paid members",
            record.callback_id, order.order_id, order.complete_count, order.target_count
        );
        Ok(PaymentResult::Applied { trade_order, order, completion })
    }

    async fn settle_order(&self, order_id: &OrderId, max_retry_count: i64) -> Result<SettlementResult, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let settled = trade_orders::settle_paid_for_order(order_id, now, &mut tx).await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| SqliteDatabaseError::OrderNotFound(order_id.to_string()))?;
        let mut tasks = Vec::with_capacity(settled.len());
        for leg in &settled {
            match NewNotificationTask::for_settled_trade_order(leg, max_retry_count, now) {
                Some(task) => match notification_tasks::idempotent_insert(task, now, &mut tx).await? {
                    InsertTaskResult::Inserted(task) => tasks.push(task),
                    InsertTaskResult::AlreadyExists(task) => {
                        warn!("🗃️ Notification task {} already existed for [{}]", task.task_id, leg.trade_order_id)
                    },
                },
                None => trace!("🗃️ [{}] has no usable notify config. No notification queued.", leg.trade_order_id),
            }
        }
        tx.commit().await?;
        debug!("🗃️ Settled {} legs of [{order_id}] and queued {} notifications", settled.len(), tasks.len());
        Ok(SettlementResult { order, settled, tasks })
    }

    async fn release_trade_order(
        &self,
        trade_order_id: &TradeOrderId,
        status: TradeOrderStatus,
        reason: &str,
    ) -> Result<Option<TradeOrder>, Self::Error> {
        if !matches!(status, TradeOrderStatus::Timeout | TradeOrderStatus::Refund) {
            return Err(SqliteDatabaseError::QueryError(format!("Cannot release a trade order into {status}")));
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let Some(trade_order) = trade_orders::close_unpaid(trade_order_id, status, reason, now, &mut tx).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        self.decrement_in_tx(&trade_order.order_id, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ [{trade_order_id}] moved to {status} ({reason})");
        Ok(Some(trade_order))
    }

    async fn refund_paid_trade_order(
        &self,
        trade_order_id: &TradeOrderId,
        reason: &str,
    ) -> Result<Option<TradeOrder>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(trade_orders::refund_paid(trade_order_id, reason, Utc::now(), &mut conn).await?)
    }

    async fn fail_order(&self, order_id: &OrderId, reason: &str) -> Result<Option<ClosedTeam>, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let Some(order) =
            orders::update_status(order_id, OrderStatusType::Failed, Some(reason), now, &mut tx).await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let timed_out = trade_orders::time_out_unpaid_for_order(order_id, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ [{order_id}] FAILED ({reason}). {} unpaid legs timed out", timed_out.len());
        Ok(Some(ClosedTeam { order, timed_out }))
    }

    async fn complete_order_virtually(&self, order_id: &OrderId) -> Result<Option<ClosedTeam>, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::complete_virtually(order_id, now, &mut tx).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        let timed_out = trade_orders::time_out_unpaid_for_order(order_id, now, &mut tx).await?;
        tx.commit().await?;
        info!(
            "🗃️ [{order_id}] virtually completed with {}/{} paid members. {} unpaid legs timed out",
            order.complete_count,
            order.target_count,
            timed_out.len()
        );
        Ok(Some(ClosedTeam { order, timed_out }))
    }
}
