use chrono::{DateTime, Utc};
use log::{debug, error, trace};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::{from_millis, opt_from_millis, parse_column, to_millis};
use crate::{
    db::traits::{CounterRejection, VirtualCompletionPolicy},
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
};

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            order_id: OrderId(row.try_get("order_id")?),
            activity_id: row.try_get("activity_id")?,
            goods_id: row.try_get("goods_id")?,
            leader_user_id: row.try_get("leader_user_id")?,
            target_count: row.try_get("target_count")?,
            lock_count: row.try_get("lock_count")?,
            complete_count: row.try_get("complete_count")?,
            status: parse_column(row, "status")?,
            deadline: from_millis(row.try_get("deadline")?)?,
            source: row.try_get("source")?,
            channel: row.try_get("channel")?,
            virtual_completed: row.try_get("virtual_completed")?,
            fail_reason: row.try_get("fail_reason")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
            completed_at: opt_from_millis(row.try_get("completed_at")?)?,
        })
    }
}

/// Inserts a new team order with zeroed counters. This is not atomic on its own; run it inside a transaction and pass
/// `&mut tx` if it must go together with other writes.
pub async fn insert_order(order: NewOrder, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let now = to_millis(now);
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO team_orders (
                order_id,
                activity_id,
                goods_id,
                leader_user_id,
                target_count,
                deadline,
                source,
                channel,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(order.activity_id)
    .bind(order.goods_id)
    .bind(order.leader_user_id)
    .bind(order.target_count)
    .bind(to_millis(order.deadline))
    .bind(order.source)
    .bind(order.channel)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Team order [{}] inserted with id {}", order.order_id, order.id);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM team_orders WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Adds one to the lock count if the team is pending, not full and not expired. Returns the updated order, or `None`
/// if the conditions did not hold.
pub async fn increment_lock_count(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE team_orders SET lock_count = lock_count + 1, updated_at = $2
            WHERE order_id = $1
              AND status = 'PENDING'
              AND lock_count < target_count
              AND deadline > $2
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Releases one unpaid slot. Paid slots (`complete_count`) can never be released, and the counters of terminal orders
/// are frozen.
pub async fn decrement_lock_count(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE team_orders SET lock_count = lock_count - 1, updated_at = $2
            WHERE order_id = $1
              AND status = 'PENDING'
              AND lock_count > 0
              AND lock_count > complete_count
        "#,
    )
    .bind(order_id.as_str())
    .bind(to_millis(now))
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Adds one to the completion count. The statement that brings the count to the target also marks the order
/// `SUCCESS`; SQLite evaluates every `SET` expression against the pre-update row.
pub async fn increment_complete_count(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE team_orders SET
                complete_count = complete_count + 1,
                status = CASE WHEN complete_count + 1 = target_count THEN 'SUCCESS' ELSE status END,
                completed_at = CASE WHEN complete_count + 1 = target_count THEN $2 ELSE completed_at END,
                updated_at = $2
            WHERE order_id = $1
              AND status = 'PENDING'
              AND complete_count < target_count
              AND complete_count < lock_count
              AND deadline > $2
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Works out why a lock increment was refused, from the order as it stands now.
pub async fn classify_lock_rejection(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CounterRejection, sqlx::Error> {
    let rejection = match fetch_order_by_order_id(order_id, conn).await? {
        None => CounterRejection::OrderNotFound,
        Some(o) if o.status != OrderStatusType::Pending => CounterRejection::NotPending(o.status),
        Some(o) if o.is_expired_at(now) => CounterRejection::Expired,
        Some(_) => CounterRejection::TeamFull,
    };
    trace!("🗃️ Lock increment on [{order_id}] refused: {rejection}");
    Ok(rejection)
}

/// Works out why a completion increment was refused. An attempt to go past the target is reported at `error` level,
/// since the counter constraints should make that impossible.
pub async fn classify_completion_rejection(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CounterRejection, sqlx::Error> {
    let rejection = match fetch_order_by_order_id(order_id, conn).await? {
        None => CounterRejection::OrderNotFound,
        Some(o) if o.status != OrderStatusType::Pending => CounterRejection::NotPending(o.status),
        Some(o) if o.is_expired_at(now) => CounterRejection::Expired,
        Some(o) if o.complete_count >= o.target_count => {
            error!(
                "🗃️ Invariant violation: completion of [{order_id}] would overshoot its target ({}/{}) while PENDING",
                o.complete_count, o.target_count
            );
            CounterRejection::Overshoot
        },
        Some(_) => CounterRejection::NoLockedSlot,
    };
    trace!("🗃️ Completion increment on [{order_id}] refused: {rejection}");
    Ok(rejection)
}

pub async fn fetch_pending_orders_by_activity(
    activity_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM team_orders WHERE activity_id = $1 AND status = 'PENDING' ORDER BY created_at ASC, id ASC",
    )
    .bind(activity_id)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn find_timeout_orders(
    now: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM team_orders WHERE status = 'PENDING' AND deadline <= $1 ORDER BY deadline ASC, id ASC LIMIT $2",
    )
    .bind(to_millis(now))
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// `FAILED` orders that still hold `CREATE` or `PAID` legs, least recently touched first. These are teams whose
/// refunds did not all go through.
pub async fn find_failed_with_open_legs(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM team_orders
            WHERE status = 'FAILED'
              AND EXISTS (
                SELECT 1 FROM trade_orders
                WHERE trade_orders.order_id = team_orders.order_id AND trade_orders.status IN ('CREATE', 'PAID')
              )
            ORDER BY updated_at ASC, id ASC
            LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await
}

/// `SUCCESS` orders that still hold `PAID` legs, oldest completion first.
pub async fn find_unsettled_success(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM team_orders
            WHERE status = 'SUCCESS'
              AND EXISTS (
                SELECT 1 FROM trade_orders
                WHERE trade_orders.order_id = team_orders.order_id AND trade_orders.status = 'PAID'
              )
            ORDER BY completed_at ASC, id ASC
            LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await
}

pub async fn find_virtual_completable_orders(
    policy: &VirtualCompletionPolicy,
    now: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let window_end = to_millis(now + policy.lead_time);
    let orders = sqlx::query_as(
        r#"
            SELECT team_orders.* FROM team_orders
            JOIN activities ON activities.id = team_orders.activity_id
            WHERE team_orders.status = 'PENDING'
              AND activities.group_type = 'VIRTUAL'
              AND team_orders.deadline <= $1
              AND team_orders.complete_count >= 1
              AND team_orders.complete_count * 100 >= team_orders.target_count * $2
            ORDER BY team_orders.deadline ASC, team_orders.id ASC
            LIMIT $3
        "#,
    )
    .bind(window_end)
    .bind(i64::from(policy.min_complete_percent))
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Conditional transition out of `PENDING`. Returns the updated order, or `None` if the order was not `PENDING`.
pub async fn update_status(
    order_id: &OrderId,
    status: OrderStatusType,
    reason: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let now = to_millis(now);
    let completed_at = (status == OrderStatusType::Success).then_some(now);
    let order = sqlx::query_as(
        r#"
            UPDATE team_orders SET
                status = $2,
                fail_reason = COALESCE($3, fail_reason),
                completed_at = COALESCE($4, completed_at),
                updated_at = $5
            WHERE order_id = $1 AND status = 'PENDING'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(status.code())
    .bind(reason)
    .bind(completed_at)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Marks a pending order with at least one paid member `SUCCESS` without it being full. The unpaid slots are given up
/// in the same statement, so the caller must time out the matching `CREATE` legs in the same transaction.
pub async fn complete_virtually(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let now = to_millis(now);
    let order = sqlx::query_as(
        r#"
            UPDATE team_orders SET
                status = 'SUCCESS',
                lock_count = complete_count,
                virtual_completed = 1,
                completed_at = $2,
                updated_at = $2
            WHERE order_id = $1 AND status = 'PENDING' AND complete_count >= 1
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}
