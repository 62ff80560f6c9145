use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::{from_millis, is_unique_violation, opt_from_millis, parse_column, to_millis};
use crate::{
    db::traits::InsertTaskResult,
    db_types::{NewNotificationTask, NotificationTask, OrderId, TradeOrderId},
};

impl FromRow<'_, SqliteRow> for NotificationTask {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            trade_order_id: TradeOrderId(row.try_get("trade_order_id")?),
            order_id: OrderId(row.try_get("order_id")?),
            notify_type: parse_column(row, "notify_type")?,
            notify_target: row.try_get("notify_target")?,
            payload: row.try_get("payload")?,
            status: parse_column(row, "status")?,
            retry_count: row.try_get("retry_count")?,
            max_retry_count: row.try_get("max_retry_count")?,
            next_attempt_at: from_millis(row.try_get("next_attempt_at")?)?,
            last_error: row.try_get("last_error")?,
            claimed_at: opt_from_millis(row.try_get("claimed_at")?)?,
            created_at: from_millis(row.try_get("created_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
        })
    }
}

/// Inserts a `PENDING` task that is due immediately. A task id that already exists is returned unchanged.
pub async fn idempotent_insert(
    task: NewNotificationTask,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<InsertTaskResult, sqlx::Error> {
    let task_id = task.task_id.clone();
    let now = to_millis(now);
    let result: Result<NotificationTask, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO notification_tasks (
                task_id,
                trade_order_id,
                order_id,
                notify_type,
                notify_target,
                payload,
                max_retry_count,
                next_attempt_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $8)
            RETURNING *;
        "#,
    )
    .bind(task.task_id)
    .bind(task.trade_order_id.as_str())
    .bind(task.order_id.as_str())
    .bind(task.notify_type.code())
    .bind(task.notify_target)
    .bind(task.payload.to_string())
    .bind(task.max_retry_count)
    .bind(now)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(task) => {
            debug!("🗃️ Notification task {task_id} queued");
            Ok(InsertTaskResult::Inserted(task))
        },
        Err(e) if is_unique_violation(&e) => match fetch_by_task_id(&task_id, conn).await? {
            Some(existing) => Ok(InsertTaskResult::AlreadyExists(existing)),
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}

pub async fn update_task(
    task: &NotificationTask,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<NotificationTask>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE notification_tasks SET
                status = $2,
                retry_count = $3,
                max_retry_count = $4,
                next_attempt_at = $5,
                last_error = $6,
                claimed_at = $7,
                updated_at = $8
            WHERE task_id = $1
            RETURNING *;
        "#,
    )
    .bind(&task.task_id)
    .bind(task.status.code())
    .bind(task.retry_count)
    .bind(task.max_retry_count)
    .bind(to_millis(task.next_attempt_at))
    .bind(&task.last_error)
    .bind(task.claimed_at.map(to_millis))
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await
}

pub async fn fetch_by_task_id(task_id: &str, conn: &mut SqliteConnection) -> Result<Option<NotificationTask>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM notification_tasks WHERE task_id = $1").bind(task_id).fetch_optional(conn).await
}

pub async fn fetch_by_trade_order_id(
    trade_order_id: &TradeOrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<NotificationTask>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM notification_tasks WHERE trade_order_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(trade_order_id.as_str())
        .fetch_all(conn)
        .await
}

/// Due `PENDING` tasks, oldest schedule first.
pub async fn fetch_due(
    now: DateTime<Utc>,
    offset: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<NotificationTask>, sqlx::Error> {
    let tasks: Vec<NotificationTask> = sqlx::query_as(
        r#"
            SELECT * FROM notification_tasks
            WHERE status = 'PENDING' AND next_attempt_at <= $1
            ORDER BY next_attempt_at ASC, id ASC
            LIMIT $2 OFFSET $3
        "#,
    )
    .bind(to_millis(now))
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await?;
    trace!("🗃️ {} notification tasks are due", tasks.len());
    Ok(tasks)
}

pub async fn claim(
    task_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<NotificationTask>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE notification_tasks SET status = 'PROCESSING', claimed_at = $2, updated_at = $2
            WHERE task_id = $1 AND status = 'PENDING' AND next_attempt_at <= $2
            RETURNING *;
        "#,
    )
    .bind(task_id)
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await
}

pub async fn mark_success(
    task_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<NotificationTask>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE notification_tasks SET status = 'SUCCESS', last_error = NULL, claimed_at = NULL, updated_at = $2
            WHERE task_id = $1 AND status = 'PROCESSING'
            RETURNING *;
        "#,
    )
    .bind(task_id)
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await
}

/// Records a failed attempt. `SET` expressions see the pre-update row, so `retry_count + 1` is the new count in both
/// the assignment and the status decision.
pub async fn mark_failure(
    task_id: &str,
    error: &str,
    next_attempt_at: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<NotificationTask>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE notification_tasks SET
                retry_count = retry_count + 1,
                status = CASE WHEN retry_count + 1 >= max_retry_count THEN 'FAILED' ELSE 'PENDING' END,
                next_attempt_at = $3,
                last_error = $2,
                claimed_at = NULL,
                updated_at = $4
            WHERE task_id = $1 AND status = 'PROCESSING'
            RETURNING *;
        "#,
    )
    .bind(task_id)
    .bind(error)
    .bind(to_millis(next_attempt_at))
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await
}

pub async fn reset_stale(
    claimed_before: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE notification_tasks SET status = 'PENDING', claimed_at = NULL, updated_at = $2
            WHERE status = 'PROCESSING' AND claimed_at < $1
        "#,
    )
    .bind(to_millis(claimed_before))
    .bind(to_millis(now))
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
