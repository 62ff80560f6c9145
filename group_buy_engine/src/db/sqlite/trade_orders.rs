use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::{from_millis, is_unique_violation, opt_from_millis, parse_column, to_millis};
use crate::{
    db::traits::InsertTradeOrderResult,
    db_types::{Money, NewTradeOrder, NotifyConfig, NotifyType, OrderId, TradeOrder, TradeOrderId, TradeOrderStatus},
};

impl FromRow<'_, SqliteRow> for TradeOrder {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let notify_type: Option<String> = row.try_get("notify_type")?;
        let notify = match notify_type {
            Some(t) => Some(NotifyConfig {
                notify_type: t
                    .parse::<NotifyType>()
                    .map_err(|e| sqlx::Error::ColumnDecode { index: "notify_type".into(), source: Box::new(e) })?,
                notify_url: row.try_get("notify_url")?,
                notify_topic: row.try_get("notify_topic")?,
            }),
            None => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            trade_order_id: TradeOrderId(row.try_get("trade_order_id")?),
            order_id: OrderId(row.try_get("order_id")?),
            activity_id: row.try_get("activity_id")?,
            user_id: row.try_get("user_id")?,
            goods_id: row.try_get("goods_id")?,
            goods_name: row.try_get("goods_name")?,
            original_price: Money::from(row.try_get::<i64, _>("original_price")?),
            deduction_price: Money::from(row.try_get::<i64, _>("deduction_price")?),
            pay_price: Money::from(row.try_get::<i64, _>("pay_price")?),
            status: parse_column(row, "status")?,
            out_trade_no: row.try_get("out_trade_no")?,
            source: row.try_get("source")?,
            channel: row.try_get("channel")?,
            notify,
            pay_time: opt_from_millis(row.try_get("pay_time")?)?,
            settlement_time: opt_from_millis(row.try_get("settlement_time")?)?,
            refund_reason: row.try_get("refund_reason")?,
            refund_time: opt_from_millis(row.try_get("refund_time")?)?,
            created_at: from_millis(row.try_get("created_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
        })
    }
}

/// Inserts a new leg in `CREATE` status, provided the user holds fewer than `participation_limit` live legs in the
/// activity. If a leg with the same `out_trade_no` exists already, that leg is returned instead, whether or not the
/// user is at the limit.
pub async fn idempotent_insert(
    trade_order: NewTradeOrder,
    participation_limit: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<InsertTradeOrderResult, sqlx::Error> {
    let out_trade_no = trade_order.out_trade_no.clone();
    match insert_trade_order(trade_order, participation_limit, now, conn).await {
        Ok(Some(t)) => {
            debug!("🗃️ Trade order [{}] inserted for out_trade_no {out_trade_no}", t.trade_order_id);
            Ok(InsertTradeOrderResult::Inserted(t))
        },
        Ok(None) => match fetch_by_out_trade_no(&out_trade_no, conn).await? {
            Some(existing) => Ok(InsertTradeOrderResult::AlreadyExists(existing)),
            None => {
                debug!("🗃️ out_trade_no {out_trade_no} not inserted. The user is at the participation limit.");
                Ok(InsertTradeOrderResult::LimitReached)
            },
        },
        Err(e) if is_unique_violation(&e) => match fetch_by_out_trade_no(&out_trade_no, conn).await? {
            Some(existing) => {
                debug!("🗃️ out_trade_no {out_trade_no} already belongs to [{}]", existing.trade_order_id);
                Ok(InsertTradeOrderResult::AlreadyExists(existing))
            },
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}

/// The live-leg count is evaluated in the same statement as the insert, under SQLite's write lock.
async fn insert_trade_order(
    trade_order: NewTradeOrder,
    participation_limit: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<TradeOrder>, sqlx::Error> {
    let (notify_type, notify_url, notify_topic) = match trade_order.notify {
        Some(n) => (Some(n.notify_type.code()), n.notify_url, n.notify_topic),
        None => (None, None, None),
    };
    sqlx::query_as(
        r#"
            INSERT INTO trade_orders (
                trade_order_id,
                order_id,
                activity_id,
                user_id,
                goods_id,
                goods_name,
                original_price,
                deduction_price,
                pay_price,
                out_trade_no,
                source,
                channel,
                notify_type,
                notify_url,
                notify_topic,
                created_at,
                updated_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16
            WHERE (
                SELECT COUNT(*) FROM trade_orders
                WHERE activity_id = $3 AND user_id = $4 AND status IN ('CREATE', 'PAID', 'SETTLED')
            ) < $17
            RETURNING *;
        "#,
    )
    .bind(trade_order.trade_order_id.as_str())
    .bind(trade_order.order_id.as_str())
    .bind(trade_order.activity_id)
    .bind(trade_order.user_id)
    .bind(trade_order.goods_id)
    .bind(trade_order.goods_name)
    .bind(trade_order.original_price.value())
    .bind(trade_order.deduction_price.value())
    .bind(trade_order.pay_price.value())
    .bind(trade_order.out_trade_no)
    .bind(trade_order.source)
    .bind(trade_order.channel)
    .bind(notify_type)
    .bind(notify_url)
    .bind(notify_topic)
    .bind(to_millis(now))
    .bind(participation_limit)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_by_trade_order_id(
    trade_order_id: &TradeOrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<TradeOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM trade_orders WHERE trade_order_id = $1")
        .bind(trade_order_id.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_by_out_trade_no(
    out_trade_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<TradeOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM trade_orders WHERE out_trade_no = $1").bind(out_trade_no).fetch_optional(conn).await
}

pub async fn fetch_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<TradeOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM trade_orders WHERE order_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

pub async fn count_live(activity_id: i64, user_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            SELECT COUNT(*) FROM trade_orders
            WHERE activity_id = $1 AND user_id = $2 AND status IN ('CREATE', 'PAID', 'SETTLED')
        "#,
    )
    .bind(activity_id)
    .bind(user_id)
    .fetch_one(conn)
    .await
}

pub async fn find_unpaid(
    created_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<TradeOrder>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM trade_orders WHERE status = 'CREATE' AND created_at < $1 ORDER BY created_at ASC, id ASC LIMIT $2",
    )
    .bind(to_millis(created_before))
    .bind(limit)
    .fetch_all(conn)
    .await
}

/// `CREATE` → `PAID`. Returns `None` if the leg was not in `CREATE`.
pub async fn mark_paid(
    trade_order_id: &TradeOrderId,
    pay_time: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<TradeOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE trade_orders SET status = 'PAID', pay_time = $2, updated_at = $3
            WHERE trade_order_id = $1 AND status = 'CREATE'
            RETURNING *;
        "#,
    )
    .bind(trade_order_id.as_str())
    .bind(to_millis(pay_time))
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await
}

/// Closes a `CREATE` leg as `TIMEOUT` or `REFUND`. The reason is only kept for refunds.
pub async fn close_unpaid(
    trade_order_id: &TradeOrderId,
    status: TradeOrderStatus,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<TradeOrder>, sqlx::Error> {
    let now = to_millis(now);
    let is_refund = status == TradeOrderStatus::Refund;
    sqlx::query_as(
        r#"
            UPDATE trade_orders SET
                status = $2,
                refund_reason = CASE WHEN $3 THEN $4 ELSE refund_reason END,
                refund_time = CASE WHEN $3 THEN $5 ELSE refund_time END,
                updated_at = $5
            WHERE trade_order_id = $1 AND status = 'CREATE'
            RETURNING *;
        "#,
    )
    .bind(trade_order_id.as_str())
    .bind(status.code())
    .bind(is_refund)
    .bind(reason)
    .bind(now)
    .fetch_optional(conn)
    .await
}

/// Times out every `CREATE` leg of a team order.
pub async fn time_out_unpaid_for_order(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<TradeOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE trade_orders SET status = 'TIMEOUT', updated_at = $2
            WHERE order_id = $1 AND status = 'CREATE'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(to_millis(now))
    .fetch_all(conn)
    .await
}

/// `PAID` → `SETTLED` for every leg of the order, provided the order is `SUCCESS`.
pub async fn settle_paid_for_order(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<TradeOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE trade_orders SET status = 'SETTLED', settlement_time = $2, updated_at = $2
            WHERE order_id = $1
              AND status = 'PAID'
              AND EXISTS (SELECT 1 FROM team_orders WHERE team_orders.order_id = $1 AND team_orders.status = 'SUCCESS')
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(to_millis(now))
    .fetch_all(conn)
    .await
}

/// `PAID` → `REFUND`, only for legs whose team order has `FAILED`.
pub async fn refund_paid(
    trade_order_id: &TradeOrderId,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<TradeOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE trade_orders SET status = 'REFUND', refund_reason = $2, refund_time = $3, updated_at = $3
            WHERE trade_order_id = $1
              AND status = 'PAID'
              AND order_id IN (SELECT order_id FROM team_orders WHERE status = 'FAILED')
            RETURNING *;
        "#,
    )
    .bind(trade_order_id.as_str())
    .bind(reason)
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await
}
