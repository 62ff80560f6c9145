use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::{from_millis, is_unique_violation, to_millis};
use crate::{
    db::traits::InsertCallbackResult,
    db_types::{Money, NewPaymentCallback, PaymentCallbackRecord, TradeOrderId},
};

impl FromRow<'_, SqliteRow> for PaymentCallbackRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            callback_id: row.try_get("callback_id")?,
            trade_order_id: TradeOrderId(row.try_get("trade_order_id")?),
            amount: Money::from(row.try_get::<i64, _>("amount")?),
            pay_time: from_millis(row.try_get("pay_time")?)?,
            channel: row.try_get("channel")?,
            payment_no: row.try_get("payment_no")?,
            created_at: from_millis(row.try_get("created_at")?)?,
        })
    }
}

/// Inserts the callback record. The unique index on `callback_id` settles races between concurrent deliveries of the
/// same callback: the loser gets [`InsertCallbackResult::AlreadyExists`].
pub async fn idempotent_insert(
    callback: NewPaymentCallback,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<InsertCallbackResult, sqlx::Error> {
    let callback_id = callback.callback_id.clone();
    let result: Result<PaymentCallbackRecord, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO payment_callbacks (callback_id, trade_order_id, amount, pay_time, channel, payment_no, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(callback.callback_id)
    .bind(callback.trade_order_id.as_str())
    .bind(callback.amount.value())
    .bind(to_millis(callback.pay_time))
    .bind(callback.channel)
    .bind(callback.payment_no)
    .bind(to_millis(now))
    .fetch_one(conn)
    .await;
    match result {
        Ok(record) => Ok(InsertCallbackResult::Inserted(record)),
        Err(e) if is_unique_violation(&e) => {
            debug!("🗃️ Payment callback {callback_id} has already been recorded");
            Ok(InsertCallbackResult::AlreadyExists(callback_id))
        },
        Err(e) => Err(e),
    }
}

pub async fn exists(callback_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM payment_callbacks WHERE callback_id = $1)")
        .bind(callback_id)
        .fetch_one(conn)
        .await?;
    Ok(exists)
}

pub async fn fetch_by_callback_id(
    callback_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentCallbackRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_callbacks WHERE callback_id = $1").bind(callback_id).fetch_optional(conn).await
}
