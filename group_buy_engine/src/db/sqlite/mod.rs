//! # SQLite backend
//!
//! The "low-level" SQLite interactions live in plain functions that accept a `&mut SqliteConnection` argument.
//! Callers can obtain a connection from a pool, or open a transaction and pass `&mut tx` through without any other
//! changes. [`SqliteDatabase`] composes them into the storage traits.
//!
//! Timestamps are stored as unix milliseconds, and enum columns as their upper-case codes.
use std::{env, str::FromStr, time::Duration};

use chrono::{DateTime, TimeZone, Utc};
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Row,
    SqlitePool,
};

mod db;
mod errors;

pub mod catalog;
pub mod crowd_tags;
pub mod locks;
pub mod notification_tasks;
pub mod orders;
pub mod payment_callbacks;
pub mod trade_orders;

pub use db::SqliteDatabase;
pub use errors::SqliteDatabaseError;
pub use locks::SqliteLockProvider;

const SQLITE_DB_URL: &str = "sqlite://data/group_buy.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("GB_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ GB_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Opens a pool in WAL mode. Writers wait on each other for up to the busy timeout instead of failing immediately.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

pub(crate) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| sqlx::Error::Decode(format!("Invalid timestamp: {ms}").into()))
}

pub(crate) fn opt_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    ms.map(from_millis).transpose()
}

/// Reads a text column and parses it with `FromStr`.
pub(crate) fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.try_get(column)?;
    value.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) })
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
