//! A lease-based lock table shared by every process that uses the same database.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use log::{debug, trace, warn};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::time::Instant;

use super::to_millis;
use crate::db::traits::{DistributedLock, LockError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Takes `key` for `owner` if it is free or its lease has run out.
pub async fn acquire(key: &str, owner: &str, lease: Duration, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let now = Utc::now();
    let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(365));
    let expires_at = now.checked_add_signed(lease).map(to_millis).unwrap_or(i64::MAX);
    let result = sqlx::query(
        r#"
            INSERT INTO distributed_locks (lock_key, owner, expires_at) VALUES ($1, $2, $3)
            ON CONFLICT(lock_key) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at
            WHERE distributed_locks.expires_at <= $4
        "#,
    )
    .bind(key)
    .bind(owner)
    .bind(expires_at)
    .bind(to_millis(now))
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release(key: &str, owner: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM distributed_locks WHERE lock_key = $1 AND owner = $2")
        .bind(key)
        .bind(owner)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn remove(key: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM distributed_locks WHERE lock_key = $1").bind(key).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

/// [`DistributedLock`] over the `distributed_locks` table.
///
/// Every successful acquisition gets a fresh owner token, remembered per key so that only this provider can unlock
/// it. Clones share the token map.
#[derive(Clone)]
pub struct SqliteLockProvider {
    pool: SqlitePool,
    held: Arc<Mutex<HashMap<String, String>>>,
    poll_interval: Duration,
}

impl SqliteLockProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, held: Arc::new(Mutex::new(HashMap::new())), poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn new_token() -> String {
        format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>())
    }

    fn remember(&self, key: &str, token: String) {
        match self.held.lock() {
            Ok(mut held) => {
                held.insert(key.to_string(), token);
            },
            Err(poisoned) => {
                poisoned.into_inner().insert(key.to_string(), token);
            },
        }
    }

    fn forget(&self, key: &str) -> Option<String> {
        match self.held.lock() {
            Ok(mut held) => held.remove(key),
            Err(poisoned) => poisoned.into_inner().remove(key),
        }
    }
}

impl DistributedLock for SqliteLockProvider {
    async fn try_lock(&self, key: &str, wait: Duration, lease: Duration) -> Result<bool, LockError> {
        let token = Self::new_token();
        let give_up_at = Instant::now() + wait;
        loop {
            let mut conn = self.pool.acquire().await?;
            if acquire(key, &token, lease, &mut conn).await? {
                trace!("🔐️ Acquired {key}");
                self.remember(key, token);
                return Ok(true);
            }
            drop(conn);
            if Instant::now() + self.poll_interval > give_up_at {
                debug!("🔐️ Gave up waiting for {key} after {wait:?}");
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn unlock(&self, key: &str) -> Result<bool, LockError> {
        let Some(token) = self.forget(key) else {
            warn!("🔐️ Tried to unlock {key}, which this provider does not hold");
            return Ok(false);
        };
        let mut conn = self.pool.acquire().await?;
        let released = release(key, &token, &mut conn).await?;
        if !released {
            warn!("🔐️ The lease on {key} expired before it was unlocked");
        }
        Ok(released)
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.pool.acquire().await?;
        let set = acquire(key, &Self::new_token(), ttl, &mut conn).await?;
        trace!("🔐️ set_if_absent({key}) -> {set}");
        Ok(set)
    }

    async fn delete(&self, key: &str) -> Result<bool, LockError> {
        self.forget(key);
        let mut conn = self.pool.acquire().await?;
        Ok(remove(key, &mut conn).await?)
    }
}
