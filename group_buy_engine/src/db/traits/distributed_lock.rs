use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("Lock store error: {0}")]
    StoreError(String),
}

impl From<sqlx::Error> for LockError {
    fn from(e: sqlx::Error) -> Self {
        LockError::StoreError(e.to_string())
    }
}

/// A cluster-wide mutual exclusion primitive.
///
/// Failing to acquire a lock is a normal outcome and is reported as `Ok(false)`. Errors are reserved for failures of
/// the underlying store.
#[allow(async_fn_in_trait)]
pub trait DistributedLock {
    /// Tries to acquire `key`, polling for up to `wait`. The lease expires after `lease` even if the holder never
    /// unlocks. Locks are not reentrant: a second `try_lock` on a key this provider holds will wait like any other.
    async fn try_lock(&self, key: &str, wait: Duration, lease: Duration) -> Result<bool, LockError>;

    /// Releases `key` if this provider holds it. Returns `false` if it does not, including when the lease has
    /// already expired and another owner has taken the key.
    async fn unlock(&self, key: &str) -> Result<bool, LockError>;

    /// Sets a marker that lives for `ttl`. Returns `false` if an unexpired marker already exists.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Removes a key regardless of owner. Returns `false` if there was nothing to remove.
    async fn delete(&self, key: &str) -> Result<bool, LockError>;
}
