use thiserror::Error;

use crate::{
    db::traits::LockError,
    db_types::{OrderId, OrderStatusType, TradeOrderId},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Distributed lock error: {0}")]
    LockError(#[from] LockError),
    #[error("Trade order {0} does not exist")]
    TradeOrderNotFound(TradeOrderId),
    #[error("Team order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Team order {0} is {1}, but must be FAILED for a team refund")]
    OrderNotFailed(OrderId, OrderStatusType),
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Team order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Team order {0} is {1} and cannot be settled")]
    OrderNotCompleted(OrderId, OrderStatusType),
}

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Notification task {0} does not exist")]
    TaskNotFound(String),
}

#[cfg(feature = "sqlite")]
mod sqlite_conversions {
    use super::*;
    use crate::db::sqlite::SqliteDatabaseError;

    impl From<SqliteDatabaseError> for OrderFlowError {
        fn from(e: SqliteDatabaseError) -> Self {
            OrderFlowError::DatabaseError(e.to_string())
        }
    }

    impl From<SqliteDatabaseError> for SettlementError {
        fn from(e: SqliteDatabaseError) -> Self {
            SettlementError::DatabaseError(e.to_string())
        }
    }

    impl From<SqliteDatabaseError> for NotificationError {
        fn from(e: SqliteDatabaseError) -> Self {
            NotificationError::DatabaseError(e.to_string())
        }
    }
}
