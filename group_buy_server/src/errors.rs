use group_buy_engine::{notifications::TransportError, SqliteDatabaseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize the worker. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the worker. {0}")]
    BackendError(String),
    #[error("A worker task stopped unexpectedly. {0}")]
    WorkerStopped(String),
    #[error("An I/O error happened in the worker. {0}")]
    IOError(#[from] std::io::Error),
}

impl From<SqliteDatabaseError> for ServerError {
    fn from(e: SqliteDatabaseError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<TransportError> for ServerError {
    fn from(e: TransportError) -> Self {
        Self::InitializeError(format!("Could not create the notification transport. {e}"))
    }
}
