//! Outbound delivery of settlement notifications.
//!
//! A [`NotificationTransport`] makes exactly one delivery attempt for a task. Retries, backoff and the task's status
//! are the business of [`crate::NotificationApi`].
mod backoff;
mod http;
mod mq;
mod router;

pub use backoff::RetryPolicy;
pub use http::HttpNotifier;
pub use mq::MqNotifier;
pub use router::NotifierRouter;
use thiserror::Error;

use crate::db_types::{NotificationTask, NotifyType};

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP transport error: {0}")]
    Http(String),
    #[error("The receiver answered with status {0}")]
    Status(u16),
    #[error("No message-queue subscriber is listening")]
    ChannelClosed,
    #[error("This transport cannot deliver {0} notifications")]
    Unsupported(NotifyType),
    #[error("Could not set up the transport: {0}")]
    Initialization(String),
}

#[allow(async_fn_in_trait)]
pub trait NotificationTransport {
    async fn deliver(&self, task: &NotificationTask) -> Result<(), TransportError>;
}
