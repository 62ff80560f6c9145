use super::{HttpNotifier, MqNotifier, NotificationTransport, TransportError};
use crate::db_types::{NotificationTask, NotifyType};

/// Picks the transport that matches a task's notify type.
#[derive(Clone)]
pub struct NotifierRouter {
    http: HttpNotifier,
    mq: MqNotifier,
}

impl NotifierRouter {
    pub fn new(http: HttpNotifier, mq: MqNotifier) -> Self {
        Self { http, mq }
    }
}

impl NotificationTransport for NotifierRouter {
    async fn deliver(&self, task: &NotificationTask) -> Result<(), TransportError> {
        match task.notify_type {
            NotifyType::Http => self.http.deliver(task).await,
            NotifyType::Mq => self.mq.deliver(task).await,
        }
    }
}
