use log::*;

use super::{NotificationTransport, TransportError};
use crate::{
    db_types::{NotificationTask, NotifyType},
    events::{EventProducer, NotificationMessage},
};

/// Hands notifications to the message-queue adapter over the in-process event channel.
#[derive(Clone, Default)]
pub struct MqNotifier {
    producers: Vec<EventProducer<NotificationMessage>>,
}

impl MqNotifier {
    pub fn new(producers: Vec<EventProducer<NotificationMessage>>) -> Self {
        Self { producers }
    }
}

impl NotificationTransport for MqNotifier {
    async fn deliver(&self, task: &NotificationTask) -> Result<(), TransportError> {
        if task.notify_type != NotifyType::Mq {
            return Err(TransportError::Unsupported(task.notify_type));
        }
        if self.producers.is_empty() {
            return Err(TransportError::ChannelClosed);
        }
        for producer in &self.producers {
            let message = NotificationMessage {
                task_id: task.task_id.clone(),
                topic: task.notify_target.clone(),
                payload: task.payload.clone(),
            };
            producer.try_publish(message).await.map_err(|_| TransportError::ChannelClosed)?;
        }
        trace!("📨️ [{}] published on {}", task.task_id, task.notify_target);
        Ok(())
    }
}
