use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};

use super::{NotificationTransport, TransportError};
use crate::db_types::{NotificationTask, NotifyType};

/// Delivers notifications by POSTing the task payload to the task's URL. Any non-2xx answer is a failure.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Arc<Client>,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Initialization(e.to_string()))?;
        Ok(Self { client: Arc::new(client) })
    }
}

impl NotificationTransport for HttpNotifier {
    async fn deliver(&self, task: &NotificationTask) -> Result<(), TransportError> {
        if task.notify_type != NotifyType::Http {
            return Err(TransportError::Unsupported(task.notify_type));
        }
        trace!("📨️ POST {} for [{}]", task.notify_target, task.task_id);
        let response = self
            .client
            .post(&task.notify_target)
            .body(task.payload.clone())
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            trace!("📨️ [{}] delivered. {status}", task.task_id);
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
