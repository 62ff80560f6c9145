//! In-process event channels for the order flow.
//!
//! Each event type gets one [`EventHandler`], which owns the receiving end of a bounded tokio channel and a single
//! async callback. The APIs hold [`EventProducer`]s and publish after their transaction has committed. A handler only
//! sees the event value it was sent.
//!
//! Delivery is in memory and at most once. An event published just before the process dies is gone, which is why
//! settlement, refunds and notifications are also driven by the periodic sweeps. Handlers must tolerate running
//! against state that a sweep has already processed.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Runs `handler` for every event sent through any of its producers. Events are handled concurrently, each on its
/// own task.
pub struct EventHandler<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    /// `buffer_size` is how many events may queue before `publish_event` waits for the handler to catch up.
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Handles events until every producer has been dropped, then waits for in-flight handlers to finish.
    ///
    /// A handler that panics is logged; the remaining events are still handled.
    pub async fn start_handler(mut self) {
        debug!("📬️ Event handler started");
        // Only producers may keep the channel open
        drop(self.sender);
        let mut in_flight = JoinSet::new();
        while let Some(event) = self.receiver.recv().await {
            let handler = Arc::clone(&self.handler);
            in_flight.spawn(async move { (handler)(event).await });
            while let Some(done) = in_flight.try_join_next() {
                log_join_result(done);
            }
        }
        if !in_flight.is_empty() {
            debug!("📬️ All producers are gone. Waiting for {} handlers to finish", in_flight.len());
        }
        while let Some(done) = in_flight.join_next().await {
            log_join_result(done);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ Event handled"),
        Err(e) => warn!("📬️ An event handler did not finish: {e}"),
    }
}

/// The sending side of an [`EventHandler`]. Cheap to clone.
#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Publishes an event for the domain hooks. If the handler has shut down, the event is dropped and logged.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Event dropped, its handler has shut down: {e}");
        }
    }

    /// Publishes an event, reporting a closed channel to the caller. Used where a lost event must be retried, such
    /// as MQ notification deliveries.
    pub async fn try_publish(&self, event: E) -> Result<(), PublishError> {
        self.sender.send(event).await.map_err(|_| PublishError)
    }
}

/// The handler behind a producer has shut down.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("The event channel is closed")]
pub struct PublishError;
