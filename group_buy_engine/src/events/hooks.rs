use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    GroupCompleteEvent,
    Handler,
    NotificationMessage,
    OrderCreatedEvent,
    OrderFailedEvent,
    PaymentCompletedEvent,
    UserJoinedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub user_joined_producer: Vec<EventProducer<UserJoinedEvent>>,
    pub payment_completed_producer: Vec<EventProducer<PaymentCompletedEvent>>,
    pub group_complete_producer: Vec<EventProducer<GroupCompleteEvent>>,
    pub order_failed_producer: Vec<EventProducer<OrderFailedEvent>>,
    pub mq_message_producer: Vec<EventProducer<NotificationMessage>>,
}

pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderCreatedEvent>>,
    pub on_user_joined: Option<EventHandler<UserJoinedEvent>>,
    pub on_payment_completed: Option<EventHandler<PaymentCompletedEvent>>,
    pub on_group_complete: Option<EventHandler<GroupCompleteEvent>>,
    pub on_order_failed: Option<EventHandler<OrderFailedEvent>>,
    pub on_mq_message: Option<EventHandler<NotificationMessage>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_created: hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f)),
            on_user_joined: hooks.on_user_joined.map(|f| EventHandler::new(buffer_size, f)),
            on_payment_completed: hooks.on_payment_completed.map(|f| EventHandler::new(buffer_size, f)),
            on_group_complete: hooks.on_group_complete.map(|f| EventHandler::new(buffer_size, f)),
            on_order_failed: hooks.on_order_failed.map(|f| EventHandler::new(buffer_size, f)),
            on_mq_message: hooks.on_mq_message.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            result.order_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_user_joined {
            result.user_joined_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_completed {
            result.payment_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_group_complete {
            result.group_complete_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_failed {
            result.order_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_mq_message {
            result.mq_message_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_created {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_user_joined {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_completed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_group_complete {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_failed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_mq_message {
            tokio::spawn(handler.start_handler());
        }
    }
}

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
    pub on_user_joined: Option<Handler<UserJoinedEvent>>,
    pub on_payment_completed: Option<Handler<PaymentCompletedEvent>>,
    pub on_group_complete: Option<Handler<GroupCompleteEvent>>,
    pub on_order_failed: Option<Handler<OrderFailedEvent>>,
    pub on_mq_message: Option<Handler<NotificationMessage>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_user_joined<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(UserJoinedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_user_joined = Some(Arc::new(f));
        self
    }

    pub fn on_payment_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentCompletedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_payment_completed = Some(Arc::new(f));
        self
    }

    /// Settlement subscribes here.
    pub fn on_group_complete<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(GroupCompleteEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_group_complete = Some(Arc::new(f));
        self
    }

    pub fn on_order_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderFailedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_failed = Some(Arc::new(f));
        self
    }

    /// The message-queue adapter subscribes here.
    pub fn on_mq_message<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NotificationMessage) -> BoxedFuture) + Send + Sync + 'static {
        self.on_mq_message = Some(Arc::new(f));
        self
    }
}
