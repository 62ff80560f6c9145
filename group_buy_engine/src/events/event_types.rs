use serde::{Deserialize, Serialize};

use crate::db_types::{Order, TradeOrder};

/// A member started a new team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
    pub trade_order: TradeOrder,
}

/// A member locked a slot in an existing team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJoinedEvent {
    pub order: Order,
    pub trade_order: TradeOrder,
}

/// A payment callback was applied. `order` reflects the completion counter after this payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompletedEvent {
    pub trade_order: TradeOrder,
    pub order: Order,
}

/// A team order reached `SUCCESS`. Published exactly once per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCompleteEvent {
    pub order: Order,
    pub virtual_completion: bool,
}

impl GroupCompleteEvent {
    pub fn new(order: Order) -> Self {
        let virtual_completion = order.virtual_completed;
        Self { order, virtual_completion }
    }
}

/// A team order expired short of its target. `timed_out` holds the unpaid legs that were closed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailedEvent {
    pub order: Order,
    pub timed_out: Vec<TradeOrder>,
}

/// An outbound message for the message-queue adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub task_id: String,
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderCreated(OrderCreatedEvent),
    UserJoined(UserJoinedEvent),
    PaymentCompleted(PaymentCompletedEvent),
    GroupComplete(GroupCompleteEvent),
    OrderFailed(OrderFailedEvent),
}
