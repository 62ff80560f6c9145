use std::fmt::Display;

use chrono::Duration;

use crate::db_types::{
    Money,
    NotificationTask,
    Order,
    OrderStatusType,
    PaymentCallbackRecord,
    TradeOrder,
    TradeOrderStatus,
};

/// Why a conditional counter update on a team order was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterRejection {
    OrderNotFound,
    NotPending(OrderStatusType),
    Expired,
    /// Every slot is already locked.
    TeamFull,
    /// A completion was attempted without a matching locked slot.
    NoLockedSlot,
    /// The completion count would pass the target. The storage layer should never allow this state, so it indicates
    /// an atomicity bug.
    Overshoot,
}

impl Display for CounterRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderNotFound => write!(f, "team order does not exist"),
            Self::NotPending(status) => write!(f, "team order is already {status}"),
            Self::Expired => write!(f, "team order has expired"),
            Self::TeamFull => write!(f, "team is full"),
            Self::NoLockedSlot => write!(f, "no locked slot is waiting for completion"),
            Self::Overshoot => write!(f, "completion count would exceed the target"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCountUpdate {
    /// The new lock count
    Locked(i64),
    Rejected(CounterRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionUpdate {
    /// The new completion count. The team is still pending.
    Incremented(i64),
    /// The new completion count, which equals the target. This caller performed the transition to `SUCCESS`.
    Completed(i64),
    Rejected(CounterRejection),
}

impl CompletionUpdate {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn count(&self) -> Option<i64> {
        match self {
            Self::Incremented(n) | Self::Completed(n) => Some(*n),
            Self::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum InsertTradeOrderResult {
    Inserted(TradeOrder),
    /// A trade order with the same `out_trade_no` already exists.
    AlreadyExists(TradeOrder),
    /// The user already holds as many live legs in the activity as the participation limit allows.
    LimitReached,
}

#[derive(Debug, Clone)]
pub enum InsertCallbackResult {
    Inserted(PaymentCallbackRecord),
    /// The callback id that was already recorded
    AlreadyExists(String),
}

#[derive(Debug, Clone)]
pub enum InsertTaskResult {
    Inserted(NotificationTask),
    AlreadyExists(NotificationTask),
}

/// The outcome of locking a slot in a team order.
#[derive(Debug, Clone)]
pub enum LockSlotResult {
    Locked { order: Order, trade_order: TradeOrder },
    /// The `out_trade_no` was seen before. Nothing was changed.
    AlreadyLocked(TradeOrder),
    /// The user is at the activity's participation limit. Nothing was changed.
    LimitReached,
    Rejected(CounterRejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRejection {
    TradeOrderNotFound,
    InvalidStatus(TradeOrderStatus),
    AmountMismatch { expected: Money, actual: Money },
    Counter(CounterRejection),
}

impl Display for PaymentRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TradeOrderNotFound => write!(f, "trade order does not exist"),
            Self::InvalidStatus(s) => write!(f, "trade order is {s} and cannot be paid"),
            Self::AmountMismatch { expected, actual } => write!(f, "paid {actual} but {expected} was due"),
            Self::Counter(c) => write!(f, "{c}"),
        }
    }
}

/// The outcome of processing one payment callback. Everything except `Rejected` is a success from the payment
/// processor's point of view.
#[derive(Debug, Clone)]
pub enum PaymentResult {
    Applied { trade_order: TradeOrder, order: Order, completion: CompletionUpdate },
    /// The callback id was processed before. No side effects were applied.
    Duplicate(String),
    /// The trade order was already paid under a different callback id. The callback was recorded, nothing else.
    AlreadyPaid(TradeOrder),
    /// Nothing was recorded. The callback may be redelivered.
    Rejected(PaymentRejection),
}

impl PaymentResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

#[derive(Debug, Clone)]
pub struct SettlementResult {
    pub order: Order,
    pub settled: Vec<TradeOrder>,
    pub tasks: Vec<NotificationTask>,
}

/// A team order that was closed by a sweep, with the unpaid legs that were timed out alongside it.
#[derive(Debug, Clone)]
pub struct ClosedTeam {
    pub order: Order,
    pub timed_out: Vec<TradeOrder>,
}

/// Selection criteria for force-completing teams of `VIRTUAL` activities.
///
/// A pending team qualifies once its deadline is within `lead_time`, it has at least one paid member, and its paid
/// members make up at least `min_complete_percent` of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualCompletionPolicy {
    pub lead_time: Duration,
    pub min_complete_percent: u8,
}

impl Default for VirtualCompletionPolicy {
    fn default() -> Self {
        Self { lead_time: Duration::minutes(5), min_complete_percent: 50 }
    }
}

impl VirtualCompletionPolicy {
    pub fn qualifies(&self, order: &Order, now: chrono::DateTime<chrono::Utc>) -> bool {
        order.status == OrderStatusType::Pending &&
            order.deadline - self.lead_time <= now &&
            order.complete_count >= 1 &&
            order.complete_count * 100 >= order.target_count * i64::from(self.min_complete_percent)
    }
}
