use std::{fmt::Display, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    db::traits::CounterRejection,
    db_types::{NotifyConfig, Order, OrderId, OrderStatusType, TradeOrder},
    trial::TrialErrorCode,
};

/// A request to lock a slot in a team order, either by starting a new team or by joining an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOrderRequest {
    pub user_id: String,
    pub goods_id: String,
    pub source: String,
    pub channel: String,
    /// The caller's idempotency key. Repeating a request with the same key returns the original leg.
    pub out_trade_no: String,
    pub activity_id: Option<i64>,
    /// The team to join. A new team is started when this is absent.
    pub order_id: Option<OrderId>,
    pub notify: Option<NotifyConfig>,
}

impl LockOrderRequest {
    pub fn new<S: Into<String>>(user_id: S, goods_id: S, source: S, channel: S, out_trade_no: S) -> Self {
        Self {
            user_id: user_id.into(),
            goods_id: goods_id.into(),
            source: source.into(),
            channel: channel.into(),
            out_trade_no: out_trade_no.into(),
            activity_id: None,
            order_id: None,
            notify: None,
        }
    }

    pub fn joining(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_activity_id(mut self, activity_id: i64) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    pub fn with_notify(mut self, notify: NotifyConfig) -> Self {
        self.notify = Some(notify);
        self
    }
}

/// Why a slot could not be locked. These are ordinary business outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclineReason {
    InvalidRequest(String),
    TrialFailed { code: TrialErrorCode, message: String },
    NotParticipable,
    ActivityClosed,
    ParticipationLimitReached,
    /// Another request from the same user is creating a team in the same activity.
    LockContention,
    OrderNotFound,
    /// The team belongs to a different activity than the one quoted.
    ActivityMismatch,
    TeamFull,
    TeamClosed(OrderStatusType),
    TeamExpired,
}

impl From<CounterRejection> for DeclineReason {
    fn from(r: CounterRejection) -> Self {
        match r {
            CounterRejection::OrderNotFound => Self::OrderNotFound,
            CounterRejection::NotPending(status) => Self::TeamClosed(status),
            CounterRejection::Expired => Self::TeamExpired,
            CounterRejection::TeamFull | CounterRejection::NoLockedSlot | CounterRejection::Overshoot => Self::TeamFull,
        }
    }
}

impl Display for DeclineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::TrialFailed { code, message } => write!(f, "price trial failed ({code}): {message}"),
            Self::NotParticipable => write!(f, "the user may not join this activity"),
            Self::ActivityClosed => write!(f, "the activity is not open"),
            Self::ParticipationLimitReached => write!(f, "the user has reached the participation limit"),
            Self::LockContention => write!(f, "a concurrent request is already creating a team"),
            Self::OrderNotFound => write!(f, "the team does not exist"),
            Self::ActivityMismatch => write!(f, "the team belongs to another activity"),
            Self::TeamFull => write!(f, "the team is full"),
            Self::TeamClosed(status) => write!(f, "the team is already {status}"),
            Self::TeamExpired => write!(f, "the team has expired"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LockOrderOutcome {
    Locked { order: Order, trade_order: TradeOrder, created_team: bool },
    /// The `out_trade_no` was used before; this is the leg it produced.
    Existing(TradeOrder),
    Declined(DeclineReason),
}

impl LockOrderOutcome {
    pub fn trade_order(&self) -> Option<&TradeOrder> {
        match self {
            Self::Locked { trade_order, .. } | Self::Existing(trade_order) => Some(trade_order),
            Self::Declined(_) => None,
        }
    }

    pub fn decline_reason(&self) -> Option<&DeclineReason> {
        match self {
            Self::Declined(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RefundOutcome {
    Refunded(TradeOrder),
    AlreadyRefunded(TradeOrder),
    /// A concurrent refund of the same leg holds the refund marker.
    InProgress,
    NotAllowed(String),
}

/// Tuning for [`crate::OrderFlowApi`].
#[derive(Debug, Clone, Copy)]
pub struct OrderFlowConfig {
    pub lock_wait: Duration,
    pub lock_lease: Duration,
    /// How long a refund marker blocks concurrent refunds of the same leg
    pub refund_marker_ttl: Duration,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_millis(3_000),
            lock_lease: Duration::from_millis(10_000),
            refund_marker_ttl: Duration::from_secs(30),
        }
    }
}

/// What one pass of the expired-order sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub virtually_completed: Vec<OrderId>,
    pub failed: Vec<OrderId>,
    /// Legs refunded in this pass, across newly failed teams and retried ones
    pub refunded: usize,
    /// Failed teams whose refund errored. They are picked up again by the next pass.
    pub refund_errors: usize,
}
