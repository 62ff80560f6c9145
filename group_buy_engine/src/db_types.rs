use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use gb_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Generates `Display` and `FromStr` for enums that are persisted as fixed upper-case codes.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        impl $name {
            pub fn code(&self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.code())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($name)))),
                }
            }
        }
    };
}

/// Generates a string newtype for identifiers.
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_type!(OrderId);
id_type!(TradeOrderId);

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The team is still collecting members.
    Pending,
    /// The team reached its target (or was virtually completed).
    Success,
    /// The deadline passed before the team filled up.
    Failed,
}

string_enum!(OrderStatusType { Pending => "PENDING", Success => "SUCCESS", Failed => "FAILED" });

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
/// A team order. The counters are only ever changed through the conditional updates of
/// [`crate::OrderManagement`], so `complete_count <= lock_count <= target_count` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub activity_id: i64,
    pub goods_id: String,
    pub leader_user_id: String,
    pub target_count: i64,
    pub lock_count: i64,
    pub complete_count: i64,
    pub status: OrderStatusType,
    pub deadline: DateTime<Utc>,
    pub source: String,
    pub channel: String,
    pub virtual_completed: bool,
    pub fail_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= now
    }

    pub fn remaining_slots(&self) -> i64 {
        (self.target_count - self.lock_count).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub activity_id: i64,
    pub goods_id: String,
    pub leader_user_id: String,
    pub target_count: i64,
    pub deadline: DateTime<Utc>,
    pub source: String,
    pub channel: String,
}

//--------------------------------------   TradeOrderStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeOrderStatus {
    /// A slot is locked and payment is outstanding.
    Create,
    Paid,
    /// The team completed and the leg has been settled.
    Settled,
    /// Payment never arrived, or failed.
    Timeout,
    Refund,
}

string_enum!(TradeOrderStatus {
    Create => "CREATE",
    Paid => "PAID",
    Settled => "SETTLED",
    Timeout => "TIMEOUT",
    Refund => "REFUND",
});

impl TradeOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Timeout | Self::Refund)
    }

    pub fn can_refund(&self) -> bool {
        matches!(self, Self::Create | Self::Paid)
    }

    /// Legs in these states count against an activity's participation limit.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Create | Self::Paid | Self::Settled)
    }
}

//--------------------------------------      NotifyType       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyType {
    Http,
    Mq,
}

string_enum!(NotifyType { Http => "HTTP", Mq => "MQ" });

/// Where the outcome of a trade order should be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub notify_type: NotifyType,
    pub notify_url: Option<String>,
    pub notify_topic: Option<String>,
}

impl NotifyConfig {
    pub fn http<S: Into<String>>(url: S) -> Self {
        Self { notify_type: NotifyType::Http, notify_url: Some(url.into()), notify_topic: None }
    }

    pub fn mq<S: Into<String>>(topic: S) -> Self {
        Self { notify_type: NotifyType::Mq, notify_url: None, notify_topic: Some(topic.into()) }
    }

    /// The URL or topic the notification goes to, if the config carries one for its type.
    pub fn target(&self) -> Option<&str> {
        let target = match self.notify_type {
            NotifyType::Http => self.notify_url.as_deref(),
            NotifyType::Mq => self.notify_topic.as_deref(),
        };
        target.filter(|t| !t.trim().is_empty())
    }

    pub fn is_valid(&self) -> bool {
        self.target().is_some()
    }
}

//--------------------------------------      TradeOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub id: i64,
    pub trade_order_id: TradeOrderId,
    pub order_id: OrderId,
    pub activity_id: i64,
    pub user_id: String,
    pub goods_id: String,
    pub goods_name: String,
    pub original_price: Money,
    pub deduction_price: Money,
    pub pay_price: Money,
    pub status: TradeOrderStatus,
    pub out_trade_no: String,
    pub source: String,
    pub channel: String,
    pub notify: Option<NotifyConfig>,
    pub pay_time: Option<DateTime<Utc>>,
    pub settlement_time: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub refund_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTradeOrder {
    pub trade_order_id: TradeOrderId,
    pub order_id: OrderId,
    pub activity_id: i64,
    pub user_id: String,
    pub goods_id: String,
    pub goods_name: String,
    pub original_price: Money,
    pub deduction_price: Money,
    pub pay_price: Money,
    pub out_trade_no: String,
    pub source: String,
    pub channel: String,
    pub notify: Option<NotifyConfig>,
}

//-------------------------------------- PaymentCallbackRecord ---------------------------------------------------------
/// A payment notification as received from the payment processor. The `callback_id` is unique; its presence in the
/// store is what makes callback processing idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCallbackRecord {
    pub id: i64,
    pub callback_id: String,
    pub trade_order_id: TradeOrderId,
    pub amount: Money,
    pub pay_time: DateTime<Utc>,
    pub channel: String,
    pub payment_no: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentCallback {
    pub callback_id: String,
    pub trade_order_id: TradeOrderId,
    pub amount: Money,
    pub pay_time: DateTime<Utc>,
    pub channel: String,
    pub payment_no: String,
}

//--------------------------------------  NotificationTask     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationTaskStatus {
    Pending,
    /// Claimed by a sweep. Only the claimant may move the task on.
    Processing,
    Success,
    /// Retries are exhausted. Needs manual intervention.
    Failed,
}

string_enum!(NotificationTaskStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Success => "SUCCESS",
    Failed => "FAILED",
});

impl NotificationTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTask {
    pub id: i64,
    pub task_id: String,
    pub trade_order_id: TradeOrderId,
    pub order_id: OrderId,
    pub notify_type: NotifyType,
    /// URL for HTTP tasks, topic for MQ tasks
    pub notify_target: String,
    /// JSON body delivered to the integrator
    pub payload: String,
    pub status: NotificationTaskStatus,
    pub retry_count: i64,
    pub max_retry_count: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationTask {
    pub fn task_id_for(trade_order_id: &TradeOrderId) -> String {
        format!("NOTIFY-{trade_order_id}")
    }
}

#[derive(Debug, Clone)]
pub struct NewNotificationTask {
    pub task_id: String,
    pub trade_order_id: TradeOrderId,
    pub order_id: OrderId,
    pub notify_type: NotifyType,
    pub notify_target: String,
    pub payload: serde_json::Value,
    pub max_retry_count: i64,
}

impl NewNotificationTask {
    /// Builds the settlement notification for a trade order. Returns `None` if the trade order has no usable notify
    /// configuration.
    pub fn for_settled_trade_order(trade_order: &TradeOrder, max_retry_count: i64, now: DateTime<Utc>) -> Option<Self> {
        let notify = trade_order.notify.as_ref()?;
        let target = notify.target()?;
        let task_id = NotificationTask::task_id_for(&trade_order.trade_order_id);
        let payload = serde_json::json!({
            "taskId": task_id,
            "tradeOrderId": trade_order.trade_order_id,
            "orderId": trade_order.order_id,
            "outTradeNo": trade_order.out_trade_no,
            "userId": trade_order.user_id,
            "status": TradeOrderStatus::Settled.code(),
            "timestamp": now.timestamp_millis(),
        });
        Some(Self {
            task_id,
            trade_order_id: trade_order.trade_order_id.clone(),
            order_id: trade_order.order_id.clone(),
            notify_type: notify.notify_type,
            notify_target: target.to_string(),
            payload,
            max_retry_count,
        })
    }
}

//--------------------------------------   Catalog enums       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TagScope {
    /// Non-members can neither see nor join.
    #[default]
    Strict,
    VisibleOnly,
    Open,
}

string_enum!(TagScope { Strict => "STRICT", VisibleOnly => "VISIBLE_ONLY", Open => "OPEN" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupType {
    Real,
    /// Teams may be completed by the sweep before they are full.
    Virtual,
}

string_enum!(GroupType { Real => "REAL", Virtual => "VIRTUAL" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityStatus {
    Active,
    Closed,
}

string_enum!(ActivityStatus { Active => "ACTIVE", Closed => "CLOSED" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountType {
    Base,
    /// Only members of the discount's tag receive the discount.
    Tag,
}

string_enum!(DiscountType { Base => "BASE", Tag => "TAG" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketPlan {
    /// `expr` is a flat reduction, e.g. "20.00"
    DirectReduction,
    /// `expr` is "threshold,reduction", e.g. "100,20"
    FullReduction,
    /// `expr` is a rate, e.g. "0.8"
    Percentage,
    /// `expr` is the price to pay, e.g. "9.90"
    FixedPrice,
}

string_enum!(MarketPlan { DirectReduction => "ZJ", FullReduction => "MJ", Percentage => "ZK", FixedPrice => "N" });

//--------------------------------------       Activity        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub discount_id: i64,
    pub tag_id: Option<String>,
    pub tag_scope: TagScope,
    pub group_type: GroupType,
    pub target_count: i64,
    /// Lifetime of a team, counted from its creation.
    pub valid_seconds: i64,
    pub participation_limit: i64,
    pub status: ActivityStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Activity {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ActivityStatus::Active && self.start_time <= now && now < self.end_time
    }

    /// The deadline of a team created at `now`. Teams never outlive their activity.
    pub fn team_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let deadline = now + chrono::Duration::seconds(self.valid_seconds);
        deadline.min(self.end_time)
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag_id.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Binds a (goods, source, channel) tuple to an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityGoods {
    pub activity_id: i64,
    pub goods_id: String,
    pub source: String,
    pub channel: String,
    /// Overrides the activity's default discount for these goods
    pub discount_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub id: i64,
    pub name: String,
    pub discount_type: DiscountType,
    pub market_plan: MarketPlan,
    pub market_expr: String,
    pub tag_id: Option<String>,
}

impl Discount {
    pub fn tag(&self) -> Option<&str> {
        self.tag_id.as_deref().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub goods_id: String,
    pub goods_name: String,
    pub original_price: Money,
}

//--------------------------------------     FlowSwitches      ---------------------------------------------------------
pub const DOWNGRADE_SWITCH_KEY: &str = "activity.downgrade.switch";
pub const CUT_PERCENTAGE_KEY: &str = "activity.cut.percentage";

/// A snapshot of the dynamic flow-control switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSwitches {
    /// Highest version among the switch rows the snapshot was built from
    pub version: i64,
    pub downgraded: bool,
    /// Share of users (0 - 100) routed to the group-buy pricing path
    pub cut_percentage: u8,
}

impl Default for FlowSwitches {
    fn default() -> Self {
        Self { version: 0, downgraded: false, cut_percentage: 100 }
    }
}
