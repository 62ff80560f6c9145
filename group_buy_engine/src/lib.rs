//! Group-Buy Engine
//!
//! The engine behind "pool an order until N people join" group buying. Customers ask for a price quote, lock a slot in
//! a team order, and pay. The team either fills up and is settled, or expires and is refunded. Outcome notifications
//! are delivered to integrators with bounded retries.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@db`]). The traits in [`db::traits`] describe what a backend must provide, and SQLite is the
//!    shipped backend. Team-order counters are only changed by single-statement conditional updates, which is what
//!    keeps concurrent joins and payments from overshooting a team. The data types are public, in [`db_types`].
//! 2. The price trial ([`mod@trial`]), a fixed chain of pure decision stages.
//! 3. The public API ([`mod@gb_api`]): quoting, locking slots, payment callbacks, refunds, settlement, sweeps and
//!    notification delivery.
//! 4. Notification transports ([`mod@notifications`]) for HTTP and the in-process message queue.
//!
//! The engine emits events (a team was created, a member joined, a payment landed, a team completed or failed) that
//! you can hook into through [`events::EventHooks`]. Settlement itself is wired up as a `GroupCompleteEvent` hook.
pub mod db;

pub mod db_types;
pub mod events;
pub mod gb_api;
pub mod helpers;
pub mod notifications;
pub mod trial;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError, SqliteLockProvider};
pub use db::traits::{
    CatalogManagement,
    ClosedTeam,
    CompletionUpdate,
    CounterRejection,
    CrowdTagManagement,
    DatabaseBackend,
    DistributedLock,
    GroupBuyDatabase,
    InsertCallbackResult,
    InsertTaskResult,
    InsertTradeOrderResult,
    LockCountUpdate,
    LockError,
    LockSlotResult,
    NotificationTaskManagement,
    OrderManagement,
    PaymentCallbackManagement,
    PaymentRejection,
    PaymentResult,
    SettlementResult,
    TradeOrderManagement,
    VirtualCompletionPolicy,
};
pub use gb_api::{
    errors::{NotificationError, OrderFlowError, SettlementError},
    notification_api::{DeliveryOutcome, DeliverySummary, NotificationApi},
    order_flow_api::OrderFlowApi,
    order_objects,
    settlement_api::SettlementApi,
    trial_api::TrialApi,
};
