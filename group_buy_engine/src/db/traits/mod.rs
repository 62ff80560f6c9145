//! #  Storage contracts.
//!
//! This module defines the behaviour that a database backend needs to expose in order to run the group-buy engine.
//! Nothing outside the backend knows which database is in use.
//!
//! ## Counters
//! Team order counters are only changed through single-statement conditional updates (see [`OrderManagement`]).
//! That is what keeps `complete_count <= lock_count <= target_count` true under any amount of concurrency, without
//! application-level locks on the hot path.
//!
//! ## Traits
//! * [`DatabaseBackend`] carries the shared error type and connection housekeeping.
//! * [`OrderManagement`] owns team orders and their counters.
//! * [`TradeOrderManagement`] queries the per-member legs.
//! * [`PaymentCallbackManagement`] is the durable idempotency record for payment callbacks.
//! * [`NotificationTaskManagement`] stores outbound notifications and their retry state.
//! * [`CrowdTagManagement`] and [`CatalogManagement`] are read mostly, and feed the price trial.
//! * [`GroupBuyDatabase`] defines the transactional units of work that span several of the above.
//! * [`DistributedLock`] is the cluster-wide lock used on the order creation and refund paths.
mod backend;
mod catalog_management;
mod crowd_tag_management;
mod distributed_lock;
mod group_buy_database;
mod notification_task_management;
mod order_management;
mod payment_callback_management;
mod trade_order_management;

mod data_objects;

pub use backend::DatabaseBackend;
pub use catalog_management::CatalogManagement;
pub use crowd_tag_management::CrowdTagManagement;
pub use data_objects::{
    ClosedTeam,
    CompletionUpdate,
    CounterRejection,
    InsertCallbackResult,
    InsertTaskResult,
    InsertTradeOrderResult,
    LockCountUpdate,
    LockSlotResult,
    PaymentRejection,
    PaymentResult,
    SettlementResult,
    VirtualCompletionPolicy,
};
pub use distributed_lock::{DistributedLock, LockError};
pub use group_buy_database::GroupBuyDatabase;
pub use notification_task_management::NotificationTaskManagement;
pub use order_management::OrderManagement;
pub use payment_callback_management::PaymentCallbackManagement;
pub use trade_order_management::TradeOrderManagement;
