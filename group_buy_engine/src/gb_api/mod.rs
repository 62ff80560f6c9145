//! The public API of the group-buy engine.
//!
//! Each API wraps a storage backend (and, where it needs one, a lock provider or transport). None of them know which
//! database is in use. Here is how the pieces fit together for the SQLite backend:
//!
//! ```rust,ignore
//! use group_buy_engine::{events::EventProducers, OrderFlowApi, SqliteDatabase, TrialApi};
//!
//! let db = SqliteDatabase::new(10).await?;
//! let locks = db.lock_provider();
//! let orders = OrderFlowApi::new(db.clone(), locks, EventProducers::default());
//! let outcome = orders.lock_order(request).await?;
//! ```
//!
//! * [`trial_api::TrialApi`] quotes prices.
//! * [`order_flow_api::OrderFlowApi`] locks slots, applies payments, refunds and sweeps.
//! * [`settlement_api::SettlementApi`] settles completed teams.
//! * [`notification_api::NotificationApi`] delivers settlement notifications.
pub mod errors;
pub mod notification_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod settlement_api;
pub mod trial_api;
