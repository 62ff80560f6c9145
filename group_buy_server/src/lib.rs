//! # Group-buy worker
//! This crate hosts the long-running process that keeps team orders moving when nobody is calling in. It is
//! responsible for:
//! * Sweeping expired teams: virtually completing teams of `VIRTUAL` activities, failing the rest and refunding them.
//! * Timing out unpaid trade orders so that their slots return to the team.
//! * Settling completed teams when a `GroupCompleteEvent` is published.
//! * Delivering settlement notifications with bounded retries, and recovering deliveries abandoned mid-flight.
//!
//! ## Configuration
//! The worker is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod config;
pub mod errors;
pub mod expiry_worker;
pub mod hooks;
pub mod notification_worker;
pub mod server;
