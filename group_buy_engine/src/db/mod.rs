//! # Persistence
//!
//! The storage contracts live in [`traits`]. [`sqlite`] is the backend that ships with the engine.
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;
