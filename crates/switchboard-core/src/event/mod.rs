//! Event bus for task lifecycle notifications.
//!
//! Provides an `EventBus` that distributes `OrchestratorEvent` messages to
//! all subscribers via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;
