//! Shared domain types for the Switchboard provider orchestrator.
//!
//! Tasks, providers, quota windows, usage events, dispatch outcomes,
//! configuration and the error taxonomy used across all crates.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod health;
pub mod provider;
pub mod quota;
pub mod task;
pub mod usage;
