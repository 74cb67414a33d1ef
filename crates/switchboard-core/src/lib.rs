//! Dispatch logic and port definitions for Switchboard.
//!
//! This crate defines the "ports" (quota ledger, usage repository, provider
//! client) that the infrastructure layer implements, plus in-memory versions
//! of the stores. It depends only on `switchboard-types` -- never on
//! `switchboard-infra` or any database/IO crate.

pub mod client;
pub mod clock;
pub mod event;
pub mod executor;
pub mod ledger;
pub mod orchestrator;
pub mod queue;
pub mod rate_limiter;
pub mod registry;
pub mod usage;
