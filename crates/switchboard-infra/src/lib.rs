//! Infrastructure layer for Switchboard.
//!
//! Implements the ports defined in `switchboard-core`: the SQLite quota
//! ledger and usage log, the OpenAI-compatible provider client, and the
//! configuration file loader and watcher.

pub mod client;
pub mod config;
pub mod sqlite;
