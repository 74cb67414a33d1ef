//! REST API handler modules.

pub mod config;
pub mod health;
pub mod provider;
pub mod quota;
pub mod task;
