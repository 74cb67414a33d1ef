//! Provider client abstractions.
//!
//! - `ProviderClient`: RPITIT trait implemented by concrete vendor clients
//! - `BoxProviderClient`: object-safe wrapper for dynamic dispatch
//! - `ClientRegistry`: name-indexed clients, one per configured provider

pub mod box_client;
pub mod provider;
pub mod registry;
