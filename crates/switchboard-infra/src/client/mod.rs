//! Concrete provider clients.

pub mod openai_compat;
