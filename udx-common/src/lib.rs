//! # UDX Common Library
//!
//! Shared code for UDX underwriting services including:
//! - Common error types (`Error` enum + `Result` alias)
//! - Event types (`DocEvent` enum) and the broadcast `EventBus`
//! - Configuration loading (TOML + environment resolution)
//! - Database schema initialization (SQLite via sqlx, behind the `sqlx` feature)

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
