//! Database models and initialization shared across UDX services

pub mod init;

pub use init::*;
