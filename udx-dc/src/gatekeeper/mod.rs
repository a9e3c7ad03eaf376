//! Gatekeeper: coarse classification and extraction routing
//!
//! - `types` - Coarse taxonomy, routes, and classification results
//! - `router` - Deterministic route derivation from a classification
//! - `classifier` - LLM-backed classification with caching and batching

pub mod classifier;
pub mod router;
pub mod types;
