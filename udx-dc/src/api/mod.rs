//! HTTP API handlers for udx-dc
//!
//! One file per route group; `crate::build_router` merges them.

pub mod documents;
pub mod gatekeeper;
pub mod health;
pub mod readiness;
pub mod spine;
pub mod sse;

pub use documents::document_routes;
pub use gatekeeper::gatekeeper_routes;
pub use health::health_routes;
pub use readiness::readiness_routes;
pub use spine::spine_routes;
pub use sse::event_stream;
