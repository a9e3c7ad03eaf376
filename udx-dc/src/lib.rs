//! udx-dc library interface
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod gatekeeper;
pub mod llm;
pub mod readiness;
pub mod resolver;
pub mod spine;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use udx_common::events::EventBus;

use crate::gatekeeper::classifier::GatekeeperService;
use crate::spine::orchestrator::SpineOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: Arc<EventBus>,
    /// Fine-grained classification pipeline
    pub orchestrator: Arc<SpineOrchestrator>,
    /// Coarse classifier and extraction router
    pub gatekeeper: Arc<GatekeeperService>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last handler error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: Arc<EventBus>,
        orchestrator: Arc<SpineOrchestrator>,
        gatekeeper: Arc<GatekeeperService>,
    ) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            gatekeeper,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Record a handler failure for the health endpoint
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::spine_routes())
        .merge(api::gatekeeper_routes())
        .merge(api::document_routes())
        .merge(api::readiness_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        // Local tooling and the deal UI call this service cross-origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
