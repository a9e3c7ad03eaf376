//! udx-dc - Document Classification Microservice
//!
//! **Module Identity:**
//! - Name: udx-dc (Document Classification)
//! - Port: 5811
//!
//! Classifies loan-underwriting documents (tiered deterministic-first
//! pipeline plus a fail-closed coarse router), resolves the effective
//! classification per document, and evaluates per-deal completeness.
//! Integrates with the deal UI via HTTP REST + SSE.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use udx_common::events::EventBus;

use udx_dc::llm::client::LlmClient;
use udx_dc::spine::orchestrator::SpineOrchestrator;
use udx_dc::spine::rules::RuleSet;
use udx_dc::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Bootstrap config first so the log level can come from it; tracing
    // events emitted during this load are discarded, which is acceptable for
    // the config layer's own source-priority notes.
    let toml_config = udx_common::config::load_toml_config(None)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&toml_config.logging.level)
            }),
        )
        .init();

    info!("Starting udx-dc (Document Classification) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Open or create the service database
    let db_path = udx_common::config::resolve_database_path("UDX_DATABASE_PATH", &toml_config);
    info!("Database: {}", db_path.display());
    let db_pool = udx_dc::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Event bus for SSE broadcasting
    let event_bus = Arc::new(EventBus::new(100));

    // Model credentials resolve eagerly; a missing API key aborts startup
    // rather than failing per document at 2am.
    let llm = Arc::new(LlmClient::from_config(&db_pool, &toml_config).await?);
    info!("Model client ready ({})", llm.model());

    let corpus = Arc::new(udx_dc::config::load_confusion_corpus(&toml_config)?);
    let rules = Arc::new(RuleSet::new());

    let orchestrator = Arc::new(SpineOrchestrator::new(
        rules,
        llm.clone(),
        corpus,
        db_pool.clone(),
        event_bus.clone(),
    ));
    let gatekeeper = Arc::new(udx_dc::gatekeeper::classifier::GatekeeperService::new(
        llm,
        db_pool.clone(),
        event_bus.clone(),
    ));

    let state = AppState::new(db_pool, event_bus, orchestrator, gatekeeper);
    let app = udx_dc::build_router(state);

    let port = udx_common::config::resolve_port("UDX_PORT", &toml_config);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
