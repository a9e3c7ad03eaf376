//! Deal readiness API handler
//!
//! GET /deals/:deal_id/readiness evaluates completeness on demand from the
//! current document rows. Read-only and repeatable; the evaluation event is
//! the only side effect.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use udx_common::events::DocEvent;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::readiness::engine::{compute_readiness, ClassifiedDocument, ReadinessResult};
use crate::readiness::requirements::{derive_requirements, IntakeScenario};
use crate::resolver::{resolve, DocumentSignals};
use crate::AppState;

/// GET /deals/:deal_id/readiness
///
/// Derive the scenario's requirements as of today, resolve every attached
/// document's effective classification, and match facts. A deal with no
/// documents is a valid (empty) evaluation, not an error.
pub async fn get_readiness(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
    Query(scenario): Query<IntakeScenario>,
) -> ApiResult<Json<ReadinessResult>> {
    let rows = crate::db::documents::load_deal_documents(&state.db, deal_id).await?;

    let documents: Vec<ClassifiedDocument> = rows
        .iter()
        .map(|row| {
            let resolved = resolve(&DocumentSignals::from_row(row));
            ClassifiedDocument {
                effective_doc_type: resolved.effective_doc_type,
                effective_tax_year: resolved.effective_tax_year,
                needs_review: row.gk_needs_review,
            }
        })
        .collect();

    let requirements = derive_requirements(&scenario, Utc::now().date_naive());
    let result = compute_readiness(&requirements, &documents);

    state.event_bus.emit_lossy(DocEvent::ReadinessEvaluated {
        deal_id,
        readiness_pct: result.readiness_pct,
        ready: result.ready,
        missing_count: result.missing.len(),
        needs_review_count: result.needs_review_count,
        timestamp: Utc::now(),
    });
    tracing::info!(
        deal_id = %deal_id,
        readiness_pct = result.readiness_pct,
        ready = result.ready,
        missing = result.missing.len(),
        needs_review = result.needs_review_count,
        "Readiness evaluated"
    );

    Ok(Json(result))
}

/// Build readiness routes
pub fn readiness_routes() -> Router<AppState> {
    Router::new().route("/deals/:deal_id/readiness", get(get_readiness))
}
