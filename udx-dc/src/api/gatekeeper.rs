//! Gatekeeper classification API handlers
//!
//! POST /gatekeeper/classify (single document, idempotent) and
//! POST /deals/:deal_id/classify (batch, all-settled).

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::gatekeeper::classifier::BatchSummary;
use crate::gatekeeper::types::GatekeeperResult;
use crate::AppState;

/// POST /gatekeeper/classify request
#[derive(Debug, Deserialize)]
pub struct GatekeeperClassifyRequest {
    pub document_id: Uuid,
    /// Recompute even when a stored stamp exists
    #[serde(default)]
    pub force_reclassify: bool,
}

/// POST /gatekeeper/classify
///
/// Classify and route one document. Repeat calls return the stored decision
/// (with the route recomputed under current rules) unless `force_reclassify`
/// is set. 404 only when the document does not exist; every other outcome is
/// a result, fail-closed at worst.
pub async fn classify_gatekeeper(
    State(state): State<AppState>,
    Json(request): Json<GatekeeperClassifyRequest>,
) -> ApiResult<Json<GatekeeperResult>> {
    let result = state
        .gatekeeper
        .classify_document(request.document_id, request.force_reclassify)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!("Document not found: {}", request.document_id))
        })?;

    Ok(Json(result))
}

/// POST /deals/:deal_id/classify
///
/// Run the gatekeeper over every unclassified document attached to a deal.
/// One document's failure never aborts the batch; the summary reports each
/// outcome independently.
pub async fn classify_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> ApiResult<Json<BatchSummary>> {
    match state.gatekeeper.classify_deal(deal_id).await {
        Ok(summary) => {
            tracing::info!(
                deal_id = %deal_id,
                total = summary.total,
                classified = summary.classified,
                needs_review = summary.needs_review,
                "Deal batch classification completed"
            );
            Ok(Json(summary))
        }
        Err(e) => {
            state.record_error(e.to_string()).await;
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

/// Build gatekeeper routes
pub fn gatekeeper_routes() -> Router<AppState> {
    Router::new()
        .route("/gatekeeper/classify", post(classify_gatekeeper))
        .route("/deals/:deal_id/classify", post(classify_deal))
}
