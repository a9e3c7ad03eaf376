//! Document classification truth API handlers
//!
//! GET /documents/:document_id/resolved reports the single effective
//! classification; POST /documents/:document_id/confirm records a human
//! decision, which dominates every automated source from then on.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use udx_common::events::DocEvent;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::resolver::{resolve, DocumentSignals, ResolvedClassification};
use crate::AppState;

/// GET /documents/:document_id/resolved
///
/// Resolve the effective classification from all stored sources. Read-only.
pub async fn get_resolved(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<ResolvedClassification>> {
    let row = crate::db::documents::load_document(&state.db, document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: {}", document_id)))?;

    Ok(Json(resolve(&DocumentSignals::from_row(&row))))
}

/// POST /documents/:document_id/confirm request
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    /// Human-confirmed document type
    pub doc_type: String,
    /// Human-confirmed tax year, if the type has one
    #[serde(default)]
    pub tax_year: Option<i32>,
}

/// POST /documents/:document_id/confirm
///
/// Stamp a human confirmation onto the document and emit the confirmation
/// event. Returns the new effective classification.
pub async fn confirm_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<Json<ResolvedClassification>> {
    let doc_type = request.doc_type.trim();
    if doc_type.is_empty() {
        return Err(ApiError::BadRequest(
            "doc_type must be non-empty".to_string(),
        ));
    }

    crate::db::documents::load_document(&state.db, document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: {}", document_id)))?;

    let confirmed_at = Utc::now();
    crate::db::documents::confirm_document(
        &state.db,
        document_id,
        doc_type,
        request.tax_year,
        confirmed_at,
    )
    .await?;

    state.event_bus.emit_lossy(DocEvent::DocumentConfirmed {
        document_id,
        doc_type: doc_type.to_string(),
        tax_year: request.tax_year,
        timestamp: confirmed_at,
    });
    tracing::info!(
        document_id = %document_id,
        doc_type = %doc_type,
        tax_year = ?request.tax_year,
        "Document classification confirmed"
    );

    let row = crate::db::documents::load_document(&state.db, document_id)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(format!("Document vanished during confirm: {}", document_id))
        })?;

    Ok(Json(resolve(&DocumentSignals::from_row(&row))))
}

/// Build document truth routes
pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/documents/:document_id/resolved", get(get_resolved))
        .route("/documents/:document_id/confirm", post(confirm_document))
}
