//! Fine-grained classification API handlers
//!
//! POST /spine/classify runs the full tiered pipeline and reports, alongside
//! the classification itself, whether the result clears the adaptive
//! auto-attach threshold for its (tier, band) cell.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::spine::orchestrator::ClassifyRequest;
use crate::spine::threshold::{resolve_threshold, ThresholdPolicy};
use crate::spine::types::{ExternalSignal, SpineClassification};
use crate::AppState;

/// POST /spine/classify request
#[derive(Debug, Deserialize)]
pub struct SpineClassifyRequest {
    pub document_id: Uuid,
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Raw OCR text
    pub text: String,
    /// Optional label from the upstream OCR processor's own classifier
    #[serde(default)]
    pub external_signal: Option<ExternalSignal>,
}

/// Whether the classification may auto-populate a checklist slot
#[derive(Debug, Serialize)]
pub struct AutoAttachDecision {
    /// Effective threshold for this (tier, band) cell
    pub threshold: f64,
    /// Calibrated confidence meets or exceeds the threshold
    pub eligible: bool,
}

/// POST /spine/classify response
#[derive(Debug, Serialize)]
pub struct SpineClassifyResponse {
    pub classification: SpineClassification,
    pub auto_attach: AutoAttachDecision,
}

/// POST /spine/classify
///
/// Classify one document. The pipeline is non-throwing; the worst case is a
/// calibrated fallback classification. A calibration-curve read failure
/// degrades to baseline thresholds rather than failing the request.
pub async fn classify_spine(
    State(state): State<AppState>,
    Json(request): Json<SpineClassifyRequest>,
) -> Json<SpineClassifyResponse> {
    let classification = state
        .orchestrator
        .classify(&ClassifyRequest {
            document_id: request.document_id,
            filename: request.filename,
            mime_type: request.mime_type,
            text: request.text,
            external_signal: request.external_signal,
        })
        .await;

    let curve = match crate::db::calibration::load_calibration_curve(&state.db).await {
        Ok(curve) => curve,
        Err(e) => {
            warn!(
                document_id = %request.document_id,
                "Calibration curve unavailable, using baseline thresholds: {}", e
            );
            Vec::new()
        }
    };
    let threshold = resolve_threshold(
        classification.spine_tier,
        classification.band,
        &curve,
        &ThresholdPolicy::default(),
    );
    let auto_attach = AutoAttachDecision {
        threshold,
        eligible: classification.confidence >= threshold,
    };

    Json(SpineClassifyResponse {
        classification,
        auto_attach,
    })
}

/// Build fine-grained classification routes
pub fn spine_routes() -> Router<AppState> {
    Router::new().route("/spine/classify", post(classify_spine))
}
