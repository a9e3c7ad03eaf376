// Gatekeeper Classifier
//
// Concept: Fast, coarse triage over whole documents, independent of the
// spine. Idempotent per document (an existing stamp short-circuits unless
// the caller forces reclassification) and fail-closed: every failure mode
// in this path collapses into an UNKNOWN classification on the review
// route. Fresh model outputs are cached per tenant, keyed by content hash
// and prompt fingerprint; routes are never cached.
//
// Model paths, in preference order:
//   1. text    - OCR text exists: send a bounded window of it
//   2. vision  - no text, but the stored content is a viewable image
//   3. none    - neither: route to review without calling the model

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use udx_common::events::{DocEvent, EventBus};
use uuid::Uuid;

use crate::db;
use crate::db::documents::{DocumentRow, GatekeeperStamp};
use crate::gatekeeper::router;
use crate::gatekeeper::types::{
    CoarseDocType, DetectedSignals, GatekeeperClassification, GatekeeperResult, Route,
};
use crate::llm::client::LlmClient;
use crate::llm::prompts;

/// Characters of OCR text sent on the text path (about two pages)
const TEXT_WINDOW_CHARS: usize = 6000;

/// Most documents classified in one batch call; the rest wait for the next
pub const BATCH_CAP: usize = 20;

/// Documents classified concurrently within a batch
pub const BATCH_CHUNK_SIZE: usize = 3;

/// Image types the vision path sends to the model directly
const VIEWABLE_IMAGE_MIMES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// Strict JSON shape requested from the model (signal fields are flat on
/// the wire, nested in `GatekeeperClassification`)
#[derive(Debug, Deserialize)]
struct GatekeeperWire {
    #[serde(default)]
    doc_type: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    tax_year: Option<i32>,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    form_numbers: Vec<String>,
    #[serde(default)]
    has_ein: bool,
    #[serde(default)]
    has_ssn: bool,
}

/// Outcome of one fresh classification attempt (before routing)
struct FreshClassification {
    classification: GatekeeperClassification,
    model: String,
    cache_hit: bool,
    /// Cache key half derived from the content actually considered
    content_hash: Option<String>,
    /// Only fresh model outputs are cached. Failures and no-model shortcuts
    /// never are: the same bytes may classify fine once OCR text arrives.
    cacheable: bool,
}

/// Per-deal batch outcome
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub deal_id: Uuid,
    /// Documents considered (after the batch cap)
    pub total: usize,
    /// Documents that received a usable (non-UNKNOWN) classification
    pub classified: usize,
    /// Documents routed to human review
    pub needs_review: usize,
    pub duration_ms: u64,
    pub documents: Vec<BatchDocumentOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchDocumentOutcome {
    pub document_id: Uuid,
    pub doc_type: String,
    pub confidence: f64,
    pub route: String,
    pub needs_review: bool,
    pub cache_hit: bool,
}

/// The gatekeeper service: classify, route, stamp, cache, emit
pub struct GatekeeperService {
    llm: Arc<LlmClient>,
    db: SqlitePool,
    event_bus: Arc<EventBus>,
}

impl GatekeeperService {
    pub fn new(llm: Arc<LlmClient>, db: SqlitePool, event_bus: Arc<EventBus>) -> Self {
        Self { llm, db, event_bus }
    }

    /// Classify and route one document
    ///
    /// Returns `None` only when no such document exists. Every other
    /// outcome, including model and storage failures, is a result: the
    /// worst case is `UNKNOWN` on the review route.
    pub async fn classify_document(
        &self,
        document_id: Uuid,
        force_reclassify: bool,
    ) -> Option<GatekeeperResult> {
        let started = Instant::now();

        let row = match db::documents::load_document(&self.db, document_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(document_id = %document_id, "Gatekeeper: no such document");
                return None;
            }
            Err(e) => {
                warn!(
                    document_id = %document_id,
                    error = %e,
                    "Gatekeeper: document load failed"
                );
                let classification =
                    GatekeeperClassification::failed(format!("document load failed: {}", e));
                let route = router::route_classification(&classification);
                self.emit_classified(document_id, &classification, route, false);
                return Some(GatekeeperResult {
                    classification,
                    route,
                    needs_review: true,
                    cache_hit: false,
                    latency_ms: started.elapsed().as_millis() as u64,
                    model: self.llm.model().to_string(),
                    prompt_version: prompts::GATEKEEPER_PROMPT_VERSION.to_string(),
                    prompt_hash: prompts::gatekeeper_prompt_fingerprint(),
                });
            }
        };

        // Idempotency: an existing stamp is answered from the row. The route
        // is still recomputed so routing-rule changes reach old stamps.
        if !force_reclassify {
            if let Some(stored) = stored_result(&row, started.elapsed().as_millis() as u64) {
                debug!(document_id = %document_id, "Gatekeeper: returning stored classification");
                return Some(stored);
            }
        }

        let fresh = self.classify_fresh(&row).await;
        let route = router::route_classification(&fresh.classification);
        let needs_review = route == Route::NeedsReview;
        let prompt_hash = prompts::gatekeeper_prompt_fingerprint();
        let classified_at = Utc::now();

        // Stamping is best-effort: a write failure never blocks the caller
        let stamp = GatekeeperStamp {
            doc_type: fresh.classification.doc_type.as_str().to_string(),
            confidence: fresh.classification.confidence,
            tax_year: fresh.classification.tax_year,
            route: route.as_str().to_string(),
            needs_review,
            model: fresh.model.clone(),
            prompt_version: prompts::GATEKEEPER_PROMPT_VERSION.to_string(),
            prompt_hash: prompt_hash.clone(),
            classified_at,
        };
        if let Err(e) = db::documents::stamp_gatekeeper_result(&self.db, document_id, &stamp).await
        {
            warn!(
                document_id = %document_id,
                error = %e,
                "Gatekeeper: failed to stamp document"
            );
        }

        if fresh.cacheable {
            if let Some(content_hash) = fresh.content_hash.as_deref() {
                if let Err(e) = db::cache::store_cached_classification(
                    &self.db,
                    &row.tenant_id,
                    content_hash,
                    &prompt_hash,
                    &fresh.classification,
                    &fresh.model,
                )
                .await
                {
                    warn!(
                        document_id = %document_id,
                        error = %e,
                        "Gatekeeper: failed to write cache entry"
                    );
                }
            }
        }

        self.emit_classified(document_id, &fresh.classification, route, fresh.cache_hit);
        info!(
            document_id = %document_id,
            doc_type = fresh.classification.doc_type.as_str(),
            route = route.as_str(),
            cache_hit = fresh.cache_hit,
            "Gatekeeper classified document"
        );

        Some(GatekeeperResult {
            classification: fresh.classification,
            route,
            needs_review,
            cache_hit: fresh.cache_hit,
            latency_ms: started.elapsed().as_millis() as u64,
            model: fresh.model,
            prompt_version: prompts::GATEKEEPER_PROMPT_VERSION.to_string(),
            prompt_hash,
        })
    }

    /// Classify every document attached to a deal
    ///
    /// Fixed-size concurrency windows; one document's failure never aborts
    /// the batch because per-document classification is fail-closed.
    pub async fn classify_deal(&self, deal_id: Uuid) -> anyhow::Result<BatchSummary> {
        let started = Instant::now();

        let mut rows = db::documents::load_deal_documents(&self.db, deal_id).await?;
        if rows.len() > BATCH_CAP {
            warn!(
                deal_id = %deal_id,
                attached = rows.len(),
                cap = BATCH_CAP,
                "Deal exceeds batch cap; classifying the oldest documents only"
            );
            rows.truncate(BATCH_CAP);
        }
        let total = rows.len();

        let mut documents = Vec::with_capacity(total);
        for chunk in rows.chunks(BATCH_CHUNK_SIZE) {
            let results = futures::future::join_all(
                chunk
                    .iter()
                    .map(|row| self.classify_document(row.document_id, false)),
            )
            .await;

            for (row, result) in chunk.iter().zip(results) {
                // None means the row vanished mid-batch; skip it
                let Some(result) = result else { continue };
                documents.push(BatchDocumentOutcome {
                    document_id: row.document_id,
                    doc_type: result.classification.doc_type.as_str().to_string(),
                    confidence: result.classification.confidence,
                    route: result.route.as_str().to_string(),
                    needs_review: result.needs_review,
                    cache_hit: result.cache_hit,
                });
            }
        }

        let classified = documents
            .iter()
            .filter(|d| d.doc_type != CoarseDocType::Unknown.as_str())
            .count();
        let needs_review = documents.iter().filter(|d| d.needs_review).count();
        let duration_ms = started.elapsed().as_millis() as u64;

        self.event_bus.emit_lossy(DocEvent::BatchClassificationCompleted {
            deal_id,
            total,
            classified,
            needs_review,
            duration_ms,
            timestamp: Utc::now(),
        });
        info!(
            deal_id = %deal_id,
            total,
            classified,
            needs_review,
            duration_ms,
            "Batch classification completed"
        );

        Ok(BatchSummary {
            deal_id,
            total,
            classified,
            needs_review,
            duration_ms,
            documents,
        })
    }

    /// Run one fresh classification attempt: cache, then model, fail-closed
    async fn classify_fresh(&self, row: &DocumentRow) -> FreshClassification {
        let prompt_hash = prompts::gatekeeper_prompt_fingerprint();
        let text = row.ocr_text.as_deref().map(str::trim).filter(|t| !t.is_empty());

        if let Some(text) = text {
            let content_hash = row
                .content_hash
                .clone()
                .unwrap_or_else(|| prompts::content_fingerprint(text.as_bytes()));

            if let Some(hit) = self.cache_lookup(&row.tenant_id, &content_hash, &prompt_hash).await
            {
                return FreshClassification {
                    classification: hit.classification,
                    model: hit.model,
                    cache_hit: true,
                    content_hash: Some(content_hash),
                    cacheable: false,
                };
            }

            let prompt = prompts::gatekeeper_prompt(text_window(text));
            let attempt = self.llm.generate_json(&prompt).await;
            return self.model_outcome(row, attempt, Some(content_hash));
        }

        // Vision path: only directly-viewable images go to the model
        let Some(path) = row.content_path.as_deref() else {
            return no_model_shortcut(self.llm.model(), "no OCR text and no stored content");
        };
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    document_id = %row.document_id,
                    error = %e,
                    "Gatekeeper: stored content unreadable"
                );
                return no_model_shortcut(
                    self.llm.model(),
                    format!("stored content unreadable: {}", e),
                );
            }
        };
        let Some(mime) = viewable_image_mime(row.mime_type.as_deref(), &bytes) else {
            return no_model_shortcut(
                self.llm.model(),
                "no OCR text and content is not a viewable image",
            );
        };

        let content_hash = row
            .content_hash
            .clone()
            .unwrap_or_else(|| prompts::content_fingerprint(&bytes));

        if let Some(hit) = self.cache_lookup(&row.tenant_id, &content_hash, &prompt_hash).await {
            return FreshClassification {
                classification: hit.classification,
                model: hit.model,
                cache_hit: true,
                content_hash: Some(content_hash),
                cacheable: false,
            };
        }

        let attempt = self
            .llm
            .generate_json_with_image(prompts::gatekeeper_vision_prompt(), &mime, &bytes)
            .await;
        self.model_outcome(row, attempt, Some(content_hash))
    }

    /// Convert a model attempt into a fresh outcome, fail-closed
    fn model_outcome(
        &self,
        row: &DocumentRow,
        attempt: Result<String, crate::llm::client::LlmError>,
        content_hash: Option<String>,
    ) -> FreshClassification {
        let model = self.llm.model().to_string();
        match attempt {
            Ok(raw) => match parse_model_output(&raw) {
                Ok(classification) => FreshClassification {
                    classification,
                    model,
                    cache_hit: false,
                    content_hash,
                    cacheable: true,
                },
                Err(e) => {
                    warn!(
                        document_id = %row.document_id,
                        error = %e,
                        "Gatekeeper: model response unusable"
                    );
                    FreshClassification {
                        classification: GatekeeperClassification::failed(format!(
                            "unusable model response: {}",
                            e
                        )),
                        model,
                        cache_hit: false,
                        content_hash,
                        cacheable: false,
                    }
                }
            },
            Err(e) => {
                warn!(
                    document_id = %row.document_id,
                    error = %e,
                    "Gatekeeper: model call failed"
                );
                FreshClassification {
                    classification: GatekeeperClassification::failed(format!(
                        "model call failed: {}",
                        e
                    )),
                    model,
                    cache_hit: false,
                    content_hash,
                    cacheable: false,
                }
            }
        }
    }

    /// Cache read with errors downgraded to misses
    async fn cache_lookup(
        &self,
        tenant_id: &str,
        content_hash: &str,
        prompt_hash: &str,
    ) -> Option<db::cache::CacheHit> {
        match db::cache::load_cached_classification(&self.db, tenant_id, content_hash, prompt_hash)
            .await
        {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Gatekeeper: cache read failed, treating as miss");
                None
            }
        }
    }

    fn emit_classified(
        &self,
        document_id: Uuid,
        classification: &GatekeeperClassification,
        route: Route,
        cache_hit: bool,
    ) {
        self.event_bus.emit_lossy(DocEvent::GatekeeperClassified {
            document_id,
            doc_type: classification.doc_type.as_str().to_string(),
            confidence: classification.confidence,
            route: route.as_str().to_string(),
            needs_review: route == Route::NeedsReview,
            cache_hit,
            timestamp: Utc::now(),
        });
    }
}

/// Rebuild a result from the row's stamp, if one exists
///
/// Reasons and signals are not stored on the row; a stored result carries
/// the decision, not the full audit trail (that lives in the event stream).
fn stored_result(row: &DocumentRow, latency_ms: u64) -> Option<GatekeeperResult> {
    row.gk_classified_at?;

    let classification = GatekeeperClassification {
        doc_type: CoarseDocType::parse(row.gk_doc_type.as_deref().unwrap_or("UNKNOWN")),
        confidence: row.gk_confidence.unwrap_or(0.0),
        tax_year: row.gk_tax_year,
        reasons: Vec::new(),
        signals: DetectedSignals::default(),
    };
    let route = router::route_classification(&classification);

    Some(GatekeeperResult {
        classification,
        route,
        needs_review: route == Route::NeedsReview,
        cache_hit: true,
        latency_ms,
        model: row.gk_model.clone().unwrap_or_default(),
        prompt_version: row.gk_prompt_version.clone().unwrap_or_default(),
        prompt_hash: row.gk_prompt_hash.clone().unwrap_or_default(),
    })
}

/// A review-routed outcome produced without calling the model
fn no_model_shortcut(model: &str, reason: impl Into<String>) -> FreshClassification {
    FreshClassification {
        classification: GatekeeperClassification::failed(reason),
        model: model.to_string(),
        cache_hit: false,
        content_hash: None,
        cacheable: false,
    }
}

/// Parse strict-JSON model output into a classification
///
/// Total over the taxonomy: an unrecognized label becomes `Unknown`, and
/// confidence is clamped to the unit interval before routing sees it.
fn parse_model_output(raw: &str) -> Result<GatekeeperClassification, String> {
    let json = crate::llm::extract_json_object(raw)
        .ok_or_else(|| "no JSON object in output".to_string())?;
    let wire: GatekeeperWire = serde_json::from_str(json).map_err(|e| e.to_string())?;

    Ok(GatekeeperClassification {
        doc_type: CoarseDocType::parse(&wire.doc_type.trim().to_uppercase()),
        confidence: wire.confidence.clamp(0.0, 1.0),
        tax_year: wire.tax_year,
        reasons: wire.reasons,
        signals: DetectedSignals {
            form_numbers: wire.form_numbers,
            has_ein: wire.has_ein,
            has_ssn: wire.has_ssn,
        },
    })
}

/// Bounded prefix of the OCR text, respecting char boundaries
fn text_window(text: &str) -> &str {
    match text.char_indices().nth(TEXT_WINDOW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Resolve the mime type the vision path may send, if any
///
/// A declared viewable type wins; otherwise the bytes are sniffed, which
/// also rescues content mislabeled by the uploader.
fn viewable_image_mime(declared: Option<&str>, bytes: &[u8]) -> Option<String> {
    if let Some(mime) = declared {
        if VIEWABLE_IMAGE_MIMES.contains(&mime) {
            return Some(mime.to_string());
        }
    }
    let sniffed = infer::get(bytes)?;
    let mime = sniffed.mime_type();
    VIEWABLE_IMAGE_MIMES.contains(&mime).then(|| mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmCredentials;
    use crate::db::documents::NewDocument;

    async fn test_service() -> (GatekeeperService, Arc<EventBus>, SqlitePool) {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        udx_common::db::create_all_tables(&pool)
            .await
            .expect("Failed to create tables");

        let event_bus = Arc::new(EventBus::new(64));
        // Unroutable port: any model call fails fast with connection refused
        let llm = Arc::new(LlmClient::new(LlmCredentials {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "test-model".to_string(),
        }));
        let service = GatekeeperService::new(llm, pool.clone(), event_bus.clone());
        (service, event_bus, pool)
    }

    async fn save_doc(pool: &SqlitePool, doc: &NewDocument) {
        db::documents::save_document(pool, doc)
            .await
            .expect("Failed to save document");
    }

    async fn cache_entries(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM gatekeeper_cache")
            .fetch_one(pool)
            .await
            .expect("Failed to count cache entries")
    }

    #[tokio::test]
    async fn test_missing_document_returns_none() {
        let (service, _bus, _pool) = test_service().await;

        let result = service.classify_document(Uuid::new_v4(), false).await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_no_text_no_content_routes_review_without_model() {
        let (service, _bus, pool) = test_service().await;
        let doc = NewDocument::new("scan.pdf".to_string());
        save_doc(&pool, &doc).await;

        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        assert_eq!(result.classification.doc_type, CoarseDocType::Unknown);
        assert_eq!(result.route, Route::NeedsReview);
        assert!(result.needs_review);
        assert!(!result.cache_hit);
        assert!(result.classification.reasons[0].contains("no OCR text"));

        // Stamped, but nothing cached
        let row = db::documents::load_document(&pool, doc.document_id)
            .await
            .unwrap()
            .unwrap();
        assert!(row.gk_classified_at.is_some());
        assert_eq!(row.gk_doc_type.as_deref(), Some("UNKNOWN"));
        assert!(row.gk_needs_review);
        assert_eq!(cache_entries(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_model_failure_fails_closed_and_is_not_cached() {
        let (service, _bus, pool) = test_service().await;
        let mut doc = NewDocument::new("w2.pdf".to_string());
        doc.ocr_text = Some("Form W-2 Wage and Tax Statement 2023".to_string());
        save_doc(&pool, &doc).await;

        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        assert_eq!(result.classification.doc_type, CoarseDocType::Unknown);
        assert_eq!(result.route, Route::NeedsReview);
        assert!(result.classification.reasons[0].contains("model call failed"));
        assert_eq!(cache_entries(&pool).await, 0);

        let row = db::documents::load_document(&pool, doc.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.gk_route.as_deref(), Some("NEEDS_REVIEW"));
    }

    #[tokio::test]
    async fn test_existing_stamp_short_circuits() {
        let (service, _bus, pool) = test_service().await;
        let mut doc = NewDocument::new("1040.pdf".to_string());
        doc.ocr_text = Some("Form 1040".to_string());
        save_doc(&pool, &doc).await;

        let stamp = GatekeeperStamp {
            doc_type: "PERSONAL_TAX_RETURN".to_string(),
            confidence: 0.93,
            tax_year: Some(2023),
            route: "GOOGLE_DOC_AI_CORE".to_string(),
            needs_review: false,
            model: "earlier-model".to_string(),
            prompt_version: "gk-v2".to_string(),
            prompt_hash: "oldhash".to_string(),
            classified_at: Utc::now(),
        };
        db::documents::stamp_gatekeeper_result(&pool, doc.document_id, &stamp)
            .await
            .unwrap();

        // Model is unreachable, so a fresh attempt would come back UNKNOWN;
        // getting the stored type proves no model call happened.
        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        assert_eq!(
            result.classification.doc_type,
            CoarseDocType::PersonalTaxReturn
        );
        assert_eq!(result.classification.confidence, 0.93);
        assert_eq!(result.classification.tax_year, Some(2023));
        assert_eq!(result.route, Route::GoogleDocAiCore);
        assert!(result.cache_hit);
        assert_eq!(result.model, "earlier-model");
    }

    #[tokio::test]
    async fn test_stored_stamp_route_is_recomputed() {
        let (service, _bus, pool) = test_service().await;
        let doc = NewDocument::new("1040.pdf".to_string());
        save_doc(&pool, &doc).await;

        // A return stamped without a year under some earlier routing rules
        let stamp = GatekeeperStamp {
            doc_type: "PERSONAL_TAX_RETURN".to_string(),
            confidence: 0.95,
            tax_year: None,
            route: "GOOGLE_DOC_AI_CORE".to_string(),
            needs_review: false,
            model: "earlier-model".to_string(),
            prompt_version: "gk-v2".to_string(),
            prompt_hash: "oldhash".to_string(),
            classified_at: Utc::now(),
        };
        db::documents::stamp_gatekeeper_result(&pool, doc.document_id, &stamp)
            .await
            .unwrap();

        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        // Current rules: a tax return without a year needs review
        assert_eq!(result.route, Route::NeedsReview);
        assert!(result.needs_review);
    }

    #[tokio::test]
    async fn test_force_reclassify_bypasses_stamp() {
        let (service, _bus, pool) = test_service().await;
        let mut doc = NewDocument::new("1040.pdf".to_string());
        doc.ocr_text = Some("Form 1040".to_string());
        save_doc(&pool, &doc).await;

        let stamp = GatekeeperStamp {
            doc_type: "PERSONAL_TAX_RETURN".to_string(),
            confidence: 0.93,
            tax_year: Some(2023),
            route: "GOOGLE_DOC_AI_CORE".to_string(),
            needs_review: false,
            model: "earlier-model".to_string(),
            prompt_version: "gk-v2".to_string(),
            prompt_hash: "oldhash".to_string(),
            classified_at: Utc::now(),
        };
        db::documents::stamp_gatekeeper_result(&pool, doc.document_id, &stamp)
            .await
            .unwrap();

        let result = service
            .classify_document(doc.document_id, true)
            .await
            .expect("document exists");

        // Fresh attempt hit the unreachable model and failed closed
        assert_eq!(result.classification.doc_type, CoarseDocType::Unknown);
        assert!(!result.cache_hit);

        let row = db::documents::load_document(&pool, doc.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.gk_doc_type.as_deref(), Some("UNKNOWN"));
        assert_eq!(row.gk_model.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_model() {
        let (service, _bus, pool) = test_service().await;
        let mut doc = NewDocument::new("w2.pdf".to_string());
        doc.ocr_text = Some("Form W-2 Wage and Tax Statement".to_string());
        doc.content_hash = Some("cafebabe".to_string());
        save_doc(&pool, &doc).await;

        let cached = GatekeeperClassification {
            doc_type: CoarseDocType::W2,
            confidence: 0.91,
            tax_year: Some(2023),
            reasons: vec!["W-2 header".to_string()],
            signals: DetectedSignals::default(),
        };
        db::cache::store_cached_classification(
            &pool,
            "default",
            "cafebabe",
            &prompts::gatekeeper_prompt_fingerprint(),
            &cached,
            "cached-model",
        )
        .await
        .unwrap();

        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        assert_eq!(result.classification.doc_type, CoarseDocType::W2);
        assert_eq!(result.classification.confidence, 0.91);
        assert!(result.cache_hit);
        assert_eq!(result.model, "cached-model");
        assert_eq!(result.route, Route::GoogleDocAiCore);

        // The stamp records the cached decision too
        let row = db::documents::load_document(&pool, doc.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.gk_doc_type.as_deref(), Some("W2"));
        assert_eq!(row.gk_model.as_deref(), Some("cached-model"));
    }

    #[tokio::test]
    async fn test_cached_classification_routes_under_current_rules() {
        let (service, _bus, pool) = test_service().await;
        let mut doc = NewDocument::new("1040.pdf".to_string());
        doc.ocr_text = Some("Form 1040".to_string());
        doc.content_hash = Some("feedface".to_string());
        save_doc(&pool, &doc).await;

        // Cached entry has no tax year: the router, not the cache, decides
        let cached = GatekeeperClassification {
            doc_type: CoarseDocType::PersonalTaxReturn,
            confidence: 0.95,
            tax_year: None,
            reasons: vec![],
            signals: DetectedSignals::default(),
        };
        db::cache::store_cached_classification(
            &pool,
            "default",
            "feedface",
            &prompts::gatekeeper_prompt_fingerprint(),
            &cached,
            "cached-model",
        )
        .await
        .unwrap();

        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        assert!(result.cache_hit);
        assert_eq!(result.route, Route::NeedsReview);
    }

    #[tokio::test]
    async fn test_vision_path_reads_content_and_fails_closed() {
        let (service, _bus, pool) = test_service().await;

        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let image_path = dir.path().join("page.png");
        // Minimal PNG magic so the sniffer recognizes the type
        let png_bytes = [
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
        ];
        std::fs::write(&image_path, png_bytes).expect("Failed to write image");

        let mut doc = NewDocument::new("page.png".to_string());
        doc.content_path = Some(image_path.to_string_lossy().to_string());
        save_doc(&pool, &doc).await;

        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        // The vision path reached the (unreachable) model, not the shortcut
        assert_eq!(result.classification.doc_type, CoarseDocType::Unknown);
        assert!(result.classification.reasons[0].contains("model call failed"));
    }

    #[tokio::test]
    async fn test_unreadable_content_shortcuts_to_review() {
        let (service, _bus, pool) = test_service().await;

        let mut doc = NewDocument::new("gone.png".to_string());
        doc.mime_type = Some("image/png".to_string());
        doc.content_path = Some("/nonexistent/path/gone.png".to_string());
        save_doc(&pool, &doc).await;

        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        assert_eq!(result.route, Route::NeedsReview);
        assert!(result.classification.reasons[0].contains("unreadable"));
    }

    #[tokio::test]
    async fn test_non_image_content_shortcuts_to_review() {
        let (service, _bus, pool) = test_service().await;

        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4 not an image").expect("Failed to write file");

        let mut doc = NewDocument::new("doc.pdf".to_string());
        doc.mime_type = Some("application/pdf".to_string());
        doc.content_path = Some(path.to_string_lossy().to_string());
        save_doc(&pool, &doc).await;

        let result = service
            .classify_document(doc.document_id, false)
            .await
            .expect("document exists");

        assert_eq!(result.route, Route::NeedsReview);
        assert!(result.classification.reasons[0].contains("not a viewable image"));
    }

    #[tokio::test]
    async fn test_classify_emits_gatekeeper_event() {
        let (service, bus, pool) = test_service().await;
        let mut rx = bus.subscribe();

        let doc = NewDocument::new("scan.pdf".to_string());
        save_doc(&pool, &doc).await;
        service.classify_document(doc.document_id, false).await;

        match rx.try_recv().expect("expected an event") {
            DocEvent::GatekeeperClassified {
                document_id,
                doc_type,
                route,
                needs_review,
                cache_hit,
                ..
            } => {
                assert_eq!(document_id, doc.document_id);
                assert_eq!(doc_type, "UNKNOWN");
                assert_eq!(route, "NEEDS_REVIEW");
                assert!(needs_review);
                assert!(!cache_hit);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stored_stamp_does_not_re_emit() {
        let (service, bus, pool) = test_service().await;

        let doc = NewDocument::new("scan.pdf".to_string());
        save_doc(&pool, &doc).await;
        let stamp = GatekeeperStamp {
            doc_type: "BANK_STATEMENT".to_string(),
            confidence: 0.9,
            tax_year: None,
            route: "STANDARD".to_string(),
            needs_review: false,
            model: "earlier-model".to_string(),
            prompt_version: "gk-v2".to_string(),
            prompt_hash: "oldhash".to_string(),
            classified_at: Utc::now(),
        };
        db::documents::stamp_gatekeeper_result(&pool, doc.document_id, &stamp)
            .await
            .unwrap();

        let mut rx = bus.subscribe();
        service.classify_document(doc.document_id, false).await;

        assert!(rx.try_recv().is_err(), "idempotent read should not emit");
    }

    #[tokio::test]
    async fn test_batch_classifies_whole_deal() {
        let (service, bus, pool) = test_service().await;
        let deal_id = Uuid::new_v4();

        for name in ["a.pdf", "b.pdf"] {
            let mut doc = NewDocument::new(name.to_string());
            doc.deal_id = Some(deal_id);
            save_doc(&pool, &doc).await;
        }
        let mut rx = bus.subscribe();

        let summary = service.classify_deal(deal_id).await.expect("batch failed");

        assert_eq!(summary.total, 2);
        assert_eq!(summary.classified, 0);
        assert_eq!(summary.needs_review, 2);
        assert_eq!(summary.documents.len(), 2);

        // Two per-document events, then the batch event
        let mut saw_batch = false;
        while let Ok(event) = rx.try_recv() {
            if let DocEvent::BatchClassificationCompleted {
                deal_id: event_deal,
                total,
                needs_review,
                ..
            } = event
            {
                assert_eq!(event_deal, deal_id);
                assert_eq!(total, 2);
                assert_eq!(needs_review, 2);
                saw_batch = true;
            }
        }
        assert!(saw_batch, "batch completion event missing");
    }

    #[tokio::test]
    async fn test_batch_respects_cap() {
        let (service, _bus, pool) = test_service().await;
        let deal_id = Uuid::new_v4();

        for i in 0..(BATCH_CAP + 3) {
            let mut doc = NewDocument::new(format!("doc_{}.pdf", i));
            doc.deal_id = Some(deal_id);
            save_doc(&pool, &doc).await;
        }

        let summary = service.classify_deal(deal_id).await.expect("batch failed");

        assert_eq!(summary.total, BATCH_CAP);
        assert_eq!(summary.documents.len(), BATCH_CAP);
    }

    #[tokio::test]
    async fn test_batch_on_empty_deal() {
        let (service, _bus, _pool) = test_service().await;

        let summary = service
            .classify_deal(Uuid::new_v4())
            .await
            .expect("batch failed");

        assert_eq!(summary.total, 0);
        assert_eq!(summary.classified, 0);
        assert_eq!(summary.needs_review, 0);
    }

    #[test]
    fn test_parse_model_output_full_shape() {
        let raw = r#"{"doc_type": "SCHEDULE_K1", "confidence": 0.88, "tax_year": 2022,
                      "reasons": ["K-1 header"], "form_numbers": ["1065"],
                      "has_ein": true, "has_ssn": false}"#;
        let parsed = parse_model_output(raw).unwrap();
        assert_eq!(parsed.doc_type, CoarseDocType::ScheduleK1);
        assert_eq!(parsed.confidence, 0.88);
        assert_eq!(parsed.tax_year, Some(2022));
        assert_eq!(parsed.signals.form_numbers, vec!["1065".to_string()]);
        assert!(parsed.signals.has_ein);
    }

    #[test]
    fn test_parse_model_output_tolerates_fences_and_case() {
        let raw = "```json\n{\"doc_type\": \"rent_roll\", \"confidence\": 0.8}\n```";
        let parsed = parse_model_output(raw).unwrap();
        assert_eq!(parsed.doc_type, CoarseDocType::RentRoll);
    }

    #[test]
    fn test_parse_model_output_unknown_label_and_clamp() {
        let raw = r#"{"doc_type": "SOMETHING_NEW", "confidence": 1.4}"#;
        let parsed = parse_model_output(raw).unwrap();
        assert_eq!(parsed.doc_type, CoarseDocType::Unknown);
        assert_eq!(parsed.confidence, 1.0);
    }

    #[test]
    fn test_parse_model_output_garbage_is_error() {
        assert!(parse_model_output("this looks like a W-2 to me").is_err());
    }

    #[test]
    fn test_text_window_bounds() {
        let short = "short text";
        assert_eq!(text_window(short), short);

        let long: String = "x".repeat(TEXT_WINDOW_CHARS + 100);
        assert_eq!(text_window(&long).chars().count(), TEXT_WINDOW_CHARS);
    }

    #[test]
    fn test_viewable_image_mime_declared_wins() {
        assert_eq!(
            viewable_image_mime(Some("image/png"), b"whatever"),
            Some("image/png".to_string())
        );
    }

    #[test]
    fn test_viewable_image_mime_sniffs_when_undeclared() {
        let png_magic = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(
            viewable_image_mime(None, &png_magic),
            Some("image/png".to_string())
        );
        assert_eq!(viewable_image_mime(None, b"plain text"), None);
    }

    #[test]
    fn test_viewable_image_mime_rejects_pdf() {
        assert_eq!(
            viewable_image_mime(Some("application/pdf"), b"%PDF-1.4"),
            None
        );
    }
}
