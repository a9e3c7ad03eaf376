// Spine Orchestrator
//
// Concept: The single entry point for fine-grained classification. Runs the
// tiers in order (anchor rules, structural rules, model escalation), folds in
// an optional external processor label, calibrates the winner, and always
// returns a classification. The orchestrator is contractually non-throwing:
// every tier has an infallible signature, the escalator converts its own
// failures into a low-confidence outcome, and persistence is best-effort.
//
// Cross-validation policy: a high-confidence external label can corroborate
// an anchor match, lose to a disagreeing anchor match (it then counts as a
// confusion candidate for calibration), or be adopted outright when no
// anchor rule fired. Deterministic rules always win disagreements.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use udx_common::events::{DocEvent, EventBus};
use uuid::Uuid;

use crate::db;
use crate::llm::client::LlmClient;
use crate::llm::examples::ExampleCorpus;
use crate::spine::calibration::{calibrate, CalibrationInputs};
use crate::spine::gate::{self, GateDecision};
use crate::spine::normalizer::Normalizer;
use crate::spine::rules::RuleSet;
use crate::spine::tier1::Tier1AnchorMatcher;
use crate::spine::tier2::Tier2StructuralMatcher;
use crate::spine::tier3::Tier3Escalator;
use crate::spine::types::{
    DocType, EntityType, EvidenceItem, EvidenceKind, ExternalSignal, MatchOutcome,
    NormalizedDocument, SpineClassification, SpineTier, SPINE_SCHEMA_VERSION,
};

/// External labels below this confidence are ignored entirely
pub const EXTERNAL_SIGNAL_MIN_CONFIDENCE: f64 = 0.85;

/// Adopted external signals land in this confidence range: high enough to
/// finalize, never as high as a native anchor rule.
const ADOPTED_CONFIDENCE_MIN: f64 = 0.75;
const ADOPTED_CONFIDENCE_MAX: f64 = 0.95;

/// Raw confidence of the exhausted-tiers fallback, before calibration
const FALLBACK_CONFIDENCE: f64 = 0.1;

/// One classification request, as received from the caller
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub document_id: Uuid,
    pub filename: String,
    pub mime_type: Option<String>,
    /// Raw OCR text
    pub text: String,
    /// Optional label from the upstream OCR processor's own classifier
    pub external_signal: Option<ExternalSignal>,
}

/// Which tier won, with everything calibration and the final shape need
struct TierSelection {
    tier: SpineTier,
    doc_type: DocType,
    raw_confidence: f64,
    entity_type: Option<EntityType>,
    evidence: Vec<EvidenceItem>,
    reason: String,
    /// Year the escalation model extracted, used when the normalizer found none
    tax_year_hint: Option<i32>,
    /// Competing labels that should cost an ambiguity penalty
    confusion_candidates: Vec<String>,
}

pub struct SpineOrchestrator {
    normalizer: Normalizer,
    tier1: Tier1AnchorMatcher,
    tier2: Tier2StructuralMatcher,
    tier3: Tier3Escalator,
    db: SqlitePool,
    event_bus: Arc<EventBus>,
}

impl SpineOrchestrator {
    pub fn new(
        rules: Arc<RuleSet>,
        llm: Arc<LlmClient>,
        corpus: Arc<ExampleCorpus>,
        db: SqlitePool,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            normalizer: Normalizer::new(),
            tier1: Tier1AnchorMatcher::new(rules.clone()),
            tier2: Tier2StructuralMatcher::new(rules),
            tier3: Tier3Escalator::new(llm, corpus),
            db,
            event_bus,
        }
    }

    /// Classify a document. Never fails; the worst case is the calibrated
    /// fallback result.
    pub async fn classify(&self, request: &ClassifyRequest) -> SpineClassification {
        self.event_bus.emit_lossy(DocEvent::ClassificationStarted {
            document_id: request.document_id,
            filename: request.filename.clone(),
            timestamp: Utc::now(),
        });

        let doc = self.normalizer.normalize(
            request.document_id,
            &request.filename,
            request.mime_type.as_deref(),
            &request.text,
        );

        let selection = self.select_tier(&doc, request.external_signal.as_ref()).await;

        // Year resolution prefers the normalizer's phrase evidence; the
        // escalation model's extraction fills in only when that found nothing.
        let tax_year = self
            .normalizer
            .resolve_tax_year(&doc.full_text, &doc.detected_years)
            .or(selection.tax_year_hint);
        let form_numbers = self.normalizer.detect_return_form_numbers(&doc.full_text);

        let calibrated = calibrate(&CalibrationInputs {
            raw_confidence: selection.raw_confidence,
            confusion_candidates: selection.confusion_candidates,
            detected_years: doc.detected_years.clone(),
            resolved_tax_year: tax_year,
            form_numbers,
            text_chars: doc.full_text.chars().count(),
        });

        let classification = SpineClassification {
            document_id: request.document_id,
            doc_type: selection.doc_type,
            confidence: calibrated.confidence,
            band: calibrated.band,
            spine_tier: selection.tier,
            tax_year,
            entity_type: selection.entity_type,
            evidence: selection.evidence,
            penalties: calibrated.penalties,
            reason: selection.reason,
            schema_version: SPINE_SCHEMA_VERSION,
        };

        if classification.spine_tier == SpineTier::Fallback {
            self.event_bus.emit_lossy(DocEvent::ClassificationFailed {
                document_id: request.document_id,
                reason: classification.reason.clone(),
                timestamp: Utc::now(),
            });
        }
        self.event_bus.emit_lossy(DocEvent::ClassificationCompleted {
            document_id: request.document_id,
            doc_type: classification.doc_type.as_str().to_string(),
            confidence: classification.confidence,
            band: classification.band.as_str().to_string(),
            tier: classification.spine_tier.as_str().to_string(),
            tax_year: classification.tax_year,
            timestamp: Utc::now(),
        });

        self.persist(&classification).await;

        classification
    }

    /// Run the tiers in order and pick the winner
    async fn select_tier(
        &self,
        doc: &NormalizedDocument,
        external: Option<&ExternalSignal>,
    ) -> TierSelection {
        let tier1 = self.tier1.classify(doc);

        // A usable external signal: confident enough and mappable into the
        // fine-grained taxonomy.
        let mapped_external = external
            .filter(|signal| signal.confidence >= EXTERNAL_SIGNAL_MIN_CONFIDENCE)
            .and_then(|signal| map_external_label(&signal.label).map(|doc_type| (signal, doc_type)));

        if tier1.matched {
            return self.tier1_selection(doc, tier1, mapped_external);
        }

        if let Some((signal, doc_type)) = mapped_external {
            debug!(
                "No anchor match for {}; adopting external label '{}' as {}",
                doc.document_id,
                signal.label,
                doc_type.as_str()
            );
            return TierSelection {
                tier: SpineTier::Tier1Anchor,
                doc_type,
                raw_confidence: signal
                    .confidence
                    .clamp(ADOPTED_CONFIDENCE_MIN, ADOPTED_CONFIDENCE_MAX),
                entity_type: return_entity_for(doc_type),
                evidence: vec![external_evidence(signal)],
                reason: format!(
                    "adopted {} label '{}'",
                    signal.processor_type, signal.label
                ),
                tax_year_hint: None,
                confusion_candidates: Vec::new(),
            };
        }

        let tier2 = self.tier2.classify(doc);
        if matches!(gate::evaluate(&tier1, &tier2), GateDecision::AcceptTier2) {
            let rule_id = primary_rule_id(&tier2);
            // doc_type is Some by the matched contract
            let doc_type = tier2.doc_type.unwrap_or(DocType::Other);
            return TierSelection {
                tier: SpineTier::Tier2Structural,
                doc_type,
                raw_confidence: tier2.confidence,
                entity_type: tier2.entity_type,
                evidence: tier2.evidence,
                reason: format!("structural rule {}", rule_id),
                tax_year_hint: None,
                confusion_candidates: Vec::new(),
            };
        }

        let escalation = self.tier3.classify(doc).await;
        if escalation.matched {
            return TierSelection {
                tier: SpineTier::Tier3Llm,
                doc_type: escalation.doc_type,
                raw_confidence: escalation.confidence,
                entity_type: escalation.entity_type,
                evidence: escalation.evidence,
                reason: escalation.reason,
                tax_year_hint: escalation.tax_year,
                confusion_candidates: Vec::new(),
            };
        }

        TierSelection {
            tier: SpineTier::Fallback,
            doc_type: DocType::Other,
            raw_confidence: FALLBACK_CONFIDENCE,
            entity_type: None,
            evidence: escalation.evidence,
            reason: format!("all tiers exhausted: {}", escalation.reason),
            tax_year_hint: None,
            confusion_candidates: Vec::new(),
        }
    }

    /// Finalize a Tier-1 match, cross-validating against the external signal
    fn tier1_selection(
        &self,
        doc: &NormalizedDocument,
        tier1: MatchOutcome,
        mapped_external: Option<(&ExternalSignal, DocType)>,
    ) -> TierSelection {
        let rule_id = primary_rule_id(&tier1);
        let doc_type = tier1.doc_type.unwrap_or(DocType::Other);
        let mut evidence = tier1.evidence;
        let mut confusion_candidates = Vec::new();

        if let Some((signal, external_type)) = mapped_external {
            if external_type == doc_type {
                evidence.push(external_evidence(signal));
            } else {
                debug!(
                    "External label '{}' ({}) disagrees with anchor rule {} on {}; keeping the anchor",
                    signal.label,
                    external_type.as_str(),
                    rule_id,
                    doc.document_id
                );
                confusion_candidates.push(external_type.as_str().to_string());
            }
        }

        TierSelection {
            tier: SpineTier::Tier1Anchor,
            doc_type,
            raw_confidence: tier1.confidence,
            entity_type: tier1.entity_type,
            evidence,
            reason: format!("anchor rule {}", rule_id),
            tax_year_hint: None,
            confusion_candidates,
        }
    }

    /// Best-effort persistence: history row plus the document stamp
    async fn persist(&self, classification: &SpineClassification) {
        if let Err(e) = db::spine_results::save_spine_result(&self.db, classification).await {
            warn!(
                "Failed to persist spine result for {}: {}",
                classification.document_id, e
            );
        }
        if let Err(e) = db::documents::stamp_spine_result(
            &self.db,
            classification.document_id,
            classification.doc_type.as_str(),
            classification.confidence,
            classification.tax_year,
        )
        .await
        {
            warn!(
                "Failed to stamp spine result onto document {}: {}",
                classification.document_id, e
            );
        }
    }
}

/// Map an upstream processor label into the fine-grained taxonomy
///
/// Exact serialized names parse directly; everything else goes through a
/// squashed substring scan. Scan order matters: K-1 labels usually name the
/// parent form, and 1120-S contains 1120.
pub fn map_external_label(label: &str) -> Option<DocType> {
    let canonical = label.trim().to_uppercase().replace([' ', '-'], "_");
    if let Some(doc_type) = DocType::parse(&canonical) {
        return Some(doc_type);
    }

    let squashed: String = canonical
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if squashed.is_empty() {
        return None;
    }

    if squashed.contains("K1") {
        Some(DocType::ScheduleK1)
    } else if squashed.contains("W2") {
        Some(DocType::W2)
    } else if squashed.contains("1099") {
        Some(DocType::Form1099)
    } else if squashed.contains("1120S") {
        Some(DocType::IrsSCorp)
    } else if squashed.contains("1120") {
        Some(DocType::IrsCorp)
    } else if squashed.contains("1040") {
        Some(DocType::IrsPersonal)
    } else if squashed.contains("1065") {
        Some(DocType::IrsPartnership)
    } else {
        None
    }
}

fn external_evidence(signal: &ExternalSignal) -> EvidenceItem {
    EvidenceItem {
        kind: EvidenceKind::ExternalSignal,
        rule_id: None,
        matched_text: signal.label.clone(),
        confidence: signal.confidence,
    }
}

/// Entity type implied by a return-level document type
fn return_entity_for(doc_type: DocType) -> Option<EntityType> {
    match doc_type {
        DocType::IrsPersonal => Some(EntityType::Individual),
        DocType::IrsPartnership => Some(EntityType::Partnership),
        DocType::IrsCorp => Some(EntityType::Corporation),
        DocType::IrsSCorp => Some(EntityType::SCorporation),
        _ => None,
    }
}

fn primary_rule_id(outcome: &MatchOutcome) -> String {
    outcome
        .evidence
        .iter()
        .find_map(|e| e.rule_id.clone())
        .unwrap_or_else(|| "unnamed".to_string())
}
