// Spine Tier 3: Generative Escalation
//
// Concept: Last resort after both deterministic tiers miss. Sends the first
// two pages plus the domain prompt to the generative model and expects
// strict JSON back. Contractually infallible: every failure mode (network,
// empty output, malformed JSON) collapses into a low-confidence OTHER
// outcome carrying the failure reason.

use crate::llm::client::LlmClient;
use crate::llm::examples::ExampleCorpus;
use crate::llm::prompts;
use crate::spine::types::{
    DocType, EntityType, EscalationOutcome, EvidenceItem, EvidenceKind, NormalizedDocument,
    LEGACY_TRAILING_TWELVE,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Model output below this confidence counts as no match
pub const TIER3_MATCH_THRESHOLD: f64 = 0.40;

/// Confidence reported on the failure path
const FAILURE_CONFIDENCE: f64 = 0.1;

/// Strict JSON shape requested from the model
#[derive(Debug, Deserialize)]
struct Tier3Response {
    #[serde(default)]
    doc_type: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    tax_year: Option<i32>,
    #[serde(default)]
    entity_type: Option<String>,
    #[serde(default)]
    reason: String,
}

/// Tier-3 escalator
pub struct Tier3Escalator {
    llm: Arc<LlmClient>,
    corpus: Arc<ExampleCorpus>,
}

impl Tier3Escalator {
    pub fn new(llm: Arc<LlmClient>, corpus: Arc<ExampleCorpus>) -> Self {
        Self { llm, corpus }
    }

    /// Escalate to the model; never returns an error
    pub async fn classify(&self, doc: &NormalizedDocument) -> EscalationOutcome {
        let prompt = prompts::spine_escalation_prompt(&self.corpus, &doc.first_two_pages_text);

        let raw = match self.llm.generate_json(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    document_id = %doc.document_id,
                    error = %e,
                    "Tier-3 model call failed"
                );
                return failure_outcome(format!("model call failed: {}", e));
            }
        };

        match parse_response(&raw) {
            Ok(response) => outcome_from_response(response),
            Err(e) => {
                warn!(
                    document_id = %doc.document_id,
                    error = %e,
                    "Tier-3 model response unusable"
                );
                failure_outcome(format!("unusable model response: {}", e))
            }
        }
    }
}

/// Parse model output, tolerating markdown fences around the JSON object
fn parse_response(raw: &str) -> Result<Tier3Response, String> {
    let json = crate::llm::extract_json_object(raw)
        .ok_or_else(|| "no JSON object in output".to_string())?;
    serde_json::from_str(json).map_err(|e| e.to_string())
}

/// Post-process a parsed response into the tier outcome
///
/// The banned legacy label rewrites to INCOME_STATEMENT; unknown labels
/// collapse to OTHER; confidence is clamped to [0, 1] before the match
/// threshold applies.
fn outcome_from_response(response: Tier3Response) -> EscalationOutcome {
    let confidence = response.confidence.clamp(0.0, 1.0);
    let label = response.doc_type.trim().to_uppercase();

    let doc_type = if label == LEGACY_TRAILING_TWELVE {
        DocType::IncomeStatement
    } else {
        DocType::parse(&label).unwrap_or(DocType::Other)
    };

    let evidence = vec![EvidenceItem {
        kind: EvidenceKind::ModelJudgment,
        rule_id: None,
        matched_text: label,
        confidence,
    }];

    EscalationOutcome {
        matched: confidence >= TIER3_MATCH_THRESHOLD,
        doc_type,
        confidence,
        tax_year: response.tax_year,
        entity_type: response.entity_type.as_deref().and_then(parse_entity),
        evidence,
        reason: if response.reason.trim().is_empty() {
            "model classification".to_string()
        } else {
            response.reason
        },
    }
}

fn parse_entity(raw: &str) -> Option<EntityType> {
    match raw.trim().to_uppercase().as_str() {
        "INDIVIDUAL" => Some(EntityType::Individual),
        "PARTNERSHIP" => Some(EntityType::Partnership),
        "CORPORATION" => Some(EntityType::Corporation),
        "S_CORPORATION" | "S-CORPORATION" | "SCORPORATION" => Some(EntityType::SCorporation),
        _ => None,
    }
}

/// The infallible failure shape
fn failure_outcome(reason: String) -> EscalationOutcome {
    EscalationOutcome {
        matched: false,
        doc_type: DocType::Other,
        confidence: FAILURE_CONFIDENCE,
        tax_year: None,
        entity_type: None,
        evidence: Vec::new(),
        reason,
    }
}
