// Gatekeeper: Coarse Taxonomy and Routing Types
//
// Concept: The gatekeeper is a second, independently-maintained classifier
// that answers a cheaper question than the spine: "which extraction pipeline
// should see this document?" Its taxonomy is deliberately coarse (eleven
// values, tax returns collapsed to personal/business) and its output is a
// routing signal, never a substitute for the spine's fine-grained type.

use serde::{Deserialize, Serialize};

// ============================================================================
// Coarse Taxonomy
// ============================================================================

/// Coarse document type produced by the gatekeeper
///
/// Contract: closed set. Anything the model returns outside this set
/// deserializes as `Unknown`, which always routes to review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoarseDocType {
    /// Form 1040 family
    PersonalTaxReturn,
    /// Form 1065 / 1120 / 1120-S
    BusinessTaxReturn,
    W2,
    /// The rename rule does not split before digits, so spell this one out
    #[serde(rename = "FORM_1099")]
    Form1099,
    ScheduleK1,
    /// Balance sheet, income statement, or combined financials
    FinancialStatement,
    BankStatement,
    PersonalFinancialStatement,
    RentRoll,
    Other,
    /// Model could not classify, or the path failed closed
    #[serde(other)]
    Unknown,
}

impl CoarseDocType {
    /// Serialized string form (matches serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            CoarseDocType::PersonalTaxReturn => "PERSONAL_TAX_RETURN",
            CoarseDocType::BusinessTaxReturn => "BUSINESS_TAX_RETURN",
            CoarseDocType::W2 => "W2",
            CoarseDocType::Form1099 => "FORM_1099",
            CoarseDocType::ScheduleK1 => "SCHEDULE_K1",
            CoarseDocType::FinancialStatement => "FINANCIAL_STATEMENT",
            CoarseDocType::BankStatement => "BANK_STATEMENT",
            CoarseDocType::PersonalFinancialStatement => "PERSONAL_FINANCIAL_STATEMENT",
            CoarseDocType::RentRoll => "RENT_ROLL",
            CoarseDocType::Other => "OTHER",
            CoarseDocType::Unknown => "UNKNOWN",
        }
    }

    /// Parse the serialized string form; anything unrecognized is `Unknown`
    ///
    /// Unlike the spine taxonomy this parser is total: the gatekeeper
    /// fails closed, so an unexpected label must land on the review path
    /// rather than surface as an error.
    pub fn parse(s: &str) -> CoarseDocType {
        match s {
            "PERSONAL_TAX_RETURN" => CoarseDocType::PersonalTaxReturn,
            "BUSINESS_TAX_RETURN" => CoarseDocType::BusinessTaxReturn,
            "W2" | "W-2" => CoarseDocType::W2,
            "FORM_1099" | "1099" => CoarseDocType::Form1099,
            "SCHEDULE_K1" | "K1" | "K-1" => CoarseDocType::ScheduleK1,
            "FINANCIAL_STATEMENT" => CoarseDocType::FinancialStatement,
            "BANK_STATEMENT" => CoarseDocType::BankStatement,
            "PERSONAL_FINANCIAL_STATEMENT" => CoarseDocType::PersonalFinancialStatement,
            "RENT_ROLL" => CoarseDocType::RentRoll,
            "OTHER" => CoarseDocType::Other,
            _ => CoarseDocType::Unknown,
        }
    }

    /// All variants, for exhaustive routing tests
    pub fn all() -> &'static [CoarseDocType] {
        &[
            CoarseDocType::PersonalTaxReturn,
            CoarseDocType::BusinessTaxReturn,
            CoarseDocType::W2,
            CoarseDocType::Form1099,
            CoarseDocType::ScheduleK1,
            CoarseDocType::FinancialStatement,
            CoarseDocType::BankStatement,
            CoarseDocType::PersonalFinancialStatement,
            CoarseDocType::RentRoll,
            CoarseDocType::Other,
            CoarseDocType::Unknown,
        ]
    }

    /// True for the two tax-return types that require a year before routing
    pub fn is_tax_return(&self) -> bool {
        matches!(
            self,
            CoarseDocType::PersonalTaxReturn | CoarseDocType::BusinessTaxReturn
        )
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Extraction route decided by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    /// Generic extraction pipeline
    #[serde(rename = "STANDARD")]
    Standard,
    /// Structured tax-form extraction pipeline
    #[serde(rename = "GOOGLE_DOC_AI_CORE")]
    GoogleDocAiCore,
    /// Human review queue
    #[serde(rename = "NEEDS_REVIEW")]
    NeedsReview,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Standard => "STANDARD",
            Route::GoogleDocAiCore => "GOOGLE_DOC_AI_CORE",
            Route::NeedsReview => "NEEDS_REVIEW",
        }
    }
}

// ============================================================================
// Classification Output
// ============================================================================

/// Signals the model extracted alongside the type decision
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedSignals {
    /// IRS form numbers observed in the document (e.g. "1040", "W-2")
    #[serde(default)]
    pub form_numbers: Vec<String>,
    /// An EIN-shaped identifier was present
    #[serde(default)]
    pub has_ein: bool,
    /// An SSN-shaped identifier was present
    #[serde(default)]
    pub has_ssn: bool,
}

/// Raw gatekeeper classification, as cached
///
/// This is the cacheable unit: it depends only on document content and
/// prompt version, never on routing rules. Routes are recomputed from the
/// current rules on every request so a rule change applies retroactively
/// to cached classifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperClassification {
    pub doc_type: CoarseDocType,
    /// Model-reported confidence in [0.0, 1.0]
    pub confidence: f64,
    /// Tax year if the model found one
    pub tax_year: Option<i32>,
    /// Model's stated reasons for the decision
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub signals: DetectedSignals,
}

impl GatekeeperClassification {
    /// The fail-closed classification: unknown type, zero confidence
    pub fn failed(reason: impl Into<String>) -> Self {
        GatekeeperClassification {
            doc_type: CoarseDocType::Unknown,
            confidence: 0.0,
            tax_year: None,
            reasons: vec![reason.into()],
            signals: DetectedSignals::default(),
        }
    }
}

/// Full gatekeeper outcome: classification plus routing and provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperResult {
    pub classification: GatekeeperClassification,
    /// Route recomputed from current rules (never read from cache)
    pub route: Route,
    /// True whenever the route is the review queue
    pub needs_review: bool,
    /// No model call was made: the classification was reused from the
    /// tenant cache or from the document's stored stamp
    pub cache_hit: bool,
    /// Wall-clock time for this request
    pub latency_ms: u64,
    /// Model identifier that produced the classification
    pub model: String,
    pub prompt_version: String,
    /// Fingerprint of the prompt templates used
    pub prompt_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coarse_type_serde_matches_as_str() {
        for doc_type in CoarseDocType::all() {
            let json = serde_json::to_string(doc_type).unwrap();
            assert_eq!(json, format!("\"{}\"", doc_type.as_str()));
            let back: CoarseDocType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, *doc_type);
        }
    }

    #[test]
    fn test_parse_round_trips_all_variants() {
        for doc_type in CoarseDocType::all() {
            assert_eq!(CoarseDocType::parse(doc_type.as_str()), *doc_type);
        }
    }

    #[test]
    fn test_parse_is_total() {
        assert_eq!(CoarseDocType::parse("TAX_THING"), CoarseDocType::Unknown);
        assert_eq!(CoarseDocType::parse(""), CoarseDocType::Unknown);
        assert_eq!(CoarseDocType::parse("personal_tax_return"), CoarseDocType::Unknown);
    }

    #[test]
    fn test_deserialize_unrecognized_label_falls_to_unknown() {
        let parsed: CoarseDocType = serde_json::from_str("\"SOME_NEW_LABEL\"").unwrap();
        assert_eq!(parsed, CoarseDocType::Unknown);
    }

    #[test]
    fn test_parse_accepts_loose_form_spellings() {
        assert_eq!(CoarseDocType::parse("W-2"), CoarseDocType::W2);
        assert_eq!(CoarseDocType::parse("K-1"), CoarseDocType::ScheduleK1);
        assert_eq!(CoarseDocType::parse("1099"), CoarseDocType::Form1099);
    }

    #[test]
    fn test_tax_return_predicate() {
        assert!(CoarseDocType::PersonalTaxReturn.is_tax_return());
        assert!(CoarseDocType::BusinessTaxReturn.is_tax_return());
        assert!(!CoarseDocType::W2.is_tax_return());
        assert!(!CoarseDocType::Unknown.is_tax_return());
    }

    #[test]
    fn test_route_serialized_forms() {
        assert_eq!(
            serde_json::to_string(&Route::GoogleDocAiCore).unwrap(),
            "\"GOOGLE_DOC_AI_CORE\""
        );
        assert_eq!(serde_json::to_string(&Route::Standard).unwrap(), "\"STANDARD\"");
        assert_eq!(
            serde_json::to_string(&Route::NeedsReview).unwrap(),
            "\"NEEDS_REVIEW\""
        );
    }

    #[test]
    fn test_failed_classification_shape() {
        let failed = GatekeeperClassification::failed("model timeout");
        assert_eq!(failed.doc_type, CoarseDocType::Unknown);
        assert_eq!(failed.confidence, 0.0);
        assert_eq!(failed.tax_year, None);
        assert_eq!(failed.reasons, vec!["model timeout".to_string()]);
    }

    #[test]
    fn test_classification_deserializes_with_missing_optional_fields() {
        let json = r#"{"doc_type":"W2","confidence":0.91,"tax_year":2023}"#;
        let parsed: GatekeeperClassification = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.doc_type, CoarseDocType::W2);
        assert!(parsed.reasons.is_empty());
        assert!(parsed.signals.form_numbers.is_empty());
    }
}
