// Spine: Shared Types and Data Contracts
//
// This module defines the explicit data contracts between the tiers of the
// classification spine. Each type represents a well-defined interface between
// independent modules: normalizer -> matchers -> gate -> escalator ->
// calibrator -> orchestrator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version stamped onto every persisted spine result
pub const SPINE_SCHEMA_VERSION: u32 = 2;

/// Retired label for trailing-twelve-month operating statements.
///
/// The taxonomy folds these into `INCOME_STATEMENT`. No rule may map to this
/// label, and model output carrying it is rewritten before it reaches callers.
pub const LEGACY_TRAILING_TWELVE: &str = "T12";

// ============================================================================
// Document Taxonomy
// ============================================================================

/// Fine-grained document type produced by the spine
///
/// Contract: closed set. Persisted as the SCREAMING_SNAKE_CASE string form;
/// anything outside the set collapses to `Other` at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    /// Form 1040 / 1040-SR individual return
    IrsPersonal,
    /// Form 1065 partnership return
    IrsPartnership,
    /// Form 1120 C-corporation return
    IrsCorp,
    /// Form 1120-S S-corporation return
    IrsSCorp,
    /// Schedule K-1 (Form 1065 / 1120-S)
    ScheduleK1,
    W2,
    /// The rename rule does not split before digits, so spell this one out
    #[serde(rename = "FORM_1099")]
    Form1099,
    /// Operating statement: P&L, multi-year, monthly, or trailing-twelve
    IncomeStatement,
    BalanceSheet,
    RentRoll,
    DebtSchedule,
    ArAging,
    BankStatement,
    VoidedCheck,
    PersonalFinancialStatement,
    Other,
}

impl DocType {
    /// Serialized string form (matches serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::IrsPersonal => "IRS_PERSONAL",
            DocType::IrsPartnership => "IRS_PARTNERSHIP",
            DocType::IrsCorp => "IRS_CORP",
            DocType::IrsSCorp => "IRS_S_CORP",
            DocType::ScheduleK1 => "SCHEDULE_K1",
            DocType::W2 => "W2",
            DocType::Form1099 => "FORM_1099",
            DocType::IncomeStatement => "INCOME_STATEMENT",
            DocType::BalanceSheet => "BALANCE_SHEET",
            DocType::RentRoll => "RENT_ROLL",
            DocType::DebtSchedule => "DEBT_SCHEDULE",
            DocType::ArAging => "AR_AGING",
            DocType::BankStatement => "BANK_STATEMENT",
            DocType::VoidedCheck => "VOIDED_CHECK",
            DocType::PersonalFinancialStatement => "PERSONAL_FINANCIAL_STATEMENT",
            DocType::Other => "OTHER",
        }
    }

    /// Parse the serialized string form; unknown labels yield None
    pub fn parse(s: &str) -> Option<DocType> {
        match s {
            "IRS_PERSONAL" => Some(DocType::IrsPersonal),
            "IRS_PARTNERSHIP" => Some(DocType::IrsPartnership),
            "IRS_CORP" => Some(DocType::IrsCorp),
            "IRS_S_CORP" => Some(DocType::IrsSCorp),
            "SCHEDULE_K1" => Some(DocType::ScheduleK1),
            "W2" => Some(DocType::W2),
            "FORM_1099" => Some(DocType::Form1099),
            "INCOME_STATEMENT" => Some(DocType::IncomeStatement),
            "BALANCE_SHEET" => Some(DocType::BalanceSheet),
            "RENT_ROLL" => Some(DocType::RentRoll),
            "DEBT_SCHEDULE" => Some(DocType::DebtSchedule),
            "AR_AGING" => Some(DocType::ArAging),
            "BANK_STATEMENT" => Some(DocType::BankStatement),
            "VOIDED_CHECK" => Some(DocType::VoidedCheck),
            "PERSONAL_FINANCIAL_STATEMENT" => Some(DocType::PersonalFinancialStatement),
            "OTHER" => Some(DocType::Other),
            _ => None,
        }
    }

    /// All variants, for exhaustive property tests
    pub fn all() -> &'static [DocType] {
        &[
            DocType::IrsPersonal,
            DocType::IrsPartnership,
            DocType::IrsCorp,
            DocType::IrsSCorp,
            DocType::ScheduleK1,
            DocType::W2,
            DocType::Form1099,
            DocType::IncomeStatement,
            DocType::BalanceSheet,
            DocType::RentRoll,
            DocType::DebtSchedule,
            DocType::ArAging,
            DocType::BankStatement,
            DocType::VoidedCheck,
            DocType::PersonalFinancialStatement,
            DocType::Other,
        ]
    }

    /// Whether this type is an IRS tax filing (return or supporting form)
    pub fn is_tax_form(&self) -> bool {
        matches!(
            self,
            DocType::IrsPersonal
                | DocType::IrsPartnership
                | DocType::IrsCorp
                | DocType::IrsSCorp
                | DocType::ScheduleK1
                | DocType::W2
                | DocType::Form1099
        )
    }
}

/// Borrower entity type hinted by a rule or the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Individual,
    Partnership,
    Corporation,
    SCorporation,
}

impl EntityType {
    /// Serialized string form (matches serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Individual => "INDIVIDUAL",
            EntityType::Partnership => "PARTNERSHIP",
            EntityType::Corporation => "CORPORATION",
            EntityType::SCorporation => "S_CORPORATION",
        }
    }
}

// ============================================================================
// Normalized Input
// ============================================================================

/// Normalized document text, produced once per classification run
///
/// Contract: immutable after construction; owned by a single orchestrator
/// call. All downstream tiers read from this shape and never from raw input.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    /// Source document UUID
    pub document_id: Uuid,
    /// Original filename (display + weak filename signals)
    pub filename: String,
    /// MIME type when the upload pipeline supplied one
    pub mime_type: Option<String>,
    /// Estimated page count (form feeds > page markers > length heuristic)
    pub page_count: u32,
    /// First-page window (form-feed boundary preferred)
    pub first_page_text: String,
    /// First-two-pages window for structural matching and escalation
    pub first_two_pages_text: String,
    /// Full OCR text
    pub full_text: String,
    /// Distinct 20xx years found anywhere in the text, descending
    pub detected_years: Vec<i32>,
    /// Whether the first two pages look like tabular data
    pub has_table_like_structure: bool,
}

/// Optional label from an upstream OCR processor's own classifier
///
/// Cross-validated against Tier-1: the deterministic rules win disagreements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSignal {
    /// Processor-reported label (e.g. "1040", "w2")
    pub label: String,
    /// Processor-reported confidence [0.0, 1.0]
    pub confidence: f64,
    /// Which processor produced the label (provenance only)
    pub processor_type: String,
}

// ============================================================================
// Tier Outputs: Match Results with Evidence
// ============================================================================

/// What kind of signal produced an evidence item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// IRS form number anchored in the full text
    FormNumber,
    /// Document-type header phrase in the first two pages
    StructuralHeader,
    /// Corroborating keyword required by a structural rule
    Keyword,
    /// Table-shaped layout signal
    TableShape,
    /// Upstream processor label adopted or corroborating
    ExternalSignal,
    /// Generative model judgment
    ModelJudgment,
}

/// Single piece of match evidence
///
/// Contract: every matched tier result carries at least one item; an
/// unmatched result carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    /// Rule that produced this item, when rule-driven
    pub rule_id: Option<String>,
    /// Text excerpt that matched
    pub matched_text: String,
    /// Contribution confidence [0.0, 1.0]
    pub confidence: f64,
}

/// Outcome of a deterministic matcher tier (Tier 1 or Tier 2)
///
/// Tier 1 confidences land in [0.90, 0.99]; Tier 2 in [0.75, 0.89].
/// `confidence` is 0.0 when unmatched.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matched: bool,
    pub doc_type: Option<DocType>,
    pub confidence: f64,
    pub entity_type: Option<EntityType>,
    pub evidence: Vec<EvidenceItem>,
}

impl MatchOutcome {
    /// The no-match outcome (empty evidence by contract)
    pub fn none() -> Self {
        Self {
            matched: false,
            doc_type: None,
            confidence: 0.0,
            entity_type: None,
            evidence: Vec::new(),
        }
    }
}

/// Outcome of the Tier-3 model escalation
///
/// Contract: the escalator never errors; failures come back as
/// `matched: false` with `doc_type: Other`, confidence 0.1, and the failure
/// reason recorded here.
#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub matched: bool,
    pub doc_type: DocType,
    pub confidence: f64,
    pub tax_year: Option<i32>,
    pub entity_type: Option<EntityType>,
    pub evidence: Vec<EvidenceItem>,
    /// Model reasoning on success, failure description otherwise
    pub reason: String,
}

// ============================================================================
// Pipeline Stage Labels
// ============================================================================

/// Which stage of the spine produced the final classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpineTier {
    Tier1Anchor,
    Tier2Structural,
    Tier3Llm,
    Fallback,
}

impl SpineTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpineTier::Tier1Anchor => "tier1_anchor",
            SpineTier::Tier2Structural => "tier2_structural",
            SpineTier::Tier3Llm => "tier3_llm",
            SpineTier::Fallback => "fallback",
        }
    }

    pub fn parse(s: &str) -> Option<SpineTier> {
        match s {
            "tier1_anchor" => Some(SpineTier::Tier1Anchor),
            "tier2_structural" => Some(SpineTier::Tier2Structural),
            "tier3_llm" => Some(SpineTier::Tier3Llm),
            "fallback" => Some(SpineTier::Fallback),
            _ => None,
        }
    }
}

/// Confidence band derived from calibrated confidence
///
/// HIGH >= 0.88, MEDIUM >= 0.75, LOW below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::High => "HIGH",
            ConfidenceBand::Medium => "MEDIUM",
            ConfidenceBand::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<ConfidenceBand> {
        match s {
            "HIGH" => Some(ConfidenceBand::High),
            "MEDIUM" => Some(ConfidenceBand::Medium),
            "LOW" => Some(ConfidenceBand::Low),
            _ => None,
        }
    }
}

// ============================================================================
// Calibration Types
// ============================================================================

/// Penalty category applied by the calibrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyCode {
    /// Plausible competing types were in play
    Ambiguity,
    /// No year found anywhere in the document
    MissingYear,
    /// Years present but none could be resolved as the tax year
    UnresolvedYear,
    /// More than one distinct IRS form number in the text
    MultipleForms,
    /// Too little text to trust pattern evidence
    LowTextDensity,
}

/// One applied penalty with its audit reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyRecord {
    pub code: PenaltyCode,
    /// Amount subtracted (positive number)
    pub amount: f64,
    pub reason: String,
}

/// Calibrated confidence with full penalty audit trail
#[derive(Debug, Clone)]
pub struct CalibratedConfidence {
    /// Final confidence, clamped to [0.35, 0.97]
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub penalties: Vec<PenaltyRecord>,
}

// ============================================================================
// Final Classification (Spine Output)
// ============================================================================

/// Final per-document classification produced by the spine
///
/// Persisted append-only to `spine_results`; the newest row per document is
/// the current spine opinion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpineClassification {
    pub document_id: Uuid,
    pub doc_type: DocType,
    /// Calibrated confidence [0.35, 0.97]
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub spine_tier: SpineTier,
    pub tax_year: Option<i32>,
    pub entity_type: Option<EntityType>,
    pub evidence: Vec<EvidenceItem>,
    pub penalties: Vec<PenaltyRecord>,
    /// Human-readable explanation of how the decision was reached
    pub reason: String,
    pub schema_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_round_trip() {
        for dt in DocType::all() {
            assert_eq!(DocType::parse(dt.as_str()), Some(*dt));
        }
    }

    #[test]
    fn test_doc_type_serde_matches_as_str() {
        for dt in DocType::all() {
            let json = serde_json::to_string(dt).unwrap();
            assert_eq!(json, format!("\"{}\"", dt.as_str()));
        }
    }

    /// The retired trailing-twelve label must not round-trip into the taxonomy
    #[test]
    fn test_legacy_trailing_twelve_not_parseable() {
        assert_eq!(DocType::parse(LEGACY_TRAILING_TWELVE), None);
    }

    #[test]
    fn test_tier_and_band_round_trip() {
        for tier in [
            SpineTier::Tier1Anchor,
            SpineTier::Tier2Structural,
            SpineTier::Tier3Llm,
            SpineTier::Fallback,
        ] {
            assert_eq!(SpineTier::parse(tier.as_str()), Some(tier));
        }
        for band in [
            ConfidenceBand::High,
            ConfidenceBand::Medium,
            ConfidenceBand::Low,
        ] {
            assert_eq!(ConfidenceBand::parse(band.as_str()), Some(band));
        }
    }

    #[test]
    fn test_no_match_outcome_is_empty() {
        let outcome = MatchOutcome::none();
        assert!(!outcome.matched);
        assert!(outcome.doc_type.is_none());
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.evidence.is_empty());
    }

    #[test]
    fn test_tax_form_predicate() {
        assert!(DocType::IrsPersonal.is_tax_form());
        assert!(DocType::ScheduleK1.is_tax_form());
        assert!(!DocType::RentRoll.is_tax_form());
        assert!(!DocType::Other.is_tax_form());
    }
}
