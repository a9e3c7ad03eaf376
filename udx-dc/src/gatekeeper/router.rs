// Gatekeeper Router
//
// Concept: routing is a total, deterministic function of the classification
// alone. It holds no state, performs no I/O, and never consults the cache,
// which is what lets routes be recomputed on every request: a change to the
// rules below applies retroactively to every cached classification.
//
// Rule order (first match wins):
//   1. UNKNOWN type                       -> NEEDS_REVIEW
//   2. confidence below the floor         -> NEEDS_REVIEW
//   3. tax-return type without a year     -> NEEDS_REVIEW
//   4. core extraction set                -> GOOGLE_DOC_AI_CORE
//   5. standard-eligible allowlist        -> STANDARD
//   6. anything else                      -> NEEDS_REVIEW

use super::types::{CoarseDocType, GatekeeperClassification, Route};

/// Minimum confidence for any automatic route (inclusive)
pub const MIN_ROUTABLE_CONFIDENCE: f64 = 0.80;

/// Types that go to the structured tax-form extraction pipeline
const CORE_EXTRACTION_TYPES: &[CoarseDocType] = &[
    CoarseDocType::PersonalTaxReturn,
    CoarseDocType::BusinessTaxReturn,
    CoarseDocType::W2,
    CoarseDocType::Form1099,
    CoarseDocType::ScheduleK1,
];

/// Types eligible for the generic extraction pipeline
///
/// An explicit allowlist rather than a catch-all: a type added to the
/// taxonomy routes to review until someone decides it belongs here.
const STANDARD_ELIGIBLE_TYPES: &[CoarseDocType] = &[
    CoarseDocType::FinancialStatement,
    CoarseDocType::BankStatement,
    CoarseDocType::PersonalFinancialStatement,
    CoarseDocType::RentRoll,
];

/// Derive the extraction route for a classification
pub fn route(doc_type: CoarseDocType, confidence: f64, tax_year: Option<i32>) -> Route {
    if doc_type == CoarseDocType::Unknown {
        return Route::NeedsReview;
    }
    if confidence < MIN_ROUTABLE_CONFIDENCE {
        return Route::NeedsReview;
    }
    // A tax return without a year cannot be slotted into a checklist,
    // so extracting it automatically would only defer the human step.
    if doc_type.is_tax_return() && tax_year.is_none() {
        return Route::NeedsReview;
    }
    if CORE_EXTRACTION_TYPES.contains(&doc_type) {
        return Route::GoogleDocAiCore;
    }
    if STANDARD_ELIGIBLE_TYPES.contains(&doc_type) {
        return Route::Standard;
    }
    Route::NeedsReview
}

/// Route a full classification record
pub fn route_classification(classification: &GatekeeperClassification) -> Route {
    route(
        classification.doc_type,
        classification.confidence,
        classification.tax_year,
    )
}
