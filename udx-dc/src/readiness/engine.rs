// Readiness Fact-Matching Engine
//
// Concept: compares a deal's required document facts against its present,
// classified documents. Pure over explicit inputs; the caller resolves
// effective types first. Documents awaiting review are counted but never
// matched, so an unreviewed pile can hold a deal back but cannot complete
// it. Near-misses are diagnostics only and never count toward readiness.

use serde::Serialize;
use std::collections::BTreeSet;

use super::requirements::ScenarioRequirements;

/// Whether W-2 / 1099 / K-1 forms satisfy a tax-return requirement
///
/// Strict policy: supporting forms fold to no category, and a return
/// requirement is met only by the return itself. This constant is the sole
/// source of truth for that behavior.
pub const SUPPORTING_FORMS_SATISFY_RETURNS: bool = false;

/// Requirement category a document can satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactCategory {
    BusinessTaxReturn,
    PersonalTaxReturn,
    FinancialStatements,
    PersonalFinancialStatement,
}

impl FactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::BusinessTaxReturn => "BUSINESS_TAX_RETURN",
            FactCategory::PersonalTaxReturn => "PERSONAL_TAX_RETURN",
            FactCategory::FinancialStatements => "FINANCIAL_STATEMENTS",
            FactCategory::PersonalFinancialStatement => "PERSONAL_FINANCIAL_STATEMENT",
        }
    }
}

/// One required fact: a category, with a tax year for return requirements
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RequiredFact {
    pub category: FactCategory,
    pub tax_year: Option<i32>,
}

/// A required year with no exact match, but a same-category document nearby
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearMiss {
    pub category: FactCategory,
    pub required_year: i32,
    pub closest_present_year: i32,
}

/// One classified document as the engine sees it
///
/// `effective_doc_type` and `effective_tax_year` come from the effective
/// classification resolver; `needs_review` from the gatekeeper stamp.
#[derive(Debug, Clone)]
pub struct ClassifiedDocument {
    pub effective_doc_type: String,
    pub effective_tax_year: Option<i32>,
    pub needs_review: bool,
}

/// The completeness verdict for one deal
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResult {
    pub required: Vec<RequiredFact>,
    /// Required facts that are satisfied
    pub present: Vec<RequiredFact>,
    /// Required facts that are not
    pub missing: Vec<RequiredFact>,
    pub near_misses: Vec<NearMiss>,
    pub needs_review_count: usize,
    /// Satisfied share of required facts, 100 when nothing is required
    pub readiness_pct: f64,
    /// Complete and nothing awaiting review
    pub ready: bool,
}

/// Match required facts against classified documents
pub fn compute_readiness(
    requirements: &ScenarioRequirements,
    documents: &[ClassifiedDocument],
) -> ReadinessResult {
    let needs_review_count = documents.iter().filter(|d| d.needs_review).count();

    // Year sets per category, deduplicated; review-flagged documents and
    // return documents without a year contribute nothing
    let mut business_years = BTreeSet::new();
    let mut personal_years = BTreeSet::new();
    let mut has_financial_statements = false;
    let mut has_pfs = false;

    for doc in documents.iter().filter(|d| !d.needs_review) {
        match categorize(&doc.effective_doc_type) {
            Some(FactCategory::BusinessTaxReturn) => {
                if let Some(year) = doc.effective_tax_year {
                    business_years.insert(year);
                }
            }
            Some(FactCategory::PersonalTaxReturn) => {
                if let Some(year) = doc.effective_tax_year {
                    personal_years.insert(year);
                }
            }
            Some(FactCategory::FinancialStatements) => has_financial_statements = true,
            Some(FactCategory::PersonalFinancialStatement) => has_pfs = true,
            None => {}
        }
    }

    let required = required_facts(requirements);
    let mut present = Vec::new();
    let mut missing = Vec::new();
    let mut near_misses = Vec::new();

    for fact in &required {
        let satisfied = match (fact.category, fact.tax_year) {
            (FactCategory::BusinessTaxReturn, Some(year)) => business_years.contains(&year),
            (FactCategory::PersonalTaxReturn, Some(year)) => personal_years.contains(&year),
            (FactCategory::FinancialStatements, _) => has_financial_statements,
            (FactCategory::PersonalFinancialStatement, _) => has_pfs,
            // Year requirements always carry a year; see required_facts
            (_, None) => false,
        };

        if satisfied {
            present.push(*fact);
            continue;
        }
        missing.push(*fact);

        if let Some(required_year) = fact.tax_year {
            let candidates = match fact.category {
                FactCategory::BusinessTaxReturn => &business_years,
                FactCategory::PersonalTaxReturn => &personal_years,
                _ => continue,
            };
            if let Some(closest) = closest_year(candidates, required_year) {
                near_misses.push(NearMiss {
                    category: fact.category,
                    required_year,
                    closest_present_year: closest,
                });
            }
        }
    }

    let readiness_pct = if required.is_empty() {
        100.0
    } else {
        (present.len() as f64 / required.len() as f64) * 100.0
    };
    let ready = missing.is_empty() && needs_review_count == 0;

    ReadinessResult {
        required,
        present,
        missing,
        near_misses,
        needs_review_count,
        readiness_pct,
        ready,
    }
}

/// Expand requirements into individual facts, most recent years first
fn required_facts(requirements: &ScenarioRequirements) -> Vec<RequiredFact> {
    let mut facts = Vec::new();
    for &year in &requirements.business_tax_years {
        facts.push(RequiredFact {
            category: FactCategory::BusinessTaxReturn,
            tax_year: Some(year),
        });
    }
    for &year in &requirements.personal_tax_years {
        facts.push(RequiredFact {
            category: FactCategory::PersonalTaxReturn,
            tax_year: Some(year),
        });
    }
    if requirements.requires_financial_statements {
        facts.push(RequiredFact {
            category: FactCategory::FinancialStatements,
            tax_year: None,
        });
    }
    if requirements.requires_pfs {
        facts.push(RequiredFact {
            category: FactCategory::PersonalFinancialStatement,
            tax_year: None,
        });
    }
    facts
}

/// Map an effective document type onto the category it can satisfy
///
/// Handles both the fine-grained spine vocabulary and the coarse labels an
/// upstream canonical field may carry. Supporting tax forms are governed by
/// `SUPPORTING_FORMS_SATISFY_RETURNS`.
fn categorize(effective_doc_type: &str) -> Option<FactCategory> {
    match effective_doc_type {
        "IRS_PARTNERSHIP" | "IRS_CORP" | "IRS_S_CORP" | "BUSINESS_TAX_RETURN" => {
            Some(FactCategory::BusinessTaxReturn)
        }
        "IRS_PERSONAL" | "PERSONAL_TAX_RETURN" => Some(FactCategory::PersonalTaxReturn),
        "W2" | "FORM_1099" | "SCHEDULE_K1" => {
            SUPPORTING_FORMS_SATISFY_RETURNS.then_some(FactCategory::PersonalTaxReturn)
        }
        "INCOME_STATEMENT" | "BALANCE_SHEET" | "FINANCIAL_STATEMENT" => {
            Some(FactCategory::FinancialStatements)
        }
        "PERSONAL_FINANCIAL_STATEMENT" => Some(FactCategory::PersonalFinancialStatement),
        _ => None,
    }
}

/// The present year closest to the target; ties prefer the more recent year
fn closest_year(present: &BTreeSet<i32>, target: i32) -> Option<i32> {
    present
        .iter()
        .copied()
        .min_by_key(|&year| ((year - target).abs(), -year))
}
