// Effective Classification Resolver
//
// Concept: one document accumulates classification signals from several
// writers: the upstream system (canonical fields), the spine (ai_* fields),
// the gatekeeper (gk_* fields), and humans (confirmed_* fields). This module
// is the single COALESCE that reconciles them. Every consumer that needs
// "the" type or year goes through `resolve`; nothing else may interpret the
// raw columns.
//
// The coarse gatekeeper type is deliberately excluded from type resolution.
// It is a routing signal over an 11-value taxonomy and would collide with the
// fine-grained types every other source speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::documents::DocumentRow;

/// Effective type when no source supplies one
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

/// Which source supplied the effective type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationSource {
    /// A human confirmed the classification
    Confirmed,
    /// Upstream canonical/document type
    Canonical,
    /// Wire-contract value; type resolution never produces it because the
    /// coarse gatekeeper type is excluded
    Gatekeeper,
    /// Spine classification
    Ai,
    Unknown,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Confirmed => "CONFIRMED",
            ClassificationSource::Canonical => "CANONICAL",
            ClassificationSource::Gatekeeper => "GATEKEEPER",
            ClassificationSource::Ai => "AI",
            ClassificationSource::Unknown => "UNKNOWN",
        }
    }
}

/// The classification-bearing fields of a document row, spelled out
///
/// An explicit struct rather than a row reference so the resolution order
/// below is checkable against exactly these inputs.
#[derive(Debug, Clone, Default)]
pub struct DocumentSignals {
    pub confirmed_doc_type: Option<String>,
    pub confirmed_tax_year: Option<i32>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub canonical_doc_type: Option<String>,
    pub doc_year: Option<i32>,
    pub ai_doc_type: Option<String>,
    pub ai_tax_year: Option<i32>,
    pub gk_tax_year: Option<i32>,
}

impl DocumentSignals {
    pub fn from_row(row: &DocumentRow) -> Self {
        Self {
            confirmed_doc_type: row.confirmed_doc_type.clone(),
            confirmed_tax_year: row.confirmed_tax_year,
            confirmed_at: row.confirmed_at,
            canonical_doc_type: row.canonical_doc_type.clone(),
            doc_year: row.doc_year,
            ai_doc_type: row.ai_doc_type.clone(),
            ai_tax_year: row.ai_tax_year,
            gk_tax_year: row.gk_tax_year,
        }
    }
}

/// The reconciled classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedClassification {
    pub effective_doc_type: String,
    pub effective_tax_year: Option<i32>,
    pub source: ClassificationSource,
    pub is_confirmed: bool,
}

/// Reconcile all classification signals into one effective result
///
/// Type priority: confirmed > canonical > AI > UNKNOWN.
/// Year priority: confirmed > document year > gatekeeper year > AI year.
/// The source reads CONFIRMED whenever a confirmation timestamp exists,
/// regardless of which source supplied the type.
pub fn resolve(signals: &DocumentSignals) -> ResolvedClassification {
    let is_confirmed = signals.confirmed_at.is_some();

    let (effective_doc_type, type_source) =
        if let Some(confirmed) = non_blank(&signals.confirmed_doc_type) {
            (confirmed.to_string(), ClassificationSource::Confirmed)
        } else if let Some(canonical) = non_blank(&signals.canonical_doc_type) {
            (canonical.to_string(), ClassificationSource::Canonical)
        } else if let Some(ai) = non_blank(&signals.ai_doc_type) {
            (ai.to_string(), ClassificationSource::Ai)
        } else {
            (UNKNOWN_TYPE.to_string(), ClassificationSource::Unknown)
        };

    let source = if is_confirmed {
        ClassificationSource::Confirmed
    } else {
        type_source
    };

    let effective_tax_year = signals
        .confirmed_tax_year
        .or(signals.doc_year)
        .or(signals.gk_tax_year)
        .or(signals.ai_tax_year);

    ResolvedClassification {
        effective_doc_type,
        effective_tax_year,
        source,
        is_confirmed,
    }
}

/// Treat empty and whitespace-only strings as absent
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
