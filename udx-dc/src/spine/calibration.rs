// Spine Confidence Calibration
//
// Concept: Convert a tier's raw confidence into the audited score the rest
// of the system acts on. Penalties are explicit, independently applied (the
// two year penalties are mutually exclusive), and every deduction is
// recorded with a reason. The band is a function of the clamped score alone.

use crate::spine::types::{CalibratedConfidence, ConfidenceBand, PenaltyCode, PenaltyRecord};

pub const CONFIDENCE_FLOOR: f64 = 0.35;
pub const CONFIDENCE_CEILING: f64 = 0.97;
pub const HIGH_BAND_MIN: f64 = 0.88;
pub const MEDIUM_BAND_MIN: f64 = 0.75;

const AMBIGUITY_PENALTY: f64 = 0.10;
const MISSING_YEAR_PENALTY: f64 = 0.07;
const UNRESOLVED_YEAR_PENALTY: f64 = 0.04;
const MULTI_FORM_PENALTY: f64 = 0.12;
const LOW_DENSITY_PENALTY: f64 = 0.08;

/// Below this many characters of text, OCR quality is too thin to trust
const LOW_DENSITY_CHAR_THRESHOLD: usize = 200;

/// Everything the calibrator looks at, gathered by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct CalibrationInputs {
    pub raw_confidence: f64,
    /// Competing type labels (external-signal disagreement, known confusion pairs)
    pub confusion_candidates: Vec<String>,
    pub detected_years: Vec<i32>,
    pub resolved_tax_year: Option<i32>,
    /// Distinct return-level form numbers found in the text
    pub form_numbers: Vec<String>,
    /// Character count of the full text
    pub text_chars: usize,
}

/// Apply the penalty schedule and clamp into the calibrated range
pub fn calibrate(inputs: &CalibrationInputs) -> CalibratedConfidence {
    let mut penalties: Vec<PenaltyRecord> = Vec::new();

    if !inputs.confusion_candidates.is_empty() {
        penalties.push(PenaltyRecord {
            code: PenaltyCode::Ambiguity,
            amount: AMBIGUITY_PENALTY,
            reason: format!(
                "competing type candidates: {}",
                inputs.confusion_candidates.join(", ")
            ),
        });
    }

    // The two year penalties are mutually exclusive: either nothing looks
    // like a year, or years exist but none could be resolved.
    if inputs.detected_years.is_empty() {
        penalties.push(PenaltyRecord {
            code: PenaltyCode::MissingYear,
            amount: MISSING_YEAR_PENALTY,
            reason: "no year detected anywhere in the document".to_string(),
        });
    } else if inputs.resolved_tax_year.is_none() {
        penalties.push(PenaltyRecord {
            code: PenaltyCode::UnresolvedYear,
            amount: UNRESOLVED_YEAR_PENALTY,
            reason: format!(
                "{} candidate years but no resolved tax year",
                inputs.detected_years.len()
            ),
        });
    }

    if inputs.form_numbers.len() > 1 {
        penalties.push(PenaltyRecord {
            code: PenaltyCode::MultipleForms,
            amount: MULTI_FORM_PENALTY,
            reason: format!(
                "multiple return-level form numbers: {}",
                inputs.form_numbers.join(", ")
            ),
        });
    }

    if inputs.text_chars < LOW_DENSITY_CHAR_THRESHOLD {
        penalties.push(PenaltyRecord {
            code: PenaltyCode::LowTextDensity,
            amount: LOW_DENSITY_PENALTY,
            reason: format!("only {} characters of text", inputs.text_chars),
        });
    }

    let mut confidence = inputs.raw_confidence;
    for penalty in &penalties {
        confidence -= penalty.amount;
    }
    let confidence = confidence.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING);

    CalibratedConfidence {
        confidence,
        band: band_for(confidence),
        penalties,
    }
}

/// Band thresholds over the calibrated (clamped) score
pub fn band_for(confidence: f64) -> ConfidenceBand {
    if confidence >= HIGH_BAND_MIN {
        ConfidenceBand::High
    } else if confidence >= MEDIUM_BAND_MIN {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::Low
    }
}
