// Adaptive Auto-Attach Threshold Resolver
//
// Concept: Pure mapping from (tier, band, historical override curve, policy)
// to the confidence cutoff above which a classification may auto-populate a
// checklist slot. Thresholds only move DOWN (easier) and only when real
// audit history earns it; the LOW band and the fallback tier never move at
// all.

use crate::spine::types::{ConfidenceBand, SpineTier};
use serde::{Deserialize, Serialize};

/// Hard lock for the LOW band and the fallback tier
pub const HARD_LOCK_THRESHOLD: f64 = 0.99;

/// One aggregated audit-history cell, derived externally and read here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationCell {
    pub tier: SpineTier,
    pub band: ConfidenceBand,
    /// Classifications observed in this cell
    pub total: u64,
    /// Classifications a human later overrode
    pub overrides: u64,
}

impl CalibrationCell {
    pub fn override_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.overrides as f64 / self.total as f64
        }
    }
}

/// Loosening policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    /// Cells with fewer observations than this never loosen
    pub min_samples: u64,
    /// Override rate at or below which loosening is allowed
    pub target_override_rate: f64,
    /// Quantization step for loosening
    pub step: f64,
    /// Maximum total loosening per cell
    pub max_loosen: f64,
    /// Lowest threshold any loosening may reach
    pub floor: f64,
    /// Highest threshold (also the hard-lock value)
    pub ceiling: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            min_samples: 50,
            target_override_rate: 0.05,
            step: 0.01,
            max_loosen: 0.05,
            floor: 0.80,
            ceiling: 0.99,
        }
    }
}

/// Baseline tier x band matrix
///
/// LOW column and the fallback row are fixed at the hard lock; the resolver
/// never loosens them either.
pub fn baseline_threshold(tier: SpineTier, band: ConfidenceBand) -> f64 {
    use ConfidenceBand::*;
    use SpineTier::*;

    match (tier, band) {
        (Fallback, _) | (_, Low) => HARD_LOCK_THRESHOLD,
        (Tier1Anchor, High) => 0.88,
        (Tier1Anchor, Medium) => 0.85,
        (Tier2Structural, High) => 0.90,
        (Tier2Structural, Medium) => 0.87,
        (Tier3Llm, High) => 0.92,
        (Tier3Llm, Medium) => 0.90,
    }
}

/// Resolve the effective auto-attach threshold for one cell
pub fn resolve_threshold(
    tier: SpineTier,
    band: ConfidenceBand,
    curve: &[CalibrationCell],
    policy: &ThresholdPolicy,
) -> f64 {
    if matches!(tier, SpineTier::Fallback) || matches!(band, ConfidenceBand::Low) {
        return HARD_LOCK_THRESHOLD;
    }

    let baseline = baseline_threshold(tier, band);

    let Some(cell) = curve.iter().find(|c| c.tier == tier && c.band == band) else {
        return baseline;
    };
    if cell.total < policy.min_samples {
        return baseline;
    }

    let rate = cell.override_rate();
    if rate > policy.target_override_rate {
        return baseline;
    }

    // Loosen in proportion to how far the observed rate sits below target.
    // Quantize downward; the epsilon keeps exact step multiples from losing
    // a step to float error.
    let fraction_below =
        ((policy.target_override_rate - rate) / policy.target_override_rate).clamp(0.0, 1.0);
    let raw_loosen = fraction_below * policy.max_loosen;
    let steps = (raw_loosen / policy.step + 1e-9).floor();
    let loosen = (steps * policy.step).min(policy.max_loosen);

    (baseline - loosen).clamp(policy.floor, policy.ceiling)
}
