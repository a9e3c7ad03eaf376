// Spine Confidence Gate
//
// Concept: The single decision point between deterministic and generative
// classification. Tier-1 output is always trusted; Tier-2 output is trusted
// at or above a fixed cutoff; everything else escalates to Tier 3.

use crate::spine::types::MatchOutcome;

/// Tier-2 acceptance cutoff, boundary inclusive
pub const TIER2_ACCEPT_THRESHOLD: f64 = 0.80;

/// Gate verdict over the deterministic tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    AcceptTier1,
    AcceptTier2,
    Escalate,
}

/// Decide whether deterministic output stands or Tier 3 runs
pub fn evaluate(tier1: &MatchOutcome, tier2: &MatchOutcome) -> GateDecision {
    if tier1.matched {
        return GateDecision::AcceptTier1;
    }
    if tier2.matched && tier2.confidence >= TIER2_ACCEPT_THRESHOLD {
        return GateDecision::AcceptTier2;
    }
    GateDecision::Escalate
}
