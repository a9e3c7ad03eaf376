// Spine Tier 1: Anchor Matching
//
// Concept: High-precision deterministic classification. Walks the Tier-1
// anchor list in priority order; the first hit is authoritative and no
// further tier runs. Misses are cheap (no match, empty evidence) and fall
// through to Tier 2.

use crate::spine::rules::{first_match, outcome_for, RuleSet};
use crate::spine::types::{MatchOutcome, NormalizedDocument};
use std::sync::Arc;
use tracing::debug;

/// Tier-1 anchor matcher
///
/// Holds the shared rule tables; classification itself is pure and
/// lock-free, safe to call from any task.
pub struct Tier1AnchorMatcher {
    rules: Arc<RuleSet>,
}

impl Tier1AnchorMatcher {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// Classify against the Tier-1 anchors
    pub fn classify(&self, doc: &NormalizedDocument) -> MatchOutcome {
        match first_match(self.rules.tier1_rules(), doc) {
            Some((rule, m)) => {
                debug!(
                    document_id = %doc.document_id,
                    rule_id = rule.id,
                    doc_type = rule.doc_type.as_str(),
                    confidence = rule.confidence,
                    "Tier-1 anchor matched"
                );
                outcome_for(rule, m, doc)
            }
            None => MatchOutcome::none(),
        }
    }
}
