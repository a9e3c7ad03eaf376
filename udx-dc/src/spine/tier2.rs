// Spine Tier 2: Structural Matching
//
// Concept: Lower-precision multi-signal classification for documents without
// a clean form header. Same first-match-wins walk as Tier 1, but over the
// structural pattern list and at reduced confidence. Acceptance of a Tier-2
// hit is the Confidence Gate's call, not ours.

use crate::spine::rules::{first_match, outcome_for, RuleSet};
use crate::spine::types::{MatchOutcome, NormalizedDocument};
use std::sync::Arc;
use tracing::debug;

/// Tier-2 structural matcher
pub struct Tier2StructuralMatcher {
    rules: Arc<RuleSet>,
}

impl Tier2StructuralMatcher {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// Classify against the Tier-2 structural patterns
    pub fn classify(&self, doc: &NormalizedDocument) -> MatchOutcome {
        match first_match(self.rules.tier2_rules(), doc) {
            Some((rule, m)) => {
                debug!(
                    document_id = %doc.document_id,
                    rule_id = rule.id,
                    doc_type = rule.doc_type.as_str(),
                    confidence = rule.confidence,
                    "Tier-2 structural pattern matched"
                );
                outcome_for(rule, m, doc)
            }
            None => MatchOutcome::none(),
        }
    }
}
