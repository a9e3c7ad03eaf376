// Spine Rule Tables
//
// Concept: The static, versioned rule definitions behind Tier 1 and Tier 2.
// Rules live in two explicit ordered lists; position in the list IS the
// priority, and every ordering dependency is documented at the rule that
// depends on it. The matchers in tier1.rs / tier2.rs walk these lists and
// stop at the first hit.

use crate::spine::types::{DocType, EntityType, EvidenceItem, EvidenceKind, MatchOutcome, NormalizedDocument};
use regex::Regex;

// ============================================================================
// Rule Definition
// ============================================================================

/// Which text window a rule matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Whole document text (form-number rules; the form line can sit anywhere)
    FullText,
    /// First-two-pages window (structural headers live up front)
    FirstTwoPages,
}

/// One deterministic classification rule
///
/// A rule hits when its primary pattern matches in scope, at least
/// `secondary_min_match` of its secondary patterns corroborate, and (when
/// `requires_table` is set) the document has table-like layout.
#[derive(Debug, Clone)]
pub struct SpineRule {
    pub id: &'static str,
    pub doc_type: DocType,
    pub entity_type: Option<EntityType>,
    pub confidence: f64,
    pub scope: MatchScope,
    pub evidence_kind: EvidenceKind,
    pub requires_table: bool,
    pub primary: Regex,
    pub secondary: Vec<Regex>,
    pub secondary_min_match: usize,
}

/// Raw match data produced by a successful rule evaluation
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub matched_text: String,
    pub secondary_hits: Vec<String>,
}

impl SpineRule {
    /// Evaluate this rule against a normalized document
    pub fn evaluate(&self, doc: &NormalizedDocument) -> Option<RuleMatch> {
        if self.requires_table && !doc.has_table_like_structure {
            return None;
        }

        let haystack = match self.scope {
            MatchScope::FullText => doc.full_text.as_str(),
            MatchScope::FirstTwoPages => doc.first_two_pages_text.as_str(),
        };

        let primary = self.primary.find(haystack)?;

        let secondary_hits: Vec<String> = self
            .secondary
            .iter()
            .filter_map(|pattern| pattern.find(haystack))
            .map(|m| m.as_str().to_string())
            .collect();

        if secondary_hits.len() < self.secondary_min_match {
            return None;
        }

        Some(RuleMatch {
            matched_text: primary.as_str().to_string(),
            secondary_hits,
        })
    }
}

/// Walk an ordered rule list and return the first hit
///
/// First match is final; later rules never override an earlier one.
pub fn first_match<'a>(
    rules: &'a [SpineRule],
    doc: &NormalizedDocument,
) -> Option<(&'a SpineRule, RuleMatch)> {
    rules
        .iter()
        .find_map(|rule| rule.evaluate(doc).map(|m| (rule, m)))
}

/// Convert a rule hit into a tier outcome with its audit evidence
pub fn outcome_for(rule: &SpineRule, m: RuleMatch, doc: &NormalizedDocument) -> MatchOutcome {
    let mut evidence = vec![EvidenceItem {
        kind: rule.evidence_kind,
        rule_id: Some(rule.id.to_string()),
        matched_text: m.matched_text,
        confidence: rule.confidence,
    }];

    for hit in m.secondary_hits {
        evidence.push(EvidenceItem {
            kind: EvidenceKind::Keyword,
            rule_id: Some(rule.id.to_string()),
            matched_text: hit,
            confidence: rule.confidence,
        });
    }

    if rule.requires_table && doc.has_table_like_structure {
        evidence.push(EvidenceItem {
            kind: EvidenceKind::TableShape,
            rule_id: Some(rule.id.to_string()),
            matched_text: "table-like layout".to_string(),
            confidence: rule.confidence,
        });
    }

    MatchOutcome {
        matched: true,
        doc_type: Some(rule.doc_type),
        confidence: rule.confidence,
        entity_type: rule.entity_type,
        evidence,
    }
}

// ============================================================================
// Rule Set
// ============================================================================

/// The compiled Tier-1 and Tier-2 rule tables
///
/// Construct once at startup and share (matchers hold it behind an `Arc`).
/// There are no hidden module statics; tests build their own instances.
pub struct RuleSet {
    tier1: Vec<SpineRule>,
    tier2: Vec<SpineRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSet {
    /// Build the built-in rule tables
    ///
    /// # Panics
    /// Panics if a hard-coded pattern fails to compile (programmer error).
    pub fn new() -> Self {
        Self {
            tier1: builtin_tier1_rules(),
            tier2: builtin_tier2_rules(),
        }
    }

    /// Tier-1 anchors in priority order
    pub fn tier1_rules(&self) -> &[SpineRule] {
        &self.tier1
    }

    /// Tier-2 structural patterns in priority order
    pub fn tier2_rules(&self) -> &[SpineRule] {
        &self.tier2
    }
}

fn rule(
    id: &'static str,
    doc_type: DocType,
    confidence: f64,
    scope: MatchScope,
    evidence_kind: EvidenceKind,
    primary: &str,
) -> SpineRule {
    SpineRule {
        id,
        doc_type,
        entity_type: None,
        confidence,
        scope,
        evidence_kind,
        requires_table: false,
        primary: Regex::new(primary).expect("rule primary pattern is valid"),
        secondary: Vec::new(),
        secondary_min_match: 0,
    }
}

impl SpineRule {
    fn entity(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    fn corroborated_by(mut self, patterns: &[&str], min_match: usize) -> Self {
        self.secondary = patterns
            .iter()
            .map(|p| Regex::new(p).expect("rule secondary pattern is valid"))
            .collect();
        self.secondary_min_match = min_match;
        self
    }

    fn table_shaped(mut self) -> Self {
        self.requires_table = true;
        self
    }
}

/// Tier-1 anchors, highest priority first
///
/// Confidence must stay within [0.90, 0.99].
fn builtin_tier1_rules() -> Vec<SpineRule> {
    use DocType::*;
    use EvidenceKind::{FormNumber, StructuralHeader};
    use MatchScope::{FirstTwoPages, FullText};

    vec![
        // Ordering: the K-1 family runs before every return rule. A K-1
        // facsimile names its parent return ("Schedule K-1 (Form 1065)"), so
        // the 1065/1120-S rules would otherwise claim it.
        rule(
            "k1_1120s",
            ScheduleK1,
            0.98,
            FullText,
            FormNumber,
            r"(?i)schedule\s+k-?1\s*\(\s*form\s+1120-?s\s*\)",
        )
        .entity(EntityType::SCorporation),
        rule(
            "k1_1065",
            ScheduleK1,
            0.98,
            FullText,
            FormNumber,
            r"(?i)schedule\s+k-?1\s*\(\s*form\s+1065\s*\)",
        )
        .entity(EntityType::Partnership),
        rule(
            "k1_generic",
            ScheduleK1,
            0.96,
            FullText,
            FormNumber,
            r"(?i)\bschedule\s+k-?1\b",
        ),
        // Ordering: 1040-SR before 1040. "Form 1040-SR" also satisfies the
        // generic pattern at the word boundary before the hyphen.
        rule(
            "form_1040_sr",
            IrsPersonal,
            0.98,
            FullText,
            FormNumber,
            r"(?i)\bform\s+1040-?sr\b",
        )
        .entity(EntityType::Individual),
        rule(
            "form_1040",
            IrsPersonal,
            0.98,
            FullText,
            FormNumber,
            r"(?i)\bform\s+1040\b|u\.?s\.?\s+individual\s+income\s+tax\s+return",
        )
        .entity(EntityType::Individual),
        // Ordering: return rules before the W-2/1099 rules. A full return
        // package that includes its wage statements resolves to the return.
        rule(
            "form_1065",
            IrsPartnership,
            0.98,
            FullText,
            FormNumber,
            r"(?i)\bform\s+1065\b|u\.?s\.?\s+return\s+of\s+partnership\s+income",
        )
        .entity(EntityType::Partnership),
        // Ordering: 1120-S before 1120. "Form 1120-S" also satisfies the
        // generic pattern at the word boundary before the hyphen.
        rule(
            "form_1120s",
            IrsSCorp,
            0.98,
            FullText,
            FormNumber,
            r"(?i)\bform\s+1120-?s\b|income\s+tax\s+return\s+for\s+an\s+s\s+corporation",
        )
        .entity(EntityType::SCorporation),
        rule(
            "form_1120",
            IrsCorp,
            0.98,
            FullText,
            FormNumber,
            r"(?i)\bform\s+1120\b|u\.?s\.?\s+corporation\s+income\s+tax\s+return",
        )
        .entity(EntityType::Corporation),
        rule(
            "form_w2",
            W2,
            0.97,
            FullText,
            FormNumber,
            r"(?i)\bform\s+w-?2\b|wage\s+and\s+tax\s+statement",
        ),
        rule(
            "form_1099",
            Form1099,
            0.96,
            FullText,
            FormNumber,
            r"(?i)\bform\s+1099\b|\b1099-(int|div|misc|nec|r|g|b|k|s)\b",
        ),
        // Ordering: the PFS header before the balance-sheet rule. A personal
        // financial statement carries the same totals lines.
        rule(
            "personal_financial_statement",
            PersonalFinancialStatement,
            0.93,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)personal\s+financial\s+statement",
        )
        .entity(EntityType::Individual)
        .corroborated_by(
            &[
                r"(?i)\btotal\s+assets\b",
                r"(?i)\btotal\s+liabilities\b",
                r"(?i)\bnet\s+worth\b",
            ],
            1,
        ),
        rule(
            "balance_sheet",
            BalanceSheet,
            0.92,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\bbalance\s+sheet\b",
        )
        .corroborated_by(
            &[r"(?i)\btotal\s+assets\b", r"(?i)\btotal\s+liabilities\b"],
            2,
        ),
        rule(
            "income_statement",
            IncomeStatement,
            0.91,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\bincome\s+statement\b|profit\s+(and|&)\s+loss|\bstatement\s+of\s+operations\b",
        )
        .corroborated_by(
            &[
                r"(?i)\b(total\s+)?revenues?\b",
                r"(?i)\b(total\s+)?expenses\b",
                r"(?i)\bnet\s+income\b",
            ],
            2,
        ),
    ]
}

/// Tier-2 structural patterns, highest priority first
///
/// Confidence must stay within [0.75, 0.89]. Multi-period operating
/// statements resolve to `INCOME_STATEMENT`; the legacy trailing-twelve
/// label is matched as input text but never produced as a type.
fn builtin_tier2_rules() -> Vec<SpineRule> {
    use DocType::*;
    use EvidenceKind::StructuralHeader;
    use MatchScope::FirstTwoPages;

    vec![
        rule(
            "rent_roll_table",
            RentRoll,
            0.86,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\brent\s+roll\b|\brental\s+income\s+schedule\b",
        )
        .corroborated_by(
            &[
                r"(?i)\bunit\b",
                r"(?i)\btenant\b",
                r"(?i)\bmonthly\s+rent\b|\brent\s+amount\b|\blease\b",
            ],
            2,
        ),
        rule(
            "ar_aging",
            ArAging,
            0.85,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\baccounts\s+receivable\s+aging\b|\ba\/?r\s+aging\b|\baging\s+(summary|report|schedule)\b",
        )
        .corroborated_by(
            &[
                r"(?i)\bcurrent\b",
                r"(?i)\b(1\s*-\s*30|31\s*-\s*60|61\s*-\s*90|over\s+90|90\s*\+)\s*days?\b",
                r"(?i)\bpast\s+due\b",
            ],
            2,
        ),
        rule(
            "debt_schedule",
            DebtSchedule,
            0.84,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\bdebt\s+schedule\b|\bschedule\s+of\s+(liabilities|debts)\b",
        )
        .corroborated_by(
            &[
                r"(?i)\bcreditor\b|\blender\b",
                r"(?i)\b(original|current)\s+(amount|balance)\b",
                r"(?i)\b(monthly\s+)?payment\b",
                r"(?i)\binterest\s+rate\b",
            ],
            2,
        ),
        rule(
            "bank_transactions",
            BankStatement,
            0.83,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\b(bank|account)\s+statement\b|\btransaction\s+(history|detail|log)\b",
        )
        .corroborated_by(
            &[
                r"(?i)\b(beginning|opening)\s+balance\b",
                r"(?i)\b(ending|closing)\s+balance\b",
                r"(?i)\bdeposits?\b",
                r"(?i)\bwithdrawals?\b",
            ],
            2,
        ),
        // Multi-period operating statements are income statements. These two
        // rules exist so trailing-twelve and month-by-month operating text
        // lands on INCOME_STATEMENT instead of escalating.
        rule(
            "trailing_twelve_operating",
            IncomeStatement,
            0.82,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\btrailing[\s-]+(twelve|12)[\s-]+months?\b|\bt-?12\b|\blast\s+twelve\s+months\b|\bltm\b",
        )
        .corroborated_by(
            &[
                r"(?i)\b(total\s+)?(revenues?|income)\b",
                r"(?i)\b(total\s+)?expenses\b",
                r"(?i)\bnet\s+operating\s+income\b|\bnoi\b",
            ],
            1,
        ),
        rule(
            "multi_year_operating",
            IncomeStatement,
            0.82,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\boperating\s+statement\b|\bincome\s+and\s+expense\b|\bstatement\s+of\s+income\b",
        )
        .table_shaped()
        .corroborated_by(
            &[
                r"(?i)\b(total\s+)?(revenues?|income)\b",
                r"(?i)\b(total\s+)?expenses\b",
            ],
            1,
        ),
        rule(
            "monthly_operating",
            IncomeStatement,
            0.80,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\bmonthly\s+operating\s+(statement|report)\b|\bmonth[\s-]+by[\s-]+month\b",
        )
        .corroborated_by(
            &[
                r"(?i)\b(total\s+)?(revenues?|income)\b",
                r"(?i)\b(total\s+)?expenses\b",
            ],
            1,
        ),
        rule(
            "voided_check",
            VoidedCheck,
            0.80,
            FirstTwoPages,
            StructuralHeader,
            r"(?i)\bvoid(ed)?\b",
        )
        .corroborated_by(
            &[
                r"(?i)\brouting\s+(number|no\.?)\b|\baba\b",
                r"(?i)\baccount\s+(number|no\.?)\b",
                r"(?i)\bpay\s+to\s+the\s+order\s+of\b",
            ],
            2,
        ),
    ]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tier1_confidence_bounds() {
        for rule in RuleSet::new().tier1_rules() {
            assert!(
                (0.90..=0.99).contains(&rule.confidence),
                "tier1 rule {} out of bounds: {}",
                rule.id,
                rule.confidence
            );
        }
    }

    #[test]
    fn test_tier2_confidence_bounds() {
        for rule in RuleSet::new().tier2_rules() {
            assert!(
                (0.75..=0.89).contains(&rule.confidence),
                "tier2 rule {} out of bounds: {}",
                rule.id,
                rule.confidence
            );
        }
    }

    #[test]
    fn test_rule_ids_unique() {
        let rules = RuleSet::new();
        let mut seen = HashSet::new();
        for rule in rules.tier1_rules().iter().chain(rules.tier2_rules()) {
            assert!(seen.insert(rule.id), "duplicate rule id {}", rule.id);
        }
    }

    #[test]
    fn test_form_rules_scan_full_text_structural_rules_scan_window() {
        for rule in RuleSet::new().tier1_rules() {
            match rule.evidence_kind {
                EvidenceKind::FormNumber => assert_eq!(rule.scope, MatchScope::FullText),
                EvidenceKind::StructuralHeader => {
                    assert_eq!(rule.scope, MatchScope::FirstTwoPages)
                }
                other => panic!("unexpected evidence kind {:?} on rule {}", other, rule.id),
            }
        }
    }

    #[test]
    fn test_no_rule_produces_a_tax_period_label() {
        // Operating-statement text labeled "T12" must land on INCOME_STATEMENT
        let rules = RuleSet::new();
        for rule in rules.tier1_rules().iter().chain(rules.tier2_rules()) {
            if rule.id.contains("trailing") || rule.id.contains("operating") {
                assert_eq!(rule.doc_type, DocType::IncomeStatement);
            }
        }
    }

    #[test]
    fn test_secondary_requirements_present_where_declared() {
        let rules = RuleSet::new();
        for rule in rules.tier1_rules().iter().chain(rules.tier2_rules()) {
            assert!(
                rule.secondary_min_match <= rule.secondary.len(),
                "rule {} requires more corroboration than it defines",
                rule.id
            );
        }
    }
}
