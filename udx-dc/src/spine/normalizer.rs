// Spine Tier 0: Text Normalization
//
// Concept: Convert raw OCR text into the NormalizedDocument contract consumed
// by every downstream tier. Pure computation over the input string; there are
// no failure modes, only degraded outputs (e.g. empty windows for empty text).

use crate::spine::types::NormalizedDocument;
use regex::Regex;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Nominal page size in characters for OCR text without page breaks
const NOMINAL_PAGE_CHARS: usize = 3000;

/// A form-feed boundary is honored only within 1.5x the nominal window;
/// beyond that the flat character slice is more representative.
const BOUNDARY_TOLERANCE_NUM: usize = 3;
const BOUNDARY_TOLERANCE_DEN: usize = 2;

/// Minimum tab/pipe separators for a line to count as table-shaped
const TABLE_SEPARATORS_PER_LINE: usize = 2;

/// Minimum table-shaped lines in the first two pages to flag tabular layout
const TABLE_LINE_THRESHOLD: usize = 5;

/// Text normalizer for the classification spine
///
/// Compiles its patterns once; construct a single instance and reuse it for
/// every document.
pub struct Normalizer {
    /// "Page N" / "Page N of M" page-stamp markers
    page_marker: Regex,
    /// Plausible 20xx year tokens
    year_token: Regex,
    /// Explicit tax-year phrases, highest priority first
    tax_year_phrases: Vec<Regex>,
    /// Return-level IRS form numbers (longest alternatives first, so the
    /// 1040-SR and 1120-S variants win over their prefixes)
    return_form_number: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// # Panics
    /// Panics if the hard-coded patterns fail to compile (programmer error).
    pub fn new() -> Self {
        Self {
            page_marker: Regex::new(r"(?i)\bpage\s+\d{1,4}(\s+of\s+\d{1,4})?\b")
                .expect("page marker pattern is valid"),
            year_token: Regex::new(r"\b20[0-4]\d\b").expect("year token pattern is valid"),
            tax_year_phrases: vec![
                Regex::new(r"(?i)\btax\s+year[:\s]+(20[0-4]\d)\b")
                    .expect("tax year phrase pattern is valid"),
                Regex::new(r"(?i)\bfor\s+(?:the\s+)?(?:calendar|fiscal|tax)\s+year\D{0,24}(20[0-4]\d)\b")
                    .expect("calendar year phrase pattern is valid"),
                Regex::new(r"(?i)\b(?:year|period)\s+end(?:ed|ing)\D{0,24}(20[0-4]\d)\b")
                    .expect("year ended phrase pattern is valid"),
            ],
            return_form_number: Regex::new(
                r"(?i)\bform\s+(1040-?SR|1040|1041|1065|1120-?S|1120)\b",
            )
            .expect("form number pattern is valid"),
        }
    }

    /// Normalize raw OCR text into the shared document contract
    pub fn normalize(
        &self,
        document_id: Uuid,
        filename: &str,
        mime_type: Option<&str>,
        text: &str,
    ) -> NormalizedDocument {
        let page_count = self.estimate_page_count(text);
        let first_page_text = page_window(text, 1).to_string();
        let first_two_pages_text = page_window(text, 2).to_string();
        let detected_years = self.detect_years(text);
        let has_table_like_structure = self.detect_table_structure(&first_two_pages_text);

        NormalizedDocument {
            document_id,
            filename: filename.to_string(),
            mime_type: mime_type.map(|m| m.to_string()),
            page_count,
            first_page_text,
            first_two_pages_text,
            full_text: text.to_string(),
            detected_years,
            has_table_like_structure,
        }
    }

    /// Estimate page count from the strongest available signal
    ///
    /// Priority: form feeds > page-stamp markers > character length. The
    /// length heuristic never reports fewer than one page.
    fn estimate_page_count(&self, text: &str) -> u32 {
        let form_feeds = text.matches('\u{0C}').count();
        if form_feeds > 0 {
            return (form_feeds + 1) as u32;
        }

        let markers = self.page_marker.find_iter(text).count();
        if markers > 1 {
            return markers as u32;
        }

        let chars = text.chars().count();
        (chars.div_ceil(NOMINAL_PAGE_CHARS).max(1)) as u32
    }

    /// Distinct plausible years anywhere in the text, newest first
    pub fn detect_years(&self, text: &str) -> Vec<i32> {
        let unique: BTreeSet<i32> = self
            .year_token
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<i32>().ok())
            .collect();

        let mut years: Vec<i32> = unique.into_iter().collect();
        years.sort_unstable_by(|a, b| b.cmp(a));
        years
    }

    /// Resolve the document's tax year
    ///
    /// Explicit tax-year phrasing wins; otherwise a single unambiguous year
    /// token is accepted. Multiple candidate years with no explicit phrase
    /// stay unresolved (the calibrator penalizes that separately).
    pub fn resolve_tax_year(&self, text: &str, detected_years: &[i32]) -> Option<i32> {
        for phrase in &self.tax_year_phrases {
            if let Some(caps) = phrase.captures(text) {
                if let Some(year) = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok()) {
                    return Some(year);
                }
            }
        }

        match detected_years {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Distinct return-level IRS form numbers mentioned in the text
    ///
    /// Only return-level forms count: a 1040 that says "Attach Form(s) W-2"
    /// is not a combined upload, but 1040 and 1065 text in one document is.
    /// The 1040/1040-SR family collapses to one entry.
    pub fn detect_return_form_numbers(&self, text: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        for caps in self.return_form_number.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                seen.insert(normalize_form_number(m.as_str()));
            }
        }
        seen.into_iter().collect()
    }

    /// Table-shaped layout detection over the first two pages
    ///
    /// Signal A: several lines carrying repeated tab/pipe column separators.
    /// Signal B: a single line holding two distinct year tokens (the shape of
    /// a multi-year comparative statement header).
    fn detect_table_structure(&self, first_two_pages: &str) -> bool {
        let separator_lines = first_two_pages
            .lines()
            .filter(|line| {
                let separators = line.matches('\t').count() + line.matches('|').count();
                separators >= TABLE_SEPARATORS_PER_LINE
            })
            .count();

        if separator_lines >= TABLE_LINE_THRESHOLD {
            return true;
        }

        first_two_pages.lines().any(|line| {
            let distinct: BTreeSet<&str> = self
                .year_token
                .find_iter(line)
                .map(|m| m.as_str())
                .collect();
            distinct.len() >= 2
        })
    }
}

/// Collapse form-number variants to their canonical family
///
/// "1040-SR" and "1040SR" are the same return family as "1040"; "1120S" is a
/// distinct return from "1120".
fn normalize_form_number(raw: &str) -> String {
    let upper = raw.to_uppercase().replace('-', "");
    if upper.starts_with("1040") {
        "1040".to_string()
    } else {
        upper
    }
}

/// Character-safe window over the first `pages` nominal pages
///
/// Prefers the corresponding form-feed boundary when it falls within 1.5x the
/// nominal window; otherwise takes a flat character slice. Never splits a
/// UTF-8 character.
fn page_window(text: &str, pages: usize) -> &str {
    let nominal = NOMINAL_PAGE_CHARS * pages;
    let tolerance = nominal * BOUNDARY_TOLERANCE_NUM / BOUNDARY_TOLERANCE_DEN;

    if let Some(boundary) = nth_form_feed(text, pages) {
        let chars_before = text[..boundary].chars().count();
        if chars_before <= tolerance {
            return &text[..boundary];
        }
    }

    char_slice(text, nominal)
}

/// Byte index of the nth form feed (1-based), if present
fn nth_form_feed(text: &str, n: usize) -> Option<usize> {
    text.match_indices('\u{0C}').nth(n - 1).map(|(idx, _)| idx)
}

/// First `max_chars` characters of `text`, on a char boundary
fn char_slice(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
