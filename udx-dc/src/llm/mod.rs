//! LLM integration for classification escalation
//!
//! - `client` - HTTP client for the generateContent endpoint
//! - `prompts` - Prompt templates and fingerprinting
//! - `examples` - Few-shot example corpus for Tier 3

pub mod client;
pub mod examples;
pub mod prompts;

/// Locate the JSON object inside raw model output
///
/// Models occasionally wrap their JSON in markdown fences or prose despite
/// instructions; callers parse the returned slice, not the raw output.
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end >= start).then(|| &raw[start..=end])
}
