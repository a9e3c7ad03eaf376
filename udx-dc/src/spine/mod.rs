//! # Spine Classification Pipeline
//!
//! **Tiered document classification with graceful degradation:**
//!
//! ## Tier 1: Anchor Rules (deterministic)
//! - `rules` - Anchor and structural rule definitions
//! - `tier1` - High-precision anchor matching on the first page
//!
//! ## Tier 2: Structural Heuristics (deterministic)
//! - `tier2` - Layout and keyword-density matching on the first two pages
//! - `gate` - Escalation gate deciding when Tier 2 may finalize
//!
//! ## Tier 3: LLM Escalation
//! - `tier3` - Few-shot LLM classification over the first two pages
//!
//! ## Shared Stages
//! - `normalizer` - Text normalization, page splitting, year detection
//! - `calibration` - Penalty-based confidence calibration and banding
//! - `threshold` - Adaptive auto-attach threshold resolution
//! - `orchestrator` - End-to-end pipeline wiring and cross-validation
//!
//! Each stage is a self-contained concept with explicit input/output contracts.

pub mod calibration;
pub mod gate;
pub mod normalizer;
pub mod orchestrator;
pub mod rules;
pub mod threshold;
pub mod tier1;
pub mod tier2;
pub mod tier3;
pub mod types;
