//! Rule-based extraction with no network or model dependency.
//!
//! Dates go through five stages: mask false positives, explicit formats,
//! flexible parsing, validation/scoring and overlap merging. People,
//! organizations and locations come from [`entities`].

pub mod confidence;
pub mod dedup;
pub mod entities;
pub mod flexible;
pub mod keywords;
pub mod patterns;
pub mod prefilter;
pub mod sentence;
pub mod types;
pub mod validate;

use chrono::{Datelike, NaiveDate, Utc};

use crate::config::DEFAULT_MIN_CONFIDENCE;
use crate::models::{ExtractType, ExtractedDate, ExtractionInput, ExtractionResult};

use prefilter::MaskedSpan;
use validate::{ScoredDate, ValidationContext};

/// Tunables for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Dates scoring below this are dropped.
    pub min_confidence: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Dates found in one text, with the diagnostics of how they were found.
#[derive(Debug, Clone, Default)]
pub struct DateExtraction {
    pub dates: Vec<ExtractedDate>,
    pub masked: Vec<MaskedSpan>,
    pub candidates: usize,
    pub rejected: usize,
}

/// Run the five-stage date pipeline over `text`.
pub fn extract_dates(text: &str, reference: NaiveDate, config: &EngineConfig) -> DateExtraction {
    let (masked_text, masked) = prefilter::mask_false_positives(text);

    let explicit = patterns::find_explicit_dates(text, &masked_text);
    let flexible = flexible::find_flexible_dates(text, &masked_text, &explicit, reference);
    let candidates: Vec<_> = explicit
        .into_iter()
        .chain(flexible)
        .filter(|c| !prefilter::overlaps_mask(&masked, c.start, c.end))
        .collect();

    let ctx = ValidationContext {
        current_year: reference.year(),
        min_confidence: config.min_confidence,
    };
    let mut rejected = 0;
    let scored: Vec<ScoredDate> = candidates
        .iter()
        .filter_map(|candidate| match validate::validate_candidate(text, candidate, &ctx) {
            Ok(scored) => Some(scored),
            Err(reason) => {
                rejected += 1;
                tracing::trace!(?reason, start = candidate.start, "Date candidate rejected");
                None
            }
        })
        .collect();

    let dates: Vec<ExtractedDate> = dedup::merge_overlapping(scored)
        .into_iter()
        .map(|s| s.date)
        .collect();

    tracing::debug!(
        masked = masked.len(),
        candidates = candidates.len(),
        rejected,
        kept = dates.len(),
        "Deterministic date pass complete"
    );

    DateExtraction {
        dates,
        masked,
        candidates: candidates.len(),
        rejected,
    }
}

/// Full deterministic extraction for one input. Never produces a summary.
pub fn extract(input: &ExtractionInput, config: &EngineConfig) -> ExtractionResult {
    let reference = input
        .reference_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let mut result = ExtractionResult::default();

    if input.wants(ExtractType::Dates) {
        result.dates = extract_dates(&input.text, reference, config).dates;
    }
    if input.wants(ExtractType::People) {
        result.people = entities::extract_people(&input.text);
    }
    if input.wants(ExtractType::Organizations) {
        result.organizations = entities::extract_organizations(&input.text);
    }
    if input.wants(ExtractType::Locations) {
        result.locations =
            entities::extract_locations(&input.text, input.location_context.as_deref());
    }
    result.clamp_confidences();
    result
}
