//! Post-filter: keyword window, plausibility and the confidence floor.

use std::sync::LazyLock;

use regex::Regex;

use super::confidence::{self, ConfidenceFactors};
use super::keywords::detect_category;
use super::sentence::sentence_at;
use super::types::{CandidateKind, DateCandidate};
use crate::models::{DateCategory, ExtractedDate};

/// Characters either side of a date searched for a category keyword.
pub const KEYWORD_WINDOW: usize = 50;

/// Closer keywords lift a bare year's pattern confidence.
const BARE_YEAR_NEAR_KEYWORD: usize = 30;

static TEMPORAL_PREPOSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in|since|by|until|till|before|after|during)\s+(?:the\s+)?(?:year\s+)?$")
        .expect("Invalid preposition regex")
});

/// Settings that apply to one validation pass.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub current_year: i32,
    pub min_confidence: f32,
}

/// A validated date plus the source span it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDate {
    pub start: usize,
    pub end: usize,
    pub date: ExtractedDate,
}

/// Why a candidate was dropped. Logged at debug level only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Implausible,
    NoContext,
    BelowFloor,
}

/// "in 1923", "since the year 1923".
pub fn has_temporal_preposition(text: &str, start: usize) -> bool {
    let mut from = start.saturating_sub(32);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    text.get(from..start)
        .is_some_and(|before| TEMPORAL_PREPOSITION.is_match(before))
}

fn bare_year_pattern_confidence(has_preposition: bool, keyword_distance: Option<usize>) -> f32 {
    if has_preposition {
        0.7
    } else if keyword_distance.is_some_and(|d| d <= BARE_YEAR_NEAR_KEYWORD) {
        0.5
    } else {
        0.4
    }
}

/// Score a candidate against `text` and keep it only if it passes every
/// check.
pub fn validate_candidate(
    text: &str,
    candidate: &DateCandidate,
    ctx: &ValidationContext,
) -> Result<ScoredDate, Rejection> {
    if !confidence::is_plausible_year(candidate.year, ctx.current_year) {
        return Err(Rejection::Implausible);
    }
    if candidate
        .end_year
        .is_some_and(|end| end < candidate.year || end < confidence::MIN_PLAUSIBLE_YEAR)
    {
        return Err(Rejection::Implausible);
    }

    let hit = detect_category(text, candidate.start, candidate.end);
    let distance = hit.as_ref().map(|h| h.distance);
    let in_window = distance.is_some_and(|d| d <= KEYWORD_WINDOW);

    let pattern = match candidate.kind.base_pattern_confidence() {
        Some(base) => base,
        None => {
            let prep = has_temporal_preposition(text, candidate.start);
            if !in_window && !prep {
                return Err(Rejection::NoContext);
            }
            bare_year_pattern_confidence(prep, distance)
        }
    };

    let factors = ConfidenceFactors {
        pattern,
        proximity: confidence::keyword_proximity(distance),
        plausibility: confidence::historical_plausibility(candidate.year, ctx.current_year),
        specificity: confidence::specificity(candidate.precision),
    };
    let overall = confidence::score(&factors);
    if overall < ctx.min_confidence {
        return Err(Rejection::BelowFloor);
    }

    Ok(ScoredDate {
        start: candidate.start,
        end: candidate.end,
        date: ExtractedDate {
            raw_text: candidate.raw_text.clone(),
            parsed_date: candidate.parsed_date.clone(),
            parsed_date_end: candidate.parsed_date_end.clone(),
            precision: candidate.precision,
            category: hit.map(|h| h.category).unwrap_or(DateCategory::Unknown),
            confidence: (overall * 100.0).round() / 100.0,
            context: sentence_at(text, candidate.start),
            is_approximate: candidate.is_approximate,
        },
    })
}
