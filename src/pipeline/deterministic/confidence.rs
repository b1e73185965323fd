//! Multi-factor confidence scoring for date candidates.

use crate::models::{clamp_confidence, DatePrecision};

pub const PATTERN_WEIGHT: f32 = 0.35;
pub const PROXIMITY_WEIGHT: f32 = 0.35;
pub const PLAUSIBILITY_WEIGHT: f32 = 0.15;
pub const SPECIFICITY_WEIGHT: f32 = 0.15;

/// Oldest year considered at all.
pub const MIN_PLAUSIBLE_YEAR: i32 = 1600;

/// The four signals behind one candidate's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFactors {
    pub pattern: f32,
    pub proximity: f32,
    pub plausibility: f32,
    pub specificity: f32,
}

/// Weighted sum, clamped to [0, 1].
pub fn score(factors: &ConfidenceFactors) -> f32 {
    clamp_confidence(
        PATTERN_WEIGHT * factors.pattern
            + PROXIMITY_WEIGHT * factors.proximity
            + PLAUSIBILITY_WEIGHT * factors.plausibility
            + SPECIFICITY_WEIGHT * factors.specificity,
    )
}

/// Decay by gap to the nearest category keyword. `None` means no keyword
/// anywhere in the sentence.
pub fn keyword_proximity(distance: Option<usize>) -> f32 {
    match distance {
        None => 0.0,
        Some(0..=10) => 1.0,
        Some(11..=30) => 0.8,
        Some(31..=100) => 0.5,
        Some(_) => 0.2,
    }
}

/// Whether a year is inside the absolute window at all.
pub fn is_plausible_year(year: i32, current_year: i32) -> bool {
    (MIN_PLAUSIBLE_YEAR..=current_year + 1).contains(&year)
}

/// Peaks across the archive era (1800-1990), fades toward the present and
/// toward early colonial years. Zero outside the absolute window.
pub fn historical_plausibility(year: i32, current_year: i32) -> f32 {
    if !is_plausible_year(year, current_year) {
        return 0.0;
    }
    match year {
        1600..=1699 => 0.3,
        1700..=1799 => 0.6,
        1800..=1990 => 1.0,
        _ => {
            let span = (current_year - 1990).max(1) as f32;
            let into = (year - 1990).min(current_year - 1990).max(0) as f32;
            1.0 - 0.5 * (into / span).min(1.0)
        }
    }
}

pub fn specificity(precision: DatePrecision) -> f32 {
    match precision {
        DatePrecision::Exact => 1.0,
        DatePrecision::Month => 0.8,
        DatePrecision::Year => 0.5,
        DatePrecision::Decade => 0.3,
        DatePrecision::Approximate => 0.2,
    }
}
