// False-positive masking. Numbers that look like years but are not (ranges,
// counts, measurements, phone numbers, identifiers) are overwritten before any
// date pattern runs. The placeholder is ASCII and has the same byte length as
// the span, so every later offset still points into the original text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::validate::has_temporal_preposition;

pub const MASK_CHAR: char = '~';

/// One named rejection rule.
pub struct FalsePositiveRule {
    pub reason: &'static str,
    pub regex: Regex,
    /// Skip matches that open with a year introduced by a temporal
    /// preposition: "in 1923 workers built" is a date, "1923 workers" a count.
    pub spares_dated_years: bool,
}

/// A span that was masked, with the rule that caught it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskedSpan {
    pub original: String,
    pub reason: &'static str,
    /// Byte offset into the source text.
    pub position: usize,
}

impl MaskedSpan {
    pub fn end(&self) -> usize {
        self.position + self.original.len()
    }
}

/// Rules are evaluated independently; overlaps are resolved by position.
pub static FALSE_POSITIVE_RULES: LazyLock<Vec<FalsePositiveRule>> = LazyLock::new(|| {
    vec![
        rule("numeric_range", r"(?i)\b\d{1,3}\s+to\s+\d{1,3}\b"),
        rule(
            "range_with_unit",
            r"(?i)\b\d{1,3}\s*-\s*\d{1,3}\s*(?:employees?|workers?|people|persons?|staff|members?|units?|rooms?|beds?|floors?|stories)\b",
        ),
        rule("formatted_number", r"\b\d{1,3}(?:,\d{3})+\b"),
        // Bare "in" and "m" are left out: "built in 1923 in Ohio" is not a length.
        rule(
            "measurement_distance",
            r"(?i)\b\d+(?:\.\d+)?\s*(?:feet|foot|ft|meters?|inches|inch|yards?|yd|miles?|mi|km|kilometers?)\b",
        ),
        rule(
            "measurement_weight",
            r"(?i)\b\d+(?:\.\d+)?\s*(?:pounds?|lbs?|ounces?|oz|kilograms?|kg|grams?|tons?)\b",
        ),
        rule(
            "measurement_area",
            r"(?i)\b\d+(?:\.\d+)?\s*(?:acres?|hectares?|ha|sqft|sq\s*ft|square\s*feet|square\s*meters?|sq\s*m)\b",
        ),
        count_rule(
            "count_people",
            r"(?i)\b\d+\s*(?:employees?|workers?|people|persons?|staff|members?|residents?|students?|patients?|visitors?)\b",
        ),
        count_rule(
            "count_objects",
            r"(?i)\b\d+\s*(?:units?|rooms?|beds?|floors?|stories|buildings?|houses?|apartments?|cars?|vehicles?)\b",
        ),
        rule("currency_dollar", r"\$\s*[\d,]+(?:\.\d{2})?"),
        rule(
            "currency_word",
            r"(?i)\b\d+(?:,\d{3})*\s*(?:dollars?|cents?|bucks?|usd|eur|gbp)\b",
        ),
        rule(
            "time_range",
            r"(?i)\b\d{1,2}:\d{2}\s*(?:am|pm|a\.m\.|p\.m\.)?\s*(?:to|-)\s*\d{1,2}(?::\d{2})?\s*(?:am|pm|a\.m\.|p\.m\.)?",
        ),
        rule(
            "time",
            r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?(?:\s*(?:am|pm|a\.m\.|p\.m\.))?",
        ),
        rule("phone_number", r"\(\d{3}\)\s*\d{3}[-.\s]?\d{4}"),
        rule("phone_number", r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b"),
        rule(
            "route_number",
            r"(?i)\b(?:route|rt|rte|hwy|highway|interstate|i-|us-|sr-|state\s+route)\s*#?\s*\d+\b",
        ),
        rule(
            "building_id",
            r"(?i)\b(?:room|rm|building|bldg|suite|ste|apt|apartment|unit|floor|fl|lot|parcel)\s*#?\s*\d+\b",
        ),
        rule("percentage", r"\b\d+(?:\.\d+)?\s*%"),
        rule("hashtag", r"#\d+\b"),
        rule("coordinate", r"-?\d{1,3}\.\d{4,}"),
        rule(
            "age",
            r"(?i)\b\d+\s*(?:years?\s+old|-?year-old|yo)\b",
        ),
        rule("version", r"(?i)\bv(?:ersion)?\s*\d+(?:\.\d+)*\b"),
        // Case-sensitive so "mid-1950" survives.
        rule("model_number", r"\b[A-Z]{1,3}-?\d{3,}\b"),
        rule("zipcode", r"\b\d{5}-\d{4}\b"),
        rule(
            "dimensions",
            r"\b\d+\s*[xX×]\s*\d+(?:\s*[xX×]\s*\d+)?\b",
        ),
    ]
});

fn rule(reason: &'static str, pattern: &str) -> FalsePositiveRule {
    FalsePositiveRule {
        reason,
        regex: Regex::new(pattern).expect("Invalid false-positive regex"),
        spares_dated_years: false,
    }
}

fn count_rule(reason: &'static str, pattern: &str) -> FalsePositiveRule {
    FalsePositiveRule {
        spares_dated_years: true,
        ..rule(reason, pattern)
    }
}

/// `start` begins a 1600-2099 year preceded by "in", "by", "since" and the like.
fn opens_with_dated_year(text: &str, start: usize) -> bool {
    let digits: String = text[start..].chars().take_while(char::is_ascii_digit).collect();
    let is_year = digits.len() == 4 && digits.parse::<u32>().is_ok_and(|y| (1600..=2099).contains(&y));
    is_year && has_temporal_preposition(text, start)
}

/// Mask every false-positive span. Returns the masked text and the masks
/// applied, in source order. When matches overlap, the earliest wins; ties
/// go to the longer span.
pub fn mask_false_positives(text: &str) -> (String, Vec<MaskedSpan>) {
    let mut hits: Vec<(usize, usize, &'static str)> = Vec::new();
    for rule in FALSE_POSITIVE_RULES.iter() {
        for m in rule.regex.find_iter(text) {
            if rule.spares_dated_years && opens_with_dated_year(text, m.start()) {
                continue;
            }
            if m.start() < m.end() {
                hits.push((m.start(), m.end(), rule.reason));
            }
        }
    }
    hits.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut masked = text.to_string();
    let mut spans = Vec::new();
    let mut last_end = 0;
    for (start, end, reason) in hits {
        if start < last_end {
            continue;
        }
        let placeholder = MASK_CHAR.to_string().repeat(end - start);
        masked.replace_range(start..end, &placeholder);
        spans.push(MaskedSpan {
            original: text[start..end].to_string(),
            reason,
            position: start,
        });
        last_end = end;
    }

    if !spans.is_empty() {
        tracing::debug!(masked = spans.len(), "Masked false-positive spans");
    }
    (masked, spans)
}

/// True when `[start, end)` touches any masked span.
pub fn overlaps_mask(masks: &[MaskedSpan], start: usize, end: usize) -> bool {
    masks.iter().any(|m| start < m.end() && m.position < end)
}
