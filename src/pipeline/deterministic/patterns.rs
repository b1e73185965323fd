//! Explicit, fully qualified date formats. These bypass flexible parsing.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use super::types::{month_number, CandidateKind, DateCandidate, FULL_MONTHS};
use crate::models::DatePrecision;

static ISO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("Invalid ISO date regex")
});

/// `MM/DD/YYYY` (also `-`). Day-first when the first number cannot be a month.
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})([/-])(\d{1,2})([/-])(\d{4})\b").expect("Invalid numeric date regex")
});

static SPELLED_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({FULL_MONTHS})\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
    ))
    .expect("Invalid spelled date regex")
});

static MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({FULL_MONTHS}),?\s+(\d{{4}})\b"))
        .expect("Invalid month-year regex")
});

/// "5th of" / "5" right before a month name. Those belong to the flexible
/// parser, which keeps the day.
static DAY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,2}(?:st|nd|rd|th)?\s+(?:of\s+)?$").expect("Invalid day prefix regex")
});

fn num(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

fn exact(
    source: &str,
    start: usize,
    end: usize,
    year: i32,
    month: u32,
    day: u32,
) -> Option<DateCandidate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(DateCandidate {
        start,
        end,
        raw_text: source[start..end].to_string(),
        year,
        parsed_date: date.format("%Y-%m-%d").to_string(),
        parsed_date_end: None,
        end_year: None,
        precision: DatePrecision::Exact,
        is_approximate: false,
        kind: CandidateKind::Explicit,
    })
}

fn preceded_by_day(masked: &str, start: usize) -> bool {
    let mut from = start.saturating_sub(24);
    while !masked.is_char_boundary(from) {
        from -= 1;
    }
    DAY_PREFIX.is_match(&masked[from..start])
}

fn push_unique(found: &mut Vec<DateCandidate>, candidate: Option<DateCandidate>) {
    if let Some(c) = candidate {
        if !found.iter().any(|f| f.overlaps(c.start, c.end)) {
            found.push(c);
        }
    }
}

/// Find explicit dates. `masked` is the pre-filtered text and must have the
/// same byte layout as `source`.
pub fn find_explicit_dates(source: &str, masked: &str) -> Vec<DateCandidate> {
    let mut found = Vec::new();

    for caps in ISO.captures_iter(masked) {
        let Some(m) = caps.get(0) else { continue };
        let candidate = (|| {
            let year = num(&caps, 1)? as i32;
            exact(source, m.start(), m.end(), year, num(&caps, 2)?, num(&caps, 3)?)
        })();
        push_unique(&mut found, candidate);
    }

    for caps in NUMERIC.captures_iter(masked) {
        let Some(m) = caps.get(0) else { continue };
        // Mixed separators ("4/28-2025") are not a date.
        if caps.get(2).map(|s| s.as_str()) != caps.get(4).map(|s| s.as_str()) {
            continue;
        }
        let candidate = (|| {
            let (a, b) = (num(&caps, 1)?, num(&caps, 3)?);
            let year = num(&caps, 5)? as i32;
            let (month, day) = if a > 12 && b <= 12 { (b, a) } else { (a, b) };
            exact(source, m.start(), m.end(), year, month, day)
        })();
        push_unique(&mut found, candidate);
    }

    for caps in SPELLED_DAY.captures_iter(masked) {
        let Some(m) = caps.get(0) else { continue };
        let candidate = (|| {
            let month = month_number(caps.get(1)?.as_str())?;
            let year = num(&caps, 3)? as i32;
            exact(source, m.start(), m.end(), year, month, num(&caps, 2)?)
        })();
        push_unique(&mut found, candidate);
    }

    for caps in MONTH_YEAR.captures_iter(masked) {
        let Some(m) = caps.get(0) else { continue };
        if preceded_by_day(masked, m.start()) {
            continue;
        }
        let candidate = (|| {
            let month = month_number(caps.get(1)?.as_str())?;
            let year = num(&caps, 2)? as i32;
            NaiveDate::from_ymd_opt(year, month, 1)?;
            Some(DateCandidate {
                start: m.start(),
                end: m.end(),
                raw_text: source[m.start()..m.end()].to_string(),
                year,
                parsed_date: format!("{year:04}-{month:02}"),
                parsed_date_end: None,
                end_year: None,
                precision: DatePrecision::Month,
                is_approximate: false,
                kind: CandidateKind::Explicit,
            })
        })();
        push_unique(&mut found, candidate);
    }

    found.sort_by_key(|c| c.start);
    found
}
