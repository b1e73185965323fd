//! Informal date expressions with a historical bias.
//!
//! Two-digit years resolve into the 1900s. Approximation markers ("circa",
//! "late", "mid-") are kept as `is_approximate` instead of being dropped.
//! No rule touches a span the explicit pass already took. Structured rules
//! may report overlapping variants of one expression ("3rd of March 1968"
//! and "March 1968"); the overlap merge picks between them. The bare-year
//! fallbacks only claim spans nothing else matched.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};

use super::types::{
    expand_two_digit_year, month_number, CandidateKind, DateCandidate, ABBR_MONTHS, FULL_MONTHS,
};
use crate::models::DatePrecision;

const YEAR: &str = r"1[6-9]\d{2}|20\d{2}";

/// Date fields resolved from one match, before the span is attached.
#[derive(Debug, Clone, PartialEq)]
struct Resolved {
    year: i32,
    parsed_date: String,
    end_year: Option<i32>,
    precision: DatePrecision,
    is_approximate: bool,
    kind: CandidateKind,
}

impl Resolved {
    fn year_only(
        year: i32,
        end_year: Option<i32>,
        precision: DatePrecision,
        is_approximate: bool,
        kind: CandidateKind,
    ) -> Self {
        Self {
            year,
            parsed_date: format!("{year:04}"),
            end_year,
            precision,
            is_approximate,
            kind,
        }
    }
}

type Resolver = fn(&Captures<'_>, i32) -> Option<Resolved>;

struct FlexibleRule {
    name: &'static str,
    regex: Regex,
    resolve: Resolver,
    fallback: bool,
}

fn rule(name: &'static str, pattern: &str, resolve: Resolver) -> FlexibleRule {
    FlexibleRule {
        name,
        regex: Regex::new(pattern).expect("Invalid flexible date regex"),
        resolve,
        fallback: false,
    }
}

fn fallback(name: &'static str, pattern: &str, resolve: Resolver) -> FlexibleRule {
    FlexibleRule {
        fallback: true,
        ..rule(name, pattern, resolve)
    }
}

static RULES: LazyLock<Vec<FlexibleRule>> = LazyLock::new(|| {
    let months = format!("{FULL_MONTHS}|{ABBR_MONTHS}");
    vec![
        rule(
            "day_month_year",
            &format!(
                r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({months})\.?,?\s+(\d{{4}}|'\d{{2}})\b"
            ),
            |c, _| exact_date(year_token(group(c, 3)?)?, group(c, 2)?, num(c, 1)?),
        ),
        rule(
            "month_day_year",
            &format!(
                r"(?i)\b({months})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}}|'\d{{2}})\b"
            ),
            |c, _| exact_date(year_token(group(c, 3)?)?, group(c, 1)?, num(c, 2)?),
        ),
        rule(
            "short_numeric",
            r"\b(\d{1,2})/(\d{1,2})/(\d{2})\b",
            |c, _| {
                let (a, b) = (num(c, 1)?, num(c, 2)?);
                let (month, day) = if a > 12 && b <= 12 { (b, a) } else { (a, b) };
                let year = expand_two_digit_year(num(c, 3)?);
                let date = NaiveDate::from_ymd_opt(year, month, day)?;
                Some(Resolved {
                    year,
                    parsed_date: date.format("%Y-%m-%d").to_string(),
                    end_year: None,
                    precision: DatePrecision::Exact,
                    is_approximate: false,
                    kind: CandidateKind::FlexibleExact,
                })
            },
        ),
        rule(
            "month_year",
            &format!(r"(?i)\b({months})\.?,?\s+(\d{{4}}|'\d{{2}})\b"),
            |c, _| {
                let month = month_number(group(c, 1)?)?;
                let year = year_token(group(c, 2)?)?;
                Some(Resolved {
                    year,
                    parsed_date: format!("{year:04}-{month:02}"),
                    end_year: None,
                    precision: DatePrecision::Month,
                    is_approximate: false,
                    kind: CandidateKind::FlexibleMonth,
                })
            },
        ),
        rule(
            "between_range",
            &format!(r"(?i)\bbetween\s+({YEAR})\s+and\s+({YEAR})\b"),
            |c, _| year_range(num(c, 1)? as i32, group(c, 2)?),
        ),
        rule(
            "year_range",
            &format!(
                r"(?i)\b(?:from\s+)?({YEAR})\s*(?:-|–|—|to|until|through|thru)\s*({YEAR}|\d{{2}})\b"
            ),
            |c, _| year_range(num(c, 1)? as i32, group(c, 2)?),
        ),
        rule(
            "century",
            r"(?i)\b(?:(early|mid|late)[\s-]+)?(\d{1,2})(?:st|nd|rd|th)[\s-]+century\b",
            |c, _| {
                let ordinal = num(c, 2)? as i32;
                if !(1..=21).contains(&ordinal) {
                    return None;
                }
                let (start, end) = century_span((ordinal - 1) * 100, c.get(1).map(|m| m.as_str()));
                Some(Resolved::year_only(
                    start,
                    Some(end),
                    DatePrecision::Approximate,
                    true,
                    CandidateKind::Approximate,
                ))
            },
        ),
        rule(
            "decade",
            r"(?i)\b(?:(early|mid|late)[\s-]+)?(1[6-9]\d0|20\d0)'?s\b",
            |c, _| decade(num(c, 2)? as i32, c.get(1).map(|m| m.as_str())),
        ),
        rule(
            "short_decade",
            r"(?i)(?:\b(early|mid|late)[\s-]+)?'(\d)0s\b",
            |c, _| decade(1900 + 10 * num(c, 2)? as i32, c.get(1).map(|m| m.as_str())),
        ),
        rule(
            "approximate_year",
            &format!(
                r"(?i)\b(?:circa|c\.|ca\.|around|about|approximately|roughly)\s*({YEAR})\b"
            ),
            |c, _| {
                Some(Resolved::year_only(
                    num(c, 1)? as i32,
                    None,
                    DatePrecision::Approximate,
                    true,
                    CandidateKind::Approximate,
                ))
            },
        ),
        rule(
            "years_ago",
            r"(?i)\b(\d{1,3}|an?|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|fifteen|twenty|thirty|forty|fifty)\s+(years?|decades?)\s+ago\b",
            |c, reference_year| {
                let count = count_word(group(c, 1)?)?;
                let per = if group(c, 2)?.to_lowercase().starts_with("decade") {
                    10
                } else {
                    1
                };
                relative(reference_year - count * per)
            },
        ),
        rule(
            "last_year",
            r"(?i)\blast\s+year\b",
            |_, reference_year| relative(reference_year - 1),
        ),
        fallback(
            "apostrophe_year",
            r"(?:^|[^\w'])('\d{2})\b",
            |c, _| {
                Some(Resolved::year_only(
                    year_token(group(c, 1)?)?,
                    None,
                    DatePrecision::Year,
                    false,
                    CandidateKind::BareYear,
                ))
            },
        ),
        fallback(
            "bare_year",
            &format!(r"\b({YEAR})\b"),
            |c, _| {
                Some(Resolved::year_only(
                    num(c, 1)? as i32,
                    None,
                    DatePrecision::Year,
                    false,
                    CandidateKind::BareYear,
                ))
            },
        ),
    ]
});

fn group<'t>(caps: &Captures<'t>, idx: usize) -> Option<&'t str> {
    caps.get(idx).map(|m| m.as_str())
}

fn num(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    group(caps, idx)?.parse().ok()
}

/// `1923` or `'23`.
fn year_token(token: &str) -> Option<i32> {
    match token.strip_prefix('\'') {
        Some(short) => short.parse().ok().map(expand_two_digit_year),
        None => token.parse().ok(),
    }
}

fn exact_date(year: i32, month_name: &str, day: u32) -> Option<Resolved> {
    let month = month_number(month_name)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Resolved {
        year,
        parsed_date: date.format("%Y-%m-%d").to_string(),
        end_year: None,
        precision: DatePrecision::Exact,
        is_approximate: false,
        kind: CandidateKind::FlexibleExact,
    })
}

/// `end` may be a full year or the last two digits ("1920-25").
fn year_range(start: i32, end: &str) -> Option<Resolved> {
    let end: i32 = end.parse().ok()?;
    let end = if end < 100 { start / 100 * 100 + end } else { end };
    if end <= start {
        return None;
    }
    Some(Resolved::year_only(
        start,
        Some(end),
        DatePrecision::Year,
        false,
        CandidateKind::Range,
    ))
}

fn century_span(start: i32, modifier: Option<&str>) -> (i32, i32) {
    match modifier.map(str::to_lowercase).as_deref() {
        Some("early") => (start, start + 33),
        Some("mid") => (start + 34, start + 66),
        Some("late") => (start + 67, start + 99),
        _ => (start, start + 99),
    }
}

/// "1920s" is a decade; "1800s" reads as a century.
fn decade(start: i32, modifier: Option<&str>) -> Option<Resolved> {
    if start % 100 == 0 {
        let (from, to) = century_span(start, modifier);
        return Some(Resolved::year_only(
            from,
            Some(to),
            DatePrecision::Approximate,
            true,
            CandidateKind::Approximate,
        ));
    }
    let resolved = match modifier.map(str::to_lowercase).as_deref() {
        Some("early") => (start, start + 3),
        Some("mid") => (start + 4, start + 6),
        Some("late") => (start + 7, start + 9),
        _ => {
            return Some(Resolved::year_only(
                start,
                Some(start + 9),
                DatePrecision::Decade,
                false,
                CandidateKind::Decade,
            ))
        }
    };
    Some(Resolved::year_only(
        resolved.0,
        Some(resolved.1),
        DatePrecision::Approximate,
        true,
        CandidateKind::Approximate,
    ))
}

fn relative(year: i32) -> Option<Resolved> {
    Some(Resolved::year_only(
        year,
        None,
        DatePrecision::Approximate,
        true,
        CandidateKind::Relative,
    ))
}

fn count_word(word: &str) -> Option<i32> {
    let lower = word.to_lowercase();
    let n = match lower.as_str() {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "fifteen" => 15,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        digits => return digits.parse().ok(),
    };
    Some(n)
}

/// Find informal dates in `masked`, skipping anything that overlaps
/// `taken` (the explicit pass). Output may contain overlapping variants.
/// Relative expressions resolve against `reference`.
pub fn find_flexible_dates(
    source: &str,
    masked: &str,
    taken: &[DateCandidate],
    reference: NaiveDate,
) -> Vec<DateCandidate> {
    let reference_year = reference.year();
    let mut found: Vec<DateCandidate> = Vec::new();

    for rule in RULES.iter() {
        for caps in rule.regex.captures_iter(masked) {
            let Some(whole) = caps.get(0) else { continue };
            // The apostrophe rule consumes one leading separator; the date
            // itself is group 1.
            let span = if rule.name == "apostrophe_year" {
                caps.get(1).unwrap_or(whole)
            } else {
                whole
            };
            let (start, end) = (span.start(), span.end());
            let clash = taken.iter().any(|c| c.overlaps(start, end))
                || (rule.fallback && found.iter().any(|c| c.overlaps(start, end)));
            if clash {
                continue;
            }
            let Some(resolved) = (rule.resolve)(&caps, reference_year) else {
                continue;
            };
            found.push(DateCandidate {
                start,
                end,
                raw_text: source[start..end].to_string(),
                year: resolved.year,
                parsed_date: resolved.parsed_date,
                parsed_date_end: resolved.end_year.map(|y| format!("{y:04}")),
                end_year: resolved.end_year,
                precision: resolved.precision,
                is_approximate: resolved.is_approximate,
                kind: resolved.kind,
            });
            tracing::trace!(rule = rule.name, start, end, "Flexible date candidate");
        }
    }

    found.sort_by_key(|c| c.start);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn find(text: &str) -> Vec<DateCandidate> {
        find_flexible_dates(text, text, &[], reference())
    }

    fn one(text: &str) -> DateCandidate {
        let found = find(text);
        assert_eq!(found.len(), 1, "{text}: {found:?}");
        found.into_iter().next().unwrap()
    }

    #[test]
    fn day_of_month_with_ordinal() {
        let found = find("Married on the 3rd of March 1968.");
        assert_eq!(found.len(), 2, "{found:?}");
        let d = &found[0];
        assert_eq!(d.parsed_date, "1968-03-03");
        assert_eq!(d.raw_text, "3rd of March 1968");
        assert_eq!(d.kind, CandidateKind::FlexibleExact);
        // The month-year reading of the same words is kept for the merge.
        assert_eq!(found[1].raw_text, "March 1968");
        assert_eq!(found[1].kind, CandidateKind::FlexibleMonth);
    }

    #[test]
    fn bare_year_never_doubles_a_structured_match() {
        let found = find("Rebuilt circa 1920 after the fire.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CandidateKind::Approximate);
    }

    #[test]
    fn abbreviated_month_and_two_digit_year() {
        let d = one("Dated Sept. 4, '44 on the back.");
        assert_eq!(d.parsed_date, "1944-09-04");
    }

    #[test]
    fn short_numeric_date_is_historical() {
        let d = one("stamped 3/4/68");
        assert_eq!(d.parsed_date, "1968-03-04");
        assert_eq!(d.precision, DatePrecision::Exact);
    }

    #[test]
    fn abbreviated_month_year() {
        let d = one("Closed Dec 1941.");
        assert_eq!(d.parsed_date, "1941-12");
        assert_eq!(d.precision, DatePrecision::Month);
    }

    #[test]
    fn year_ranges() {
        let d = one("operated from 1920 to 1925");
        assert_eq!(d.raw_text, "from 1920 to 1925");
        assert_eq!(d.parsed_date_end.as_deref(), Some("1925"));

        let d = one("built 1920-25");
        assert_eq!(d.parsed_date, "1920");
        assert_eq!(d.parsed_date_end.as_deref(), Some("1925"));

        let d = one("between 1931 and 1934");
        assert_eq!(d.kind, CandidateKind::Range);
        assert_eq!(d.end_year, Some(1934));
    }

    #[test]
    fn backwards_range_falls_back_to_bare_years() {
        let found = find("1925-1920");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.kind == CandidateKind::BareYear));
    }

    #[test]
    fn late_decade_is_approximate() {
        let d = one("Abandoned since the late 1970s.");
        assert_eq!(d.raw_text, "late 1970s");
        assert_eq!(d.parsed_date, "1977");
        assert_eq!(d.parsed_date_end.as_deref(), Some("1979"));
        assert!(d.is_approximate);
        assert_eq!(d.precision, DatePrecision::Approximate);
    }

    #[test]
    fn plain_decade() {
        let d = one("Popular in the 1920s.");
        assert_eq!(d.precision, DatePrecision::Decade);
        assert_eq!(d.parsed_date_end.as_deref(), Some("1929"));
        assert!(!d.is_approximate);
    }

    #[test]
    fn mid_decade_with_hyphen_and_short_decade() {
        let d = one("closed in the mid-1950s");
        assert_eq!((d.year, d.end_year), (1954, Some(1956)));
        let d = one("a fad of the early '60s");
        assert_eq!((d.year, d.end_year), (1960, Some(1963)));
    }

    #[test]
    fn hundreds_read_as_century() {
        let d = one("built in the late 1800s");
        assert_eq!((d.year, d.end_year), (1867, Some(1899)));
        let d = one("an early 19th century mill");
        assert_eq!((d.year, d.end_year), (1800, Some(1833)));
    }

    #[test]
    fn circa_markers() {
        for text in ["circa 1920", "c. 1920", "ca.1920", "around 1920"] {
            let d = one(text);
            assert_eq!(d.year, 1920, "{text}");
            assert!(d.is_approximate, "{text}");
        }
    }

    #[test]
    fn relative_dates_use_reference() {
        assert_eq!(one("demolished two years ago").year, 2022);
        assert_eq!(one("closed 15 years ago").year, 2009);
        assert_eq!(one("three decades ago").year, 1994);
        assert_eq!(one("renovated last year").year, 2023);
    }

    #[test]
    fn apostrophe_year() {
        let d = one("the flood of '36");
        assert_eq!(d.raw_text, "'36");
        assert_eq!(d.year, 1936);
        assert_eq!(d.kind, CandidateKind::BareYear);
    }

    #[test]
    fn bare_years() {
        let found = find("built in 1923, expanded 1951");
        let years: Vec<i32> = found.iter().map(|c| c.year).collect();
        assert_eq!(years, vec![1923, 1951]);
    }

    #[test]
    fn taken_spans_are_skipped() {
        let text = "Closed in October 1987.";
        let taken = vec![DateCandidate::year_span(
            text,
            10,
            22,
            1987,
            None,
            DatePrecision::Month,
            false,
            CandidateKind::Explicit,
        )];
        assert!(find_flexible_dates(text, text, &taken, reference()).is_empty());
    }

    #[test]
    fn out_of_pattern_years_are_not_candidates() {
        assert!(find("Serial 1234 and 3021").is_empty());
    }
}
