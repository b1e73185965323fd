use crate::models::DatePrecision;

/// How a date candidate was recognised. Drives the pattern factor of the
/// confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Fully qualified: ISO, numeric, spelled month with day and/or year.
    Explicit,
    /// Informal but complete: "3rd of March 1968", "3/4/68".
    FlexibleExact,
    /// Abbreviated month with a year: "Sept. 1944".
    FlexibleMonth,
    /// "from 1920 to 1925", "1920-25".
    Range,
    /// "the 1920s".
    Decade,
    /// "circa 1920", "late 1970s", "19th century".
    Approximate,
    /// "two years ago".
    Relative,
    /// A lone year, or an apostrophe year such as '68.
    BareYear,
}

impl CandidateKind {
    /// Pattern confidence. Bare years are resolved from context instead.
    pub fn base_pattern_confidence(&self) -> Option<f32> {
        match self {
            Self::Explicit => Some(1.0),
            Self::FlexibleExact => Some(0.85),
            Self::FlexibleMonth => Some(0.8),
            Self::Range => Some(0.7),
            Self::Decade | Self::Approximate | Self::Relative => Some(0.6),
            Self::BareYear => None,
        }
    }
}

/// A date expression located in the text, before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct DateCandidate {
    /// Byte offsets into the source text.
    pub start: usize,
    pub end: usize,
    pub raw_text: String,
    pub year: i32,
    pub parsed_date: String,
    pub parsed_date_end: Option<String>,
    pub end_year: Option<i32>,
    pub precision: DatePrecision,
    pub is_approximate: bool,
    pub kind: CandidateKind,
}

impl DateCandidate {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }

    /// A year-only candidate covering `[start, end)`.
    #[allow(clippy::too_many_arguments)]
    pub fn year_span(
        text: &str,
        start: usize,
        end: usize,
        year: i32,
        end_year: Option<i32>,
        precision: DatePrecision,
        is_approximate: bool,
        kind: CandidateKind,
    ) -> Self {
        Self {
            start,
            end,
            raw_text: text[start..end].to_string(),
            year,
            parsed_date: format!("{year:04}"),
            parsed_date_end: end_year.map(|y| format!("{y:04}")),
            end_year,
            precision,
            is_approximate,
            kind,
        }
    }
}

/// Month number for a full or abbreviated English month name.
pub fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_lowercase();
    let month = match lower.as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Two-digit years always land in the 1900s.
pub fn expand_two_digit_year(yy: u32) -> i32 {
    1900 + (yy % 100) as i32
}

pub const FULL_MONTHS: &str =
    "january|february|march|april|may|june|july|august|september|october|november|december";
pub const ABBR_MONTHS: &str = "jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";
