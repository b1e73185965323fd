//! Category keyword tables and nearest-keyword lookup.

use std::sync::LazyLock;

use regex::Regex;

use super::sentence::sentence_bounds;
use crate::models::DateCategory;

/// Keyword families per category. Multi-word phrases allow any whitespace
/// between words.
const CATEGORY_KEYWORDS: &[(DateCategory, &[&str])] = &[
    (
        DateCategory::BuildDate,
        &[
            "built", "constructed", "erected", "established", "founded", "completed",
            "construction", "dating from", "dates from", "dates back to", "dating to",
        ],
    ),
    (
        DateCategory::Opening,
        &[
            "opened", "inaugurated", "began operations", "first opened", "doors opened",
            "grand opening", "ribbon cutting", "opening",
        ],
    ),
    (
        DateCategory::Closure,
        &[
            "closed", "shut down", "abandoned", "ceased operations", "shuttered",
            "went out of business", "closed its doors", "closure", "closing",
        ],
    ),
    (
        DateCategory::Demolition,
        &[
            "demolished", "torn down", "razed", "destroyed", "bulldozed", "leveled",
            "demolition", "wrecking",
        ],
    ),
    (
        DateCategory::Renovation,
        &[
            "renovated", "restored", "refurbished", "rebuilt", "remodeled", "expanded",
            "renovation", "restoration",
        ],
    ),
    (
        DateCategory::Event,
        &[
            "burned", "burned down", "collapsed", "exploded", "fire", "flood", "accident",
            "incident", "disaster", "explosion",
        ],
    ),
    (
        DateCategory::Visit,
        &[
            "visited", "explored", "photographed", "documented", "recorded", "expedition",
            "trip", "tour",
        ],
    ),
    (
        DateCategory::Publication,
        &["published", "posted", "written", "updated", "dated", "article"],
    ),
];

struct CategoryMatcher {
    category: DateCategory,
    regex: Regex,
}

static MATCHERS: LazyLock<Vec<CategoryMatcher>> = LazyLock::new(|| {
    CATEGORY_KEYWORDS
        .iter()
        .map(|(category, words)| {
            let alternation = words
                .iter()
                .map(|w| regex::escape(w).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            CategoryMatcher {
                category: *category,
                regex: Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
                    .expect("Invalid category keyword regex"),
            }
        })
        .collect()
});

/// The category keyword closest to a date span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHit {
    pub category: DateCategory,
    pub keyword: String,
    /// Characters between the keyword and the date span. Zero when adjacent.
    pub distance: usize,
}

fn gap(kw_start: usize, kw_end: usize, start: usize, end: usize) -> usize {
    if kw_end <= start {
        start - kw_end
    } else if kw_start >= end {
        kw_start - end
    } else {
        0
    }
}

/// Nearest category keyword inside `text[window.0..window.1]`, measured
/// against the date span `[start, end)`. Ties go to the earlier table entry.
pub fn nearest_keyword_in(
    text: &str,
    window: (usize, usize),
    start: usize,
    end: usize,
) -> Option<KeywordHit> {
    let scope = text.get(window.0..window.1)?;
    let mut best: Option<KeywordHit> = None;
    for matcher in MATCHERS.iter() {
        for m in matcher.regex.find_iter(scope) {
            let kw_start = window.0 + m.start();
            let kw_end = window.0 + m.end();
            let distance = gap(kw_start, kw_end, start, end);
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(KeywordHit {
                    category: matcher.category,
                    keyword: m.as_str().to_lowercase(),
                    distance,
                });
            }
        }
    }
    best
}

/// Nearest category keyword within the sentence that contains the date.
pub fn detect_category(text: &str, start: usize, end: usize) -> Option<KeywordHit> {
    let window = sentence_bounds(text, start);
    nearest_keyword_in(text, window, start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_of(text: &str, needle: &str) -> Option<DateCategory> {
        let start = text.find(needle).unwrap();
        detect_category(text, start, start + needle.len()).map(|h| h.category)
    }

    #[test]
    fn every_family_is_detected() {
        let cases = [
            ("The factory was built in 1923.", DateCategory::BuildDate),
            ("The hotel opened in 1931.", DateCategory::Opening),
            ("Abandoned since 1979.", DateCategory::Closure),
            ("The mill was razed in 1988.", DateCategory::Demolition),
            ("The chapel was restored in 1962.", DateCategory::Renovation),
            ("The east wing burned in 1947.", DateCategory::Event),
            ("We photographed it in 2011.", DateCategory::Visit),
            ("Article published 2019.", DateCategory::Publication),
        ];
        for (text, expected) in cases {
            let year = &text[text.find(char::is_numeric).unwrap()..][..4];
            assert_eq!(category_of(text, year), Some(expected), "{text}");
        }
    }

    #[test]
    fn nearest_keyword_wins() {
        let text = "Built in 1890, the school closed in 1972.";
        assert_eq!(category_of(text, "1890"), Some(DateCategory::BuildDate));
        assert_eq!(category_of(text, "1972"), Some(DateCategory::Closure));
    }

    #[test]
    fn distance_is_gap_between_spans() {
        let text = "Published: 04/28/2025";
        let start = text.find("04").unwrap();
        let hit = detect_category(text, start, text.len()).unwrap();
        assert_eq!(hit.category, DateCategory::Publication);
        assert_eq!(hit.distance, 2);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        // "tourism" must not count as "tour", "fired" not as "fire".
        assert_eq!(category_of("Tourism grew after 1950.", "1950"), None);
        assert_eq!(category_of("He fired the clerk in 1950.", "1950"), None);
    }

    #[test]
    fn search_is_limited_to_the_sentence() {
        let text = "It was built long ago. Then in 1950 nothing happened.";
        assert_eq!(category_of(text, "1950"), None);
    }

    #[test]
    fn multi_word_phrases_match() {
        let text = "The plant shut   down in 1982.";
        assert_eq!(category_of(text, "1982"), Some(DateCategory::Closure));
    }
}
