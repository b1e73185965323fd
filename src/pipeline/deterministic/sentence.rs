//! Sentence lookup for date context.

use std::sync::LazyLock;

use regex::Regex;

/// Longest context kept, in characters.
pub const MAX_CONTEXT_CHARS: usize = 500;

static TERMINATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+|[\n\r]{2,}").expect("Invalid terminator regex"));

/// Words whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "c", "ca", "cir", "approx", "mr", "mrs", "ms", "dr", "st", "mt", "ft", "co", "corp", "inc",
    "ltd", "bros", "jr", "sr", "no", "vs", "jan", "feb", "mar", "apr", "jun", "jul", "aug",
    "sep", "sept", "oct", "nov", "dec", "ave", "rd", "blvd", "rev", "gen", "col", "capt", "e.g",
    "i.e",
];

fn is_abbreviation(text: &str, period_at: usize) -> bool {
    let before = &text[..period_at];
    let word_start = before
        .rfind(|c: char| c.is_whitespace() || c == '(' || c == '"')
        .map(|i| i + 1)
        .unwrap_or(0);
    let word = &before[word_start..];
    if word.is_empty() {
        return false;
    }
    // Single capital initial: "J. P. Morgan"
    let mut chars = word.chars();
    if let (Some(first), None) = (chars.next(), chars.next()) {
        if first.is_uppercase() {
            return true;
        }
    }
    let lower = word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}

/// Byte bounds `[start, end)` of the sentence containing `position`.
pub fn sentence_bounds(text: &str, position: usize) -> (usize, usize) {
    let mut start = 0;
    let mut end = text.len();
    for m in TERMINATOR.find_iter(text) {
        let is_period = text[m.start()..].starts_with('.');
        if is_period && is_abbreviation(text, m.start()) {
            continue;
        }
        if m.end() <= position {
            start = m.end();
        } else if m.start() >= position {
            // Keep the punctuation mark itself.
            end = m.start() + 1;
            break;
        }
    }
    (start, end.min(text.len()).max(start))
}

/// The trimmed sentence containing `position`, capped at
/// [`MAX_CONTEXT_CHARS`] characters around the position.
pub fn sentence_at(text: &str, position: usize) -> String {
    let position = position.min(text.len());
    let (start, end) = sentence_bounds(text, position);
    let Some(raw) = text.get(start..end) else {
        return String::new();
    };
    let sentence = raw.trim();
    let char_count = sentence.chars().count();
    if char_count <= MAX_CONTEXT_CHARS {
        return sentence.to_string();
    }

    let relative = position.saturating_sub(start);
    if relative < MAX_CONTEXT_CHARS / 2 {
        let head: String = sentence.chars().take(MAX_CONTEXT_CHARS).collect();
        format!("{head}...")
    } else {
        let tail: String = sentence.chars().skip(char_count - MAX_CONTEXT_CHARS).collect();
        format!("...{tail}")
    }
}
