// Clean document text before it is placed inside a model prompt.
// Archival scans and scraped pages carry invisible Unicode, stray control
// bytes and, occasionally, text that reads like instructions to a model.

/// Longest document excerpt sent to a model, in characters.
pub const MAX_PROMPT_INPUT_CHARS: usize = 30_000;

const TRUNCATION_MARKER: &str = "…[TRUNCATED]";

/// Line prefixes that impersonate a chat role or a system channel.
const ROLE_MARKERS: &[&str] = &[
    "system:",
    "assistant:",
    "user:",
    "human:",
    "[system]",
    "[assistant]",
    "[inst]",
    "[/inst]",
    "<<sys>>",
    "<|im_start|>",
    "<|im_end|>",
    "note to ai:",
    "instructions:",
    "system update:",
];

/// Phrases that try to replace the extraction instructions.
const OVERRIDE_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "ignore all instructions",
    "ignore the above instructions",
    "disregard your instructions",
    "disregard all instructions",
    "forget your instructions",
    "new instructions:",
    "override extraction:",
    "respond only with",
];

/// Tags that would close or reopen the prompt's document block.
const INSTRUCTION_TAGS: &[&str] = &["<instruction", "</instruction", "<system", "</system", "</document"];

/// Outcome of sanitising one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    pub removed_lines: usize,
    pub truncated: bool,
}

/// Clean `raw` for prompt use. `source_id` only feeds the audit log; the
/// document text itself is never logged.
pub fn sanitize_for_prompt(raw: &str, source_id: &str) -> Sanitized {
    let visible = strip_invisible(raw);
    let (kept, removed_lines) = drop_injection_lines(&visible);
    if removed_lines > 0 {
        tracing::warn!(
            source_id = %source_id,
            removed_lines,
            "Removed instruction-like lines from document input"
        );
    }
    let normalized = normalize_whitespace(&kept);
    let (text, truncated) = truncate_chars(&normalized, MAX_PROMPT_INPUT_CHARS);
    Sanitized {
        text,
        removed_lines,
        truncated,
    }
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
    )
}

/// Drop zero-width and bidi formatting characters plus control bytes,
/// keeping ordinary whitespace.
fn strip_invisible(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, ' ' | '\n' | '\t' | '\r') || !(is_invisible(c) || c.is_control()))
        .collect()
}

fn is_suspicious(lower: &str) -> bool {
    ROLE_MARKERS.iter().any(|m| lower.starts_with(m))
        || INSTRUCTION_TAGS.iter().any(|t| lower.starts_with(t))
        || OVERRIDE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Remove suspicious lines. An override phrase split across two lines
/// removes both halves.
fn drop_injection_lines(text: &str) -> (String, usize) {
    let lines: Vec<&str> = text.lines().collect();
    let lowered: Vec<String> = lines.iter().map(|l| l.trim().to_lowercase()).collect();
    let mut keep = vec![true; lines.len()];

    for i in 0..lines.len() {
        if is_suspicious(&lowered[i]) {
            keep[i] = false;
            continue;
        }
        if let Some(next) = lowered.get(i + 1) {
            if !is_suspicious(next) {
                let joined = format!("{} {}", lowered[i], next);
                if OVERRIDE_PHRASES.iter().any(|p| joined.contains(p)) {
                    keep[i] = false;
                    keep[i + 1] = false;
                }
            }
        }
    }

    let removed = keep.iter().filter(|k| !**k).count();
    let kept = lines
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(l, _)| *l)
        .collect::<Vec<_>>()
        .join("\n");
    (kept, removed)
}

/// Trim every line and collapse runs of blank lines into one.
fn normalize_whitespace(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last() == Some(&"") {
        out.pop();
    }
    out.join("\n")
}

/// Cut to `max_chars`, backing up to the last whitespace when possible.
fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return (text.to_string(), false);
    };
    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };
    (format!("{head}{TRUNCATION_MARKER}"), true)
}
