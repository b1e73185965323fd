use std::str::FromStr;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::models::{
    clamp_confidence, DateCategory, DatePrecision, ExtractedDate, ExtractedLocation,
    ExtractedOrganization, ExtractedPerson, ExtractionResult, LocationType, OrganizationType,
    PersonRole,
};

/// Confidence assumed when the model leaves the field out.
const DEFAULT_ITEM_CONFIDENCE: f32 = 0.5;

/// Cut-back rounds tried before a broken object is given up on.
const MAX_REPAIR_ATTEMPTS: usize = 16;

const REPAIRED_WARNING: &str = "Repaired malformed or truncated JSON in model output";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoJsonObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("top-level JSON value is not an object")]
    NotAnObject,
}

/// Parse raw model output into a result. Never fails: unusable output
/// becomes an empty result carrying a warning, and every repaired or
/// dropped field adds one too.
pub fn parse_extraction_response(response: &str) -> ExtractionResult {
    match parse_object(response) {
        Ok((object, repaired)) => {
            let mut result = build_result(&object);
            if repaired {
                tracing::warn!(response_len = response.len(), "Model output was malformed JSON; repaired");
                result.warnings.insert(0, REPAIRED_WARNING.to_string());
            }
            result
        }
        Err(e) => {
            tracing::warn!(error = %e, response_len = response.len(), "Unparseable model output");
            ExtractionResult {
                warnings: vec![format!("Model response could not be parsed: {e}")],
                ..Default::default()
            }
        }
    }
}

/// Decode the model's object. The flag is set when the object only
/// parsed after [`repair_json`].
fn parse_object(response: &str) -> Result<(Map<String, Value>, bool), ParseError> {
    if let Some(json) = locate_json_object(response) {
        return match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(map)) => Ok((map, false)),
            Ok(_) => Err(ParseError::NotAnObject),
            Err(e) => repair_json(json)
                .map(|map| (map, true))
                .ok_or_else(|| ParseError::InvalidJson(e.to_string())),
        };
    }
    // No balanced object: usually output cut off by the token limit.
    let body = strip_code_fence(response);
    let start = body.find('{').ok_or(ParseError::NoJsonObject)?;
    repair_json(&body[start..])
        .map(|map| (map, true))
        .ok_or(ParseError::NoJsonObject)
}

/// Best-effort recovery of a malformed or truncated object. Each round
/// closes whatever is open; if that still does not parse, the fragment is
/// cut back to its last complete element and tried again.
fn repair_json(fragment: &str) -> Option<Map<String, Value>> {
    let mut body = fragment;
    for _ in 0..MAX_REPAIR_ATTEMPTS {
        let closed = close_json(body)?;
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&closed) {
            return Some(map);
        }
        body = &body[..last_cut_point(body)?];
    }
    None
}

/// Close an unterminated string and every open array or object, dropping
/// trailing commas. `None` when brackets are mismatched.
fn close_json(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len() + 8);
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in body.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.pop() != Some(c) {
                    return None;
                }
                strip_trailing_comma(&mut out);
            }
            _ => {}
        }
        out.push(c);
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    strip_trailing_comma(&mut out);
    if out.ends_with(':') {
        out.push_str("null");
    }
    out.extend(closers.iter().rev());
    Some(out)
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(',') {
        out.pop();
    }
}

/// Byte offset to cut `body` back to: just before its last top-level
/// comma or just after its last opening bracket, whichever is later.
fn last_cut_point(body: &str) -> Option<usize> {
    let mut cut = None;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => cut = Some(i),
            '{' | '[' if i + 1 < body.len() => cut = Some(i + 1),
            _ => {}
        }
    }
    cut.filter(|&at| at > 0 && at < body.len())
}

/// Find the outermost `{ ... }` in `response`, skipping code fences and
/// any prose around them. Braces inside JSON strings are ignored.
pub fn locate_json_object(response: &str) -> Option<&str> {
    let body = strip_code_fence(response);
    let start = body.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in body[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_code_fence(response: &str) -> &str {
    let Some(open) = response.find("```") else {
        return response;
    };
    let after = &response[open + 3..];
    // Skip the info string ("json") up to the end of the fence line.
    let content_start = after.find('\n').map_or(0, |n| n + 1);
    let content = &after[content_start..];
    match content.find("```") {
        Some(close) => &content[..close],
        None => content,
    }
}

fn build_result(object: &Map<String, Value>) -> ExtractionResult {
    let mut warnings = Vec::new();

    let dates = items(object, "dates", &mut warnings)
        .into_iter()
        .filter_map(|item| parse_date(item, &mut warnings))
        .collect();
    let people = items(object, "people", &mut warnings)
        .into_iter()
        .filter_map(|item| {
            let (name, mentions, confidence) = named_item(item, "people", &mut warnings)?;
            Some(ExtractedPerson {
                role: coerce(item.get("role"), PersonRole::Unknown, "role", &mut warnings),
                name,
                mentions,
                confidence,
            })
        })
        .collect();
    let organizations = items(object, "organizations", &mut warnings)
        .into_iter()
        .filter_map(|item| {
            let (name, mentions, confidence) = named_item(item, "organizations", &mut warnings)?;
            Some(ExtractedOrganization {
                org_type: coerce(item.get("type"), OrganizationType::Unknown, "type", &mut warnings),
                name,
                mentions,
                confidence,
            })
        })
        .collect();
    let locations = items(object, "locations", &mut warnings)
        .into_iter()
        .filter_map(|item| {
            let (name, mentions, confidence) = named_item(item, "locations", &mut warnings)?;
            Some(ExtractedLocation {
                location_type: coerce(item.get("type"), LocationType::Unknown, "type", &mut warnings),
                name,
                mentions,
                confidence,
            })
        })
        .collect();

    let summary = non_empty_str(object.get("summary")).map(str::to_string);
    let key_facts = object
        .get("keyFacts")
        .and_then(Value::as_array)
        .map(|facts| {
            facts
                .iter()
                .filter_map(|f| non_empty_str(Some(f)).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if !warnings.is_empty() {
        tracing::warn!(repairs = warnings.len(), "Model output needed repair");
    }

    ExtractionResult {
        dates,
        people,
        organizations,
        locations,
        summary,
        key_facts,
        warnings,
        ..Default::default()
    }
}

/// Object entries of the array at `key`. A missing key is an empty list;
/// a non-array value or non-object entry is skipped with a warning.
fn items<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    warnings: &mut Vec<String>,
) -> Vec<&'a Map<String, Value>> {
    let entries: &'a [Value] = match object.get(key) {
        None | Some(Value::Null) => &[],
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            warnings.push(format!("'{key}' is not an array; ignored"));
            &[]
        }
    };
    let skipped = entries.iter().filter(|v| !v.is_object()).count();
    if skipped > 0 {
        warnings.push(format!("Skipped {skipped} non-object entries in '{key}'"));
    }
    entries.iter().filter_map(Value::as_object).collect()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse an enum field, falling back to `default` for missing or unknown
/// values. Matching is case-insensitive and accepts spaces or dashes for
/// underscores ("Build Date" reads as `build_date`).
fn coerce<T: FromStr>(value: Option<&Value>, default: T, field: &str, warnings: &mut Vec<String>) -> T {
    let Some(raw) = non_empty_str(value) else {
        return default;
    };
    let normalized = raw.to_lowercase().replace([' ', '-'], "_");
    match normalized.parse() {
        Ok(v) => v,
        Err(_) => {
            warnings.push(format!("Unknown {field} '{raw}'; using default"));
            default
        }
    }
}

/// Normalise a model-reported confidence. Numbers above 1 are read as
/// percentages. Numeric strings are accepted.
pub fn normalize_confidence(value: Option<&Value>) -> f32 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v > 1.0 => clamp_confidence((v / 100.0) as f32),
        Some(v) => clamp_confidence(v as f32),
        None => DEFAULT_ITEM_CONFIDENCE,
    }
}

fn named_item(
    item: &Map<String, Value>,
    list: &str,
    warnings: &mut Vec<String>,
) -> Option<(String, Vec<String>, f32)> {
    let Some(name) = non_empty_str(item.get("name")) else {
        warnings.push(format!("Dropped entry in '{list}' without a name"));
        return None;
    };
    let mut mentions: Vec<String> = item
        .get("mentions")
        .and_then(Value::as_array)
        .map(|m| {
            m.iter()
                .filter_map(|v| non_empty_str(Some(v)).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if mentions.is_empty() {
        mentions.push(name.to_string());
    }
    Some((name.to_string(), mentions, normalize_confidence(item.get("confidence"))))
}

fn parse_date(item: &Map<String, Value>, warnings: &mut Vec<String>) -> Option<ExtractedDate> {
    let Some(raw_text) = non_empty_str(item.get("rawText")) else {
        warnings.push("Dropped date without rawText".into());
        return None;
    };
    let Some(parsed_date) = non_empty_str(item.get("parsedDate")) else {
        warnings.push(format!("Dropped date '{raw_text}' without parsedDate"));
        return None;
    };
    let Some(shape) = iso_shape(parsed_date) else {
        warnings.push(format!("Dropped date '{raw_text}' with invalid parsedDate '{parsed_date}'"));
        return None;
    };

    let declared = coerce(item.get("precision"), shape, "precision", warnings);
    let precision = if declared.iso_len() == parsed_date.len() {
        declared
    } else {
        warnings.push(format!(
            "Precision '{declared}' does not match '{parsed_date}'; using '{shape}'"
        ));
        shape
    };

    let parsed_date_end = match non_empty_str(item.get("parsedDateEnd")) {
        Some(end) if iso_shape(end).is_some() => Some(end.to_string()),
        Some(end) => {
            warnings.push(format!("Ignored invalid parsedDateEnd '{end}'"));
            None
        }
        None => None,
    };

    let is_approximate = item
        .get("isApproximate")
        .and_then(Value::as_bool)
        .unwrap_or(matches!(precision, DatePrecision::Decade | DatePrecision::Approximate));

    Some(ExtractedDate {
        raw_text: raw_text.to_string(),
        parsed_date: parsed_date.to_string(),
        parsed_date_end,
        precision,
        category: coerce(item.get("category"), DateCategory::Unknown, "category", warnings),
        confidence: normalize_confidence(item.get("confidence")),
        context: non_empty_str(item.get("context")).unwrap_or(raw_text).to_string(),
        is_approximate,
    })
}

/// Precision implied by an ISO date string, or `None` when it is not a
/// real `YYYY`, `YYYY-MM` or `YYYY-MM-DD` date.
fn iso_shape(s: &str) -> Option<DatePrecision> {
    let digits = |part: &str, len: usize| part.len() == len && part.bytes().all(|b| b.is_ascii_digit());
    match s.len() {
        4 if digits(s, 4) => Some(DatePrecision::Year),
        7 => {
            let (year, month) = s.split_once('-')?;
            let month_ok = digits(month, 2) && (1..=12).contains(&month.parse::<u32>().ok()?);
            (digits(year, 4) && month_ok).then_some(DatePrecision::Month)
        }
        10 => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(|_| DatePrecision::Exact),
        _ => None,
    }
}
