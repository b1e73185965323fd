// Post-parse checks on model output before it is returned to the caller.
// Everything a model reports must be traceable to the document text; items
// that are not are dropped, and list sizes are capped.

use crate::models::ExtractionResult;

/// Maximum plausible dates from a single document.
const MAX_DATES: usize = 100;

/// Maximum plausible entries in each of people, organizations and locations.
const MAX_PEOPLE: usize = 50;
const MAX_ORGANIZATIONS: usize = 50;
const MAX_LOCATIONS: usize = 50;

const MAX_KEY_FACTS: usize = 20;

/// Maximum plausible total across all structured lists.
const MAX_TOTAL_ENTITIES: usize = 200;

/// Ground `result` against `source` and cap its lists. Warnings are
/// appended to `result.warnings`.
pub fn validate_extraction(result: &mut ExtractionResult, source: &str, source_id: &str) {
    let mut warnings = Vec::new();
    let haystack = normalize_for_match(source);

    drop_ungrounded(result, &haystack, &mut warnings);
    cap_entity_counts(result, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            source_id = %source_id,
            warning_count = warnings.len(),
            "Model output failed validation"
        );
    }
    result.warnings.extend(warnings);
}

/// Lowercase, fold typographic quotes and dashes, collapse whitespace.
fn normalize_for_match(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        let c = match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2010}'..='\u{2015}' => '-',
            other => other,
        };
        out.extend(c.to_lowercase());
    }
    out
}

fn is_grounded(needle: &str, haystack: &str) -> bool {
    let needle = normalize_for_match(needle);
    !needle.is_empty() && haystack.contains(&needle)
}

/// Keep only grounded mentions. An entry survives if its name or any
/// mention occurs in the document; it always keeps at least one mention.
fn ground_mentions(name: &str, mentions: &mut Vec<String>, haystack: &str, warnings: &mut Vec<String>) -> bool {
    let before = mentions.len();
    mentions.retain(|m| is_grounded(m, haystack));
    let name_found = is_grounded(name, haystack);
    if !name_found && mentions.is_empty() {
        return false;
    }
    let removed = before - mentions.len();
    if removed > 0 {
        warnings.push(format!("Removed {removed} mentions of '{name}' not found in document"));
    }
    if mentions.is_empty() {
        mentions.push(name.to_string());
    }
    true
}

fn drop_ungrounded(result: &mut ExtractionResult, haystack: &str, warnings: &mut Vec<String>) {
    result.dates.retain(|d| {
        let keep = is_grounded(&d.raw_text, haystack);
        if !keep {
            warnings.push(format!("Dropped date '{}' not found in document", d.raw_text));
        }
        keep
    });
    result.people.retain_mut(|p| {
        let keep = ground_mentions(&p.name, &mut p.mentions, haystack, warnings);
        if !keep {
            warnings.push(format!("Dropped person '{}' not found in document", p.name));
        }
        keep
    });
    result.organizations.retain_mut(|o| {
        let keep = ground_mentions(&o.name, &mut o.mentions, haystack, warnings);
        if !keep {
            warnings.push(format!("Dropped organization '{}' not found in document", o.name));
        }
        keep
    });
    result.locations.retain_mut(|l| {
        let keep = ground_mentions(&l.name, &mut l.mentions, haystack, warnings);
        if !keep {
            warnings.push(format!("Dropped location '{}' not found in document", l.name));
        }
        keep
    });
}

fn cap<T>(items: &mut Vec<T>, max: usize, label: &str, warnings: &mut Vec<String>) {
    if items.len() > max {
        warnings.push(format!("Excessive {label} ({}) capped to {max}", items.len()));
        items.truncate(max);
    }
}

/// Cap list sizes to plausible maximums.
fn cap_entity_counts(result: &mut ExtractionResult, warnings: &mut Vec<String>) {
    cap(&mut result.dates, MAX_DATES, "dates", warnings);
    cap(&mut result.people, MAX_PEOPLE, "people", warnings);
    cap(&mut result.organizations, MAX_ORGANIZATIONS, "organizations", warnings);
    cap(&mut result.locations, MAX_LOCATIONS, "locations", warnings);
    cap(&mut result.key_facts, MAX_KEY_FACTS, "key facts", warnings);

    let total = result.entity_count();
    if total > MAX_TOTAL_ENTITIES {
        warnings.push(format!(
            "Excessive total entities ({total}) exceeds plausibility limit of {MAX_TOTAL_ENTITIES}"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DateCategory, DatePrecision, ExtractedDate, ExtractedOrganization, ExtractedPerson,
        OrganizationType, PersonRole,
    };

    fn date(raw: &str, parsed: &str) -> ExtractedDate {
        ExtractedDate {
            raw_text: raw.into(),
            parsed_date: parsed.into(),
            parsed_date_end: None,
            precision: DatePrecision::Year,
            category: DateCategory::Unknown,
            confidence: 0.8,
            context: raw.into(),
            is_approximate: false,
        }
    }

    fn person(name: &str, mentions: &[&str]) -> ExtractedPerson {
        ExtractedPerson {
            name: name.into(),
            role: PersonRole::Unknown,
            mentions: mentions.iter().map(|m| m.to_string()).collect(),
            confidence: 0.7,
        }
    }

    #[test]
    fn fabricated_date_is_dropped() {
        let mut result = ExtractionResult {
            dates: vec![date("March 4, 1850", "1850-03-04"), date("1923", "1923")],
            ..Default::default()
        };
        validate_extraction(&mut result, "The factory was built in 1923.", "doc");
        assert_eq!(result.dates.len(), 1);
        assert_eq!(result.dates[0].parsed_date, "1923");
        assert_eq!(result.warnings, vec!["Dropped date 'March 4, 1850' not found in document"]);
    }

    #[test]
    fn matching_ignores_case_spacing_and_typography() {
        let source = "Signed by  O\u{2019}Brien on\nMay 3,\t1923 at the\u{2013}mill.";
        let mut result = ExtractionResult {
            dates: vec![date("may 3, 1923", "1923-05-03")],
            people: vec![person("O'Brien", &[])],
            ..Default::default()
        };
        validate_extraction(&mut result, source, "doc");
        assert_eq!(result.dates.len(), 1);
        assert_eq!(result.people.len(), 1);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn entities_need_a_grounded_name_or_mention() {
        let source = "Mr. Larkin founded the Larkin Company in Buffalo.";
        let mut result = ExtractionResult {
            people: vec![
                person("John D. Larkin", &["Mr. Larkin", "J. D. Larkin"]),
                person("Frank Lloyd Wright", &["Wright"]),
            ],
            organizations: vec![ExtractedOrganization {
                name: "Larkin Company".into(),
                org_type: OrganizationType::Company,
                mentions: vec!["Larkin Co.".into()],
                confidence: 0.9,
            }],
            ..Default::default()
        };
        validate_extraction(&mut result, source, "doc");

        assert_eq!(result.people.len(), 1);
        assert_eq!(result.people[0].mentions, vec!["Mr. Larkin"]);
        assert_eq!(result.organizations[0].mentions, vec!["Larkin Company"]);
        assert!(result
            .warnings
            .contains(&"Dropped person 'Frank Lloyd Wright' not found in document".to_string()));
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn oversized_lists_are_capped() {
        let mut result = ExtractionResult {
            dates: (0..MAX_DATES + 20).map(|_| date("1923", "1923")).collect(),
            key_facts: (0..30).map(|i| format!("fact {i}")).collect(),
            ..Default::default()
        };
        validate_extraction(&mut result, "Built in 1923.", "doc");
        assert_eq!(result.dates.len(), MAX_DATES);
        assert_eq!(result.key_facts.len(), MAX_KEY_FACTS);
        assert_eq!(
            result.warnings,
            vec![
                format!("Excessive dates ({}) capped to {MAX_DATES}", MAX_DATES + 20),
                format!("Excessive key facts (30) capped to {MAX_KEY_FACTS}"),
            ]
        );
    }
}
