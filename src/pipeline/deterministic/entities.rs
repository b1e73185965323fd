//! Heuristic people, organization and location extraction.
//!
//! No model involved: capitalised sequences anchored on honorifics, agent
//! phrases ("built by"), institutional suffixes and place suffixes. Roles and
//! types come from keyword tables checked against nearby text.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    ExtractedLocation, ExtractedOrganization, ExtractedPerson, LocationType, OrganizationType,
    PersonRole,
};

/// Bytes either side of a mention searched for role keywords.
const ROLE_WINDOW: usize = 60;

const PERSON_ROLE_KEYWORDS: &[(PersonRole, &[&str])] = &[
    (
        PersonRole::Founder,
        &["founded", "founder", "established by", "started by", "created by"],
    ),
    (
        PersonRole::Owner,
        &["owned", "owner", "proprietor", "purchased by", "bought by"],
    ),
    (
        PersonRole::Architect,
        &["designed", "architect", "designed by", "architectural"],
    ),
    (
        PersonRole::Developer,
        &["developed", "developer", "built by", "constructed by"],
    ),
    (
        PersonRole::Employee,
        &["worked", "employee", "worker", "employed", "staff"],
    ),
    (
        PersonRole::Photographer,
        &["photographed", "photographer", "photo by", "photos by"],
    ),
    (
        PersonRole::Visitor,
        &["visited", "explored", "toured", "explorer"],
    ),
    (
        PersonRole::Historian,
        &["historian", "researcher", "documented", "chronicled"],
    ),
];

const ORG_TYPE_KEYWORDS: &[(OrganizationType, &[&str])] = &[
    (
        OrganizationType::Company,
        &[
            "company", "corporation", "corp", "inc", "llc", "factory", "plant", "mill",
            "manufacturing", "works", "railroad", "railway", "brewery", "bank",
        ],
    ),
    (
        OrganizationType::Hospital,
        &["hospital", "medical", "clinic", "health", "sanatorium", "asylum", "infirmary"],
    ),
    (
        OrganizationType::School,
        &["school", "university", "college", "academy", "institute", "education", "seminary"],
    ),
    (
        OrganizationType::Church,
        &["church", "cathedral", "chapel", "temple", "synagogue", "parish", "religious"],
    ),
    (
        OrganizationType::Government,
        &["department", "agency", "bureau", "commission", "city of", "state of", "county", "municipal"],
    ),
    (
        OrganizationType::Military,
        &["army", "navy", "air force", "military", "base", "fort", "arsenal"],
    ),
    (
        OrganizationType::Nonprofit,
        &["foundation", "charity", "nonprofit", "association", "society", "club"],
    ),
];

const ORG_SUFFIXES: &str = r"Company|Co\.|Corporation|Corp\.?|Incorporated|Inc\.?|LLC|Ltd\.?|Manufacturing|Mills?|Factory|Works|Brewery|Railroad|Railway|Bank|Hospital|Sanatorium|Asylum|Infirmary|Clinic|School|University|College|Academy|Institute|Seminary|Church|Cathedral|Chapel|Synagogue|Temple|Parish|Department|Bureau|Agency|Commission|Army|Navy|Arsenal|Foundation|Society|Association|Club";

/// Leading words that are capitalised only because they start a sentence.
const LEADING_STOPWORDS: &[&str] = &[
    "The", "A", "An", "In", "At", "By", "From", "Later", "Then", "When", "After", "Before",
    "During", "Its", "His", "Her", "Their", "Our", "This", "That", "Both", "Former",
];

/// Words that never appear in a person's name.
const NON_NAME_WORDS: &[&str] = &[
    "Company", "Corporation", "Inc", "Mill", "Mills", "Factory", "Works", "Hospital", "School",
    "University", "College", "Church", "Street", "Avenue", "Road", "County", "City", "Park",
    "River", "Lake", "Bridge", "January", "February", "March", "April", "May", "June", "July",
    "August", "September", "October", "November", "December", "The",
];

const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC",
];

const PERSON_NAME: &str = r"[A-Z][a-z]+(?:\s+[A-Z]\.)*(?:\s+[A-Z][a-z]+){1,2}";

static HONORIFIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:Mr|Mrs|Ms|Miss|Dr|Rev|Capt|Col|Gen|Prof|Sir|Judge)\.?\s+([A-Z][a-z]+(?:\s+[A-Z]\.)*(?:\s+[A-Z][a-z]+){0,2})",
    )
    .expect("Invalid honorific regex")
});

static AGENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?i:by|founder|owner|architect|photographer|historian|proprietor|engineer|builder)\s+({PERSON_NAME})"
    ))
    .expect("Invalid agent regex")
});

static APPOSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b({PERSON_NAME}),\s+(?:the\s+|a\s+|an\s+)?(?i:founder|owner|architect|developer|photographer|historian|proprietor|engineer)"
    ))
    .expect("Invalid appositive regex")
});

static ORG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b((?:[A-Z][A-Za-z&'.-]*\s+(?:(?:of|and|&|the)\s+)?){{1,5}}(?:{ORG_SUFFIXES}))(?:\W|$)"
    ))
    .expect("Invalid organization regex")
});

static ORG_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:University|College|Bank|Church|Society|Department|Bureau|Academy|Institute|Hospital)\s+of\s+(?:the\s+)?[A-Z][A-Za-z'.-]*(?:\s+[A-Z][A-Za-z'.-]*){0,3})",
    )
    .expect("Invalid organization-of regex")
});

static CITY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2}),\s+([A-Z]{2})\b")
        .expect("Invalid city regex")
});

static LANDMARK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:[A-Z][A-Za-z'.-]*\s+){1,4}(?:Park|Bridge|Tunnel|Lake|River|Island|Mountain|Station|Square|Falls|Canal|Dam|Lighthouse|Cemetery|Harbor|Creek|Hall|Tower|Theater|Theatre|Hotel))\b",
    )
    .expect("Invalid landmark regex")
});

static REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:[A-Z][a-z]+\s+){1,3}(?:County|Valley|Township|Region))\b")
        .expect("Invalid region regex")
});

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{1,5}\s+(?:[A-Z][a-z]+\s+){1,3}(?:Street|St\.|Avenue|Ave\.?|Road|Rd\.?|Boulevard|Blvd\.?|Lane|Drive|Place|Way))",
    )
    .expect("Invalid address regex")
});

static TITLES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:mr|mrs|ms|miss|dr|rev|prof|jr|sr|ii|iii|iv)\b\.?")
        .expect("Invalid title regex")
});

static INITIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[a-z]\.\s*").expect("Invalid initial regex"));

/// Dedup key for a personal name: titles, suffixes and middle initials
/// removed, "Last, First" flipped, lowercased.
pub fn normalize_name(name: &str) -> String {
    let stripped = TITLES.replace_all(name, "");
    let stripped = INITIAL.replace_all(&stripped, "");
    let ordered = match stripped.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => stripped.replace(',', " "),
    };
    ordered
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn strip_leading_stopwords(name: &str) -> &str {
    let mut rest = name.trim();
    loop {
        let Some((first, tail)) = rest.split_once(char::is_whitespace) else {
            return rest;
        };
        if LEADING_STOPWORDS.contains(&first) && !tail.trim().is_empty() {
            rest = tail.trim_start();
        } else {
            return rest;
        }
    }
}

/// `text` around `[start, end)`, widened by `radius` bytes, lowercased.
fn window_lower(text: &str, start: usize, end: usize, radius: usize) -> String {
    let mut from = start.saturating_sub(radius);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + radius).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].to_lowercase()
}

/// `needle` occurs in `haystack` with no letter or digit on either side.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn infer_role(context: &str) -> PersonRole {
    PERSON_ROLE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| contains_word(context, w)))
        .map(|(role, _)| *role)
        .unwrap_or(PersonRole::Unknown)
}

fn infer_org_type(name: &str, context: &str) -> OrganizationType {
    let name = name.to_lowercase();
    for haystack in [name.as_str(), context] {
        if let Some((kind, _)) = ORG_TYPE_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| contains_word(haystack, w)))
        {
            return *kind;
        }
    }
    OrganizationType::Unknown
}

fn push_mention(mentions: &mut Vec<String>, mention: &str) {
    if !mentions.iter().any(|m| m == mention) {
        mentions.push(mention.to_string());
    }
}

/// Organizations with the byte spans they were found at.
fn find_organizations(text: &str) -> Vec<(usize, usize, String)> {
    let mut spans = Vec::new();
    for re in [&*ORG, &*ORG_OF] {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let name = strip_leading_stopwords(m.as_str());
            if name.split_whitespace().count() < 2 {
                continue;
            }
            spans.push((m.end() - name.len(), m.end(), name.to_string()));
        }
    }
    spans
}

pub fn extract_organizations(text: &str) -> Vec<ExtractedOrganization> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut orgs: Vec<ExtractedOrganization> = Vec::new();

    for (start, end, name) in find_organizations(text) {
        let key = name.to_lowercase();
        if let Some(&i) = index.get(&key) {
            push_mention(&mut orgs[i].mentions, &name);
            continue;
        }
        let org_type = infer_org_type(&name, &window_lower(text, start, end, ROLE_WINDOW));
        index.insert(key, orgs.len());
        orgs.push(ExtractedOrganization {
            mentions: vec![name.clone()],
            name,
            confidence: if org_type == OrganizationType::Unknown { 0.6 } else { 0.8 },
            org_type,
        });
    }
    orgs
}

fn plausible_person(name: &str) -> bool {
    name.len() >= 2
        && !name
            .split_whitespace()
            .any(|w| NON_NAME_WORDS.contains(&w.trim_end_matches('.')))
}

pub fn extract_people(text: &str) -> Vec<ExtractedPerson> {
    let org_spans = find_organizations(text);
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut people: Vec<ExtractedPerson> = Vec::new();

    let mut hits: Vec<(usize, usize, String, String)> = Vec::new();
    for (re, keep_title) in [(&*HONORIFIC, true), (&*AGENT, false), (&*APPOSITIVE, false)] {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(m)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = strip_leading_stopwords(m.as_str());
            let start = m.end() - name.len();
            let mention = if keep_title { whole.as_str() } else { name };
            hits.push((start, m.end(), name.to_string(), mention.to_string()));
        }
    }
    hits.sort_by_key(|h| h.0);

    for (start, end, name, mention) in hits {
        if !plausible_person(&name) {
            continue;
        }
        if org_spans.iter().any(|(s, e, _)| start < *e && *s < end) {
            continue;
        }
        let key = normalize_name(&name);
        if key.is_empty() {
            continue;
        }
        let role = infer_role(&window_lower(text, start, end, ROLE_WINDOW));
        if let Some(&i) = index.get(&key) {
            let person = &mut people[i];
            push_mention(&mut person.mentions, &mention);
            if person.role == PersonRole::Unknown && role != PersonRole::Unknown {
                person.role = role;
                person.confidence = 0.8;
            }
            continue;
        }
        index.insert(key, people.len());
        people.push(ExtractedPerson {
            name,
            role,
            mentions: vec![mention],
            confidence: if role == PersonRole::Unknown { 0.6 } else { 0.8 },
        });
    }
    people
}

pub fn extract_locations(text: &str, location_context: Option<&str>) -> Vec<ExtractedLocation> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut locations: Vec<ExtractedLocation> = Vec::new();
    let mut add = |name: &str, location_type: LocationType, confidence: f32| {
        let name = strip_leading_stopwords(name);
        let key = name.to_lowercase();
        if key.len() < 2 {
            return;
        }
        match index.get(&key) {
            Some(&i) => push_mention(&mut locations[i].mentions, name),
            None => {
                index.insert(key, locations.len());
                locations.push(ExtractedLocation {
                    name: name.to_string(),
                    location_type,
                    mentions: vec![name.to_string()],
                    confidence,
                });
            }
        }
    };

    for caps in CITY_STATE.captures_iter(text) {
        let (Some(city), Some(state)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if !US_STATES.contains(&state.as_str()) {
            continue;
        }
        let city = strip_leading_stopwords(city.as_str());
        add(&format!("{city}, {}", state.as_str()), LocationType::City, 0.75);
    }
    for caps in ADDRESS.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            add(m.as_str(), LocationType::Address, 0.8);
        }
    }
    for caps in LANDMARK.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            add(m.as_str(), LocationType::Landmark, 0.75);
        }
    }
    for caps in REGION.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            add(m.as_str(), LocationType::Region, 0.75);
        }
    }

    if let Some(context) = location_context.map(str::trim).filter(|c| !c.is_empty()) {
        if text.to_lowercase().contains(&context.to_lowercase()) {
            add(context, LocationType::Unknown, 0.9);
        }
    }
    locations
}
