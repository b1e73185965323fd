use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{
    DateCategory, DatePrecision, ExtractType, LocationType, OrganizationType, PersonRole,
};

/// Clamp a score into [0, 1]. NaN collapses to 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One unit of work handed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionInput {
    pub text: String,
    /// Opaque reference owned by the caller (e.g. "web_source").
    #[serde(default)]
    pub source_type: String,
    /// Opaque reference owned by the caller.
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub location_context: Option<String>,
    /// Subset filter. `None` means everything.
    #[serde(default)]
    pub extract_types: Option<Vec<ExtractType>>,
    /// Anchor for relative dates ("two years ago").
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
}

impl ExtractionInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_type: String::new(),
            source_id: String::new(),
            location_context: None,
            extract_types: None,
            reference_date: None,
        }
    }

    pub fn with_source(mut self, source_type: &str, source_id: &str) -> Self {
        self.source_type = source_type.to_string();
        self.source_id = source_id.to_string();
        self
    }

    pub fn with_location_context(mut self, location: &str) -> Self {
        self.location_context = Some(location.to_string());
        self
    }

    pub fn with_extract_types(mut self, types: Vec<ExtractType>) -> Self {
        self.extract_types = Some(types);
        self
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    /// Whether the caller asked for this kind of output.
    pub fn wants(&self, kind: ExtractType) -> bool {
        match &self.extract_types {
            None => true,
            Some(types) => types.contains(&kind),
        }
    }
}

/// A date found in the text, always carrying the exact source substring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDate {
    pub raw_text: String,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, matching `precision`.
    pub parsed_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_date_end: Option<String>,
    pub precision: DatePrecision,
    pub category: DateCategory,
    pub confidence: f32,
    pub context: String,
    pub is_approximate: bool,
}

impl ExtractedDate {
    pub fn is_auto_approvable(&self) -> bool {
        self.category
            .auto_approve_threshold()
            .is_some_and(|threshold| self.confidence >= threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPerson {
    pub name: String,
    pub role: PersonRole,
    pub mentions: Vec<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedOrganization {
    pub name: String,
    #[serde(rename = "type")]
    pub org_type: OrganizationType,
    pub mentions: Vec<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLocation {
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: LocationType,
    pub mentions: Vec<String>,
    pub confidence: f32,
}

/// Output of a single extraction call. Created fresh per call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub provider: String,
    pub model: String,
    pub dates: Vec<ExtractedDate>,
    pub people: Vec<ExtractedPerson>,
    pub organizations: Vec<ExtractedOrganization>,
    pub locations: Vec<ExtractedLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_facts: Vec<String>,
    pub processing_time_ms: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    pub fn empty(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn entity_count(&self) -> usize {
        self.dates.len() + self.people.len() + self.organizations.len() + self.locations.len()
    }

    /// A result is usable when any structured list or the summary is non-empty.
    pub fn is_usable(&self) -> bool {
        self.entity_count() > 0
            || self
                .summary
                .as_ref()
                .is_some_and(|s| !s.trim().is_empty())
    }

    /// Clamp every confidence into [0, 1]. Providers call this before returning.
    pub fn clamp_confidences(&mut self) {
        for d in &mut self.dates {
            d.confidence = clamp_confidence(d.confidence);
        }
        for p in &mut self.people {
            p.confidence = clamp_confidence(p.confidence);
        }
        for o in &mut self.organizations {
            o.confidence = clamp_confidence(o.confidence);
        }
        for l in &mut self.locations {
            l.confidence = clamp_confidence(l.confidence);
        }
    }

    /// Drop the categories the caller did not ask for.
    pub fn retain_requested(&mut self, input: &ExtractionInput) {
        if !input.wants(ExtractType::Dates) {
            self.dates.clear();
        }
        if !input.wants(ExtractType::People) {
            self.people.clear();
        }
        if !input.wants(ExtractType::Organizations) {
            self.organizations.clear();
        }
        if !input.wants(ExtractType::Locations) {
            self.locations.clear();
        }
        if !input.wants(ExtractType::Summary) {
            self.summary = None;
            self.key_facts.clear();
        }
    }
}

/// Model metadata reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    /// Bytes on disk, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
