use serde::{Deserialize, Serialize};

/// A string did not name any variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field} value: '{value}'")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DatePrecision {
    Exact => "exact",
    Month => "month",
    Year => "year",
    Decade => "decade",
    Approximate => "approximate",
});

str_enum!(DateCategory {
    BuildDate => "build_date",
    Opening => "opening",
    Closure => "closure",
    Demolition => "demolition",
    Renovation => "renovation",
    Event => "event",
    Visit => "visit",
    Publication => "publication",
    Unknown => "unknown",
});

str_enum!(PersonRole {
    Founder => "founder",
    Owner => "owner",
    Architect => "architect",
    Developer => "developer",
    Employee => "employee",
    Photographer => "photographer",
    Visitor => "visitor",
    Historian => "historian",
    Unknown => "unknown",
});

str_enum!(OrganizationType {
    Company => "company",
    Hospital => "hospital",
    School => "school",
    Church => "church",
    Government => "government",
    Military => "military",
    Nonprofit => "nonprofit",
    Unknown => "unknown",
});

str_enum!(LocationType {
    City => "city",
    Region => "region",
    Landmark => "landmark",
    Address => "address",
    Unknown => "unknown",
});

str_enum!(ExtractType {
    Dates => "dates",
    People => "people",
    Organizations => "organizations",
    Locations => "locations",
    Summary => "summary",
});

str_enum!(ProviderType {
    Deterministic => "deterministic",
    LocalModel => "local_model",
    CloudModel => "cloud_model",
});

str_enum!(CloudVendor {
    Anthropic => "anthropic",
    OpenAi => "openai",
    Gemini => "gemini",
});

impl DatePrecision {
    /// Expected `parsedDate` shape for this precision.
    ///
    /// Decade and approximate dates are anchored on a year (`YYYY`).
    pub fn iso_len(&self) -> usize {
        match self {
            Self::Exact => 10,
            Self::Month => 7,
            Self::Year | Self::Decade | Self::Approximate => 4,
        }
    }
}

impl DateCategory {
    /// Minimum confidence at which a date of this category may be approved
    /// without human review. `None` means never auto-approved: visits and
    /// publications describe the document, not the subject.
    pub fn auto_approve_threshold(&self) -> Option<f32> {
        match self {
            Self::BuildDate | Self::Opening | Self::Demolition => Some(0.70),
            Self::Closure => Some(0.75),
            Self::Renovation | Self::Event => Some(0.80),
            Self::Unknown => Some(0.90),
            Self::Visit | Self::Publication => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn date_precision_round_trip() {
        for (variant, s) in [
            (DatePrecision::Exact, "exact"),
            (DatePrecision::Month, "month"),
            (DatePrecision::Year, "year"),
            (DatePrecision::Decade, "decade"),
            (DatePrecision::Approximate, "approximate"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(DatePrecision::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn date_category_round_trip() {
        for variant in DateCategory::ALL {
            assert_eq!(DateCategory::from_str(variant.as_str()).unwrap(), *variant);
        }
        assert_eq!(DateCategory::ALL.len(), 9);
    }

    #[test]
    fn unknown_string_is_rejected() {
        let err = PersonRole::from_str("wizard").unwrap_err();
        assert_eq!(err.field, "PersonRole");
        assert_eq!(err.value, "wizard");
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&DateCategory::BuildDate).unwrap();
        assert_eq!(json, "\"build_date\"");
        let vendor: CloudVendor = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(vendor, CloudVendor::OpenAi);
        let kind: ProviderType = serde_json::from_str("\"local_model\"").unwrap();
        assert_eq!(kind, ProviderType::LocalModel);
    }

    #[test]
    fn visit_and_publication_never_auto_approve() {
        assert!(DateCategory::Visit.auto_approve_threshold().is_none());
        assert!(DateCategory::Publication.auto_approve_threshold().is_none());
        assert_eq!(DateCategory::BuildDate.auto_approve_threshold(), Some(0.70));
        assert_eq!(DateCategory::Opening.auto_approve_threshold(), Some(0.70));
        assert_eq!(DateCategory::Demolition.auto_approve_threshold(), Some(0.70));
    }

    #[test]
    fn precision_iso_lengths() {
        assert_eq!(DatePrecision::Exact.iso_len(), "2025-04-28".len());
        assert_eq!(DatePrecision::Month.iso_len(), "2025-04".len());
        assert_eq!(DatePrecision::Decade.iso_len(), "1970".len());
    }
}
