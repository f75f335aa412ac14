//! Conversion context bag
//!
//! Composition-level metadata that is not expressed as record paths
//! (language, composer, start time, ...). A bag lives for exactly one
//! conversion and is never mutated once the builder starts walking.

use serde::{Deserialize, Serialize};

/// Context values consumed once per conversion
///
/// # Examples
///
/// ```
/// use meridian::domain::ContextBag;
///
/// let ctx: ContextBag = serde_json::from_value(serde_json::json!({
///     "language": "en",
///     "territory": "IE",
///     "composer_name": "John"
/// })).unwrap();
/// assert_eq!(ctx.composer_name.as_deref(), Some("John"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextBag {
    /// ISO 639-1 language code
    pub language: Option<String>,

    /// ISO 3166-1 territory code
    pub territory: Option<String>,

    /// Composer display name
    pub composer_name: Option<String>,

    /// Composer external identifier
    pub composer_id: Option<String>,

    /// Composer is the subject of care
    pub composer_self: Option<bool>,

    /// Scheme of party identifiers
    pub id_scheme: Option<String>,

    /// Namespace of party identifiers
    pub id_namespace: Option<String>,

    /// Context start time (ISO 8601)
    #[serde(alias = "time")]
    pub start_time: Option<String>,

    /// Context end time (ISO 8601)
    pub end_time: Option<String>,

    /// Free-text location
    pub location: Option<String>,

    /// openEHR setting code
    pub setting: Option<String>,

    /// Health care facility
    pub health_care_facility: Option<FacilitySpec>,

    /// Character encoding code
    pub encoding: Option<String>,

    /// Terminology of the encoding code
    pub encoding_terminology: Option<String>,

    /// Composition level links
    pub link: Vec<LinkSpec>,

    /// Workflow id applied to entries
    pub work_flow_id: Option<ObjectRefSpec>,

    /// ISM transition applied to actions lacking one
    pub ism_transition: Option<IsmOverride>,
}

impl ContextBag {
    /// Creates an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the territory
    pub fn with_territory(mut self, territory: impl Into<String>) -> Self {
        self.territory = Some(territory.into());
        self
    }

    /// Sets the composer name
    pub fn with_composer_name(mut self, name: impl Into<String>) -> Self {
        self.composer_name = Some(name.into());
        self
    }

    /// Sets the start time
    pub fn with_start_time(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = Some(start_time.into());
        self
    }

    /// Overlays `other` on top of `self`; every value set in `other` wins
    ///
    /// ```
    /// use meridian::domain::ContextBag;
    ///
    /// let base = ContextBag::new().with_language("en").with_territory("IE");
    /// let overlay = ContextBag::new().with_language("de");
    /// let merged = base.merged_with(overlay);
    /// assert_eq!(merged.language.as_deref(), Some("de"));
    /// assert_eq!(merged.territory.as_deref(), Some("IE"));
    /// ```
    pub fn merged_with(self, other: ContextBag) -> ContextBag {
        ContextBag {
            language: other.language.or(self.language),
            territory: other.territory.or(self.territory),
            composer_name: other.composer_name.or(self.composer_name),
            composer_id: other.composer_id.or(self.composer_id),
            composer_self: other.composer_self.or(self.composer_self),
            id_scheme: other.id_scheme.or(self.id_scheme),
            id_namespace: other.id_namespace.or(self.id_namespace),
            start_time: other.start_time.or(self.start_time),
            end_time: other.end_time.or(self.end_time),
            location: other.location.or(self.location),
            setting: other.setting.or(self.setting),
            health_care_facility: other.health_care_facility.or(self.health_care_facility),
            encoding: other.encoding.or(self.encoding),
            encoding_terminology: other.encoding_terminology.or(self.encoding_terminology),
            link: if other.link.is_empty() {
                self.link
            } else {
                other.link
            },
            work_flow_id: other.work_flow_id.or(self.work_flow_id),
            ism_transition: other.ism_transition.or(self.ism_transition),
        }
    }
}

/// A LINK to another record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkSpec {
    pub meaning: Option<String>,
    #[serde(rename = "type")]
    pub link_type: Option<String>,
    pub target: Option<String>,
}

/// An OBJECT_REF (workflow ids, party references)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObjectRefSpec {
    pub id: Option<String>,
    pub id_scheme: Option<String>,
    pub namespace: Option<String>,
    #[serde(rename = "type")]
    pub ref_type: Option<String>,
}

/// Health care facility of the event context
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FacilitySpec {
    pub name: Option<String>,
    pub id: Option<String>,
}

/// Careflow override applied to actions without an explicit transition
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IsmOverride {
    pub current_state: Option<String>,
    pub careflow_step: Option<String>,
    pub transition: Option<String>,
}
