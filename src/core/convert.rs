//! Conversion entry points
//!
//! This module ties the builder, flattener and validator to the two document
//! formats and carries the per-conversion options. Two formats are supported:
//!
//! - **Flat**: a JSON object mapping flat paths to scalars
//! - **Structured**: nested JSON keyed by node ids, one array per node

use crate::core::builder::CompositionBuilder;
use crate::core::flatten::CompositionFlattener;
use crate::core::path::flat_to_structured;
use crate::core::schema::SchemaIndex;
use crate::core::validation::{ValidationReport, Validator};
use crate::domain::{ContextBag, ConversionError, ConversionResult, MeridianError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Document format on the simplified side of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// `path → scalar` entries
    #[default]
    Flat,
    /// Nested occurrence arrays
    Structured,
}

impl FromStr for Format {
    type Err = MeridianError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "structured" | "structure" => Ok(Self::Structured),
            _ => Err(MeridianError::Configuration(format!(
                "Invalid format: {s}. Expected 'flat' or 'structured'"
            ))),
        }
    }
}

/// What happens when input contradicts a schema fixed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedValuePolicy {
    /// Log a warning and emit the fixed value
    #[default]
    Ignore,
    /// Fail the build with a constraint violation
    Reject,
}

impl FromStr for FixedValuePolicy {
    type Err = MeridianError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "reject" => Ok(Self::Reject),
            _ => Err(MeridianError::Configuration(format!(
                "Invalid fixed value policy: {s}. Expected 'ignore' or 'reject'"
            ))),
        }
    }
}

/// Options of one conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Language used when the context bag names none
    pub default_language: Option<String>,
    /// Accept display names and terminology codes as path segments
    pub relaxed_names: bool,
    pub fixed_values: FixedValuePolicy,
    /// Written into `archetype_details/rm_version`
    pub rm_version: String,
    /// Give new compositions an OBJECT_VERSION_ID
    pub generate_uid: bool,
    /// System id part of generated uids
    pub system_id: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            default_language: None,
            relaxed_names: true,
            fixed_values: FixedValuePolicy::Ignore,
            rm_version: "1.0.4".to_string(),
            generate_uid: false,
            system_id: "local.meridian".to_string(),
        }
    }
}

/// Builds a raw composition from a flat or structured document
///
/// # Examples
///
/// ```
/// use meridian::core::convert::{build_composition, ConversionOptions, Format};
/// use meridian::core::schema::SchemaIndex;
/// use meridian::domain::{ContextBag, WebTemplate};
/// use serde_json::json;
///
/// let template = WebTemplate::from_json_str(r#"{
///     "templateId": "Note.v1",
///     "tree": {"id": "note", "name": "Note", "rmType": "COMPOSITION", "min": 1,
///              "nodeId": "openEHR-EHR-COMPOSITION.note.v1", "aqlPath": "/"}
/// }"#).unwrap();
/// let index = SchemaIndex::build(&template).unwrap();
///
/// let document = json!({"ctx/territory": "IE", "ctx/composer_name": "John"});
/// let raw = build_composition(
///     &index,
///     Format::Flat,
///     &document,
///     &ContextBag::new().with_language("en"),
///     &ConversionOptions::default(),
/// ).unwrap();
/// assert_eq!(raw["territory"]["code_string"], "IE");
/// ```
pub fn build_composition(
    index: &SchemaIndex,
    format: Format,
    document: &Value,
    context: &ContextBag,
    options: &ConversionOptions,
) -> ConversionResult<Value> {
    let builder = CompositionBuilder::new(index, options);
    match format {
        Format::Flat => {
            let entries = document.as_object().ok_or_else(|| {
                ConversionError::malformed_path("", "a flat document must be a JSON object")
            })?;
            let flat: IndexMap<String, Value> = entries
                .iter()
                .map(|(path, value)| (path.clone(), value.clone()))
                .collect();
            builder.build_flat(&flat, context)
        }
        Format::Structured => builder.build_structured(document, context),
    }
}

/// Flattens a raw composition into a flat or structured document
///
/// `language` selects display names; the schema's default language is used
/// when it is `None`.
pub fn flatten_composition(
    index: &SchemaIndex,
    raw: &Value,
    format: Format,
    language: Option<&str>,
) -> ConversionResult<Value> {
    let language = language.unwrap_or(index.default_language());
    let flat = CompositionFlattener::new(index, language).flatten(raw)?;
    match format {
        Format::Flat => Ok(Value::Object(flat.into_iter().collect())),
        Format::Structured => flat_to_structured(&flat),
    }
}

/// Validates a raw composition and wraps the violations in a report
pub fn validate_composition(index: &SchemaIndex, raw: &Value) -> ConversionResult<ValidationReport> {
    let violations = Validator::new(index).validate(raw)?;
    Ok(ValidationReport::from_violations(
        index.template_id().as_str(),
        violations,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WebTemplate;
    use serde_json::json;
    use test_case::test_case;

    fn index() -> SchemaIndex {
        let template: WebTemplate = serde_json::from_value(json!({
            "templateId": "Note.v1",
            "defaultLanguage": "en",
            "tree": {
                "id": "note", "name": "Note", "rmType": "COMPOSITION", "min": 1,
                "nodeId": "openEHR-EHR-COMPOSITION.note.v1", "aqlPath": "/",
                "children": [{
                    "id": "remark", "name": "Remark", "rmType": "EVALUATION", "max": -1,
                    "nodeId": "openEHR-EHR-EVALUATION.remark.v1",
                    "aqlPath": "/content[openEHR-EHR-EVALUATION.remark.v1]",
                    "children": [{
                        "id": "text", "name": "Text", "rmType": "DV_TEXT", "nodeId": "at0002", "min": 1,
                        "aqlPath": "/content[openEHR-EHR-EVALUATION.remark.v1]/data[at0001]/items[at0002]/value"
                    }]
                }]
            }
        }))
        .unwrap();
        SchemaIndex::build(&template).unwrap()
    }

    fn context() -> ContextBag {
        ContextBag::new()
            .with_language("en")
            .with_territory("IE")
            .with_composer_name("John")
            .with_start_time("2024-02-01T08:00:00+01:00")
    }

    #[test_case("flat", Format::Flat)]
    #[test_case("Structured", Format::Structured)]
    #[test_case("structure", Format::Structured)]
    fn test_format_from_str(text: &str, expected: Format) {
        assert_eq!(Format::from_str(text).unwrap(), expected);
    }

    #[test]
    fn test_invalid_format() {
        assert!(Format::from_str("xml").is_err());
        assert!(FixedValuePolicy::from_str("maybe").is_err());
        assert_eq!(FixedValuePolicy::from_str("Reject").unwrap(), FixedValuePolicy::Reject);
    }

    #[test]
    fn test_flat_document_must_be_object() {
        let err = build_composition(
            &index(),
            Format::Flat,
            &json!(["note/remark/text"]),
            &context(),
            &ConversionOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::MalformedPath { .. }));
    }

    #[test]
    fn test_flat_and_structured_build_the_same_tree() {
        let index = index();
        let options = ConversionOptions::default();
        let from_flat = build_composition(
            &index,
            Format::Flat,
            &json!({"note/remark:0/text": "stable"}),
            &context(),
            &options,
        )
        .unwrap();
        let from_structured = build_composition(
            &index,
            Format::Structured,
            &json!({"note": [{"remark": [{"text": ["stable"]}]}]}),
            &context(),
            &options,
        )
        .unwrap();
        assert_eq!(from_flat, from_structured);
    }

    #[test]
    fn test_flatten_reproduces_input() {
        let index = index();
        let raw = build_composition(
            &index,
            Format::Flat,
            &json!({"note/remark:0/text": "stable", "note/remark:1/text": "worse"}),
            &context(),
            &ConversionOptions::default(),
        )
        .unwrap();

        let flat = flatten_composition(&index, &raw, Format::Flat, None).unwrap();
        assert_eq!(flat["note/remark:0/text"], "stable");
        assert_eq!(flat["note/remark:1/text"], "worse");
        assert_eq!(flat["note/composer|name"], "John");
        assert_eq!(flat["note/context/start_time"], "2024-02-01T08:00:00+01:00");

        let structured = flatten_composition(&index, &raw, Format::Structured, None).unwrap();
        assert_eq!(structured["note"][0]["remark"][1]["text"][0], "worse");
    }

    #[test]
    fn test_validate_built_composition() {
        let index = index();
        let raw = build_composition(
            &index,
            Format::Flat,
            &json!({"note/remark/text": "fine"}),
            &context(),
            &ConversionOptions::default(),
        )
        .unwrap();
        let report = validate_composition(&index, &raw).unwrap();
        assert!(report.is_success(), "{}", report.format_summary());
    }
}
