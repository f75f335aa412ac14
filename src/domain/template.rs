//! Web Template domain model
//!
//! This module defines the schema artifact the converter is driven by: the
//! Web Template, a JSON rendition of an openEHR operational template. It is
//! produced by an external ingestion step and only ever read here.

use super::errors::MeridianError;
use super::ids::TemplateId;
use super::result::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Represents an openEHR Web Template
///
/// # Examples
///
/// ```
/// use meridian::domain::template::WebTemplate;
///
/// let template = WebTemplate::from_json_str(r#"{
///     "templateId": "Minimal.v1",
///     "defaultLanguage": "en",
///     "tree": {"id": "minimal", "name": "Minimal", "rmType": "COMPOSITION", "min": 1, "max": 1}
/// }"#).unwrap();
/// assert_eq!(template.tree.id, "minimal");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebTemplate {
    /// Operational template identifier
    pub template_id: TemplateId,

    /// Web Template format version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Language used when a caller does not ask for one
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Languages the template carries names for
    #[serde(default)]
    pub languages: Vec<String>,

    /// Root node (the COMPOSITION)
    pub tree: WebTemplateNode,
}

impl WebTemplate {
    /// Parses a Web Template from its JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MeridianError::Schema(format!("Failed to parse web template: {e}")))
    }

    /// Reads and parses a Web Template file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MeridianError::Schema(format!(
                "Failed to read web template {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max() -> i64 {
    1
}

/// One node of the Web Template tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebTemplateNode {
    /// Path segment id (name-derived, e.g. `body_temperature`)
    pub id: String,

    /// Default display name
    #[serde(default)]
    pub name: Option<String>,

    /// Display name in the template's default language
    #[serde(default)]
    pub localized_name: Option<String>,

    /// Display names keyed by language code
    #[serde(default)]
    pub localized_names: BTreeMap<String, String>,

    /// RM type tag, parsed into [`super::RmType`] when the schema is indexed
    pub rm_type: String,

    /// Archetype node id (`at0004`) or archetype id for archetype roots
    #[serde(default)]
    pub node_id: Option<String>,

    /// Minimum occurrences
    #[serde(default)]
    pub min: i64,

    /// Maximum occurrences, -1 when unbounded
    #[serde(default = "default_max")]
    pub max: i64,

    /// AQL path of the node from the composition root
    #[serde(default)]
    pub aql_path: Option<String>,

    /// RM attribute node rather than an archetyped one
    #[serde(default)]
    pub in_context: bool,

    /// Children must be supplied in declared order
    #[serde(default)]
    pub ordered: bool,

    /// Free-form annotations (`persistent`, `self_composer`, ...)
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// External terminology bindings keyed by terminology id
    #[serde(default)]
    pub term_bindings: BTreeMap<String, TermBinding>,

    /// Allowed DV_PROPORTION kinds
    #[serde(default)]
    pub proportion_types: Vec<String>,

    /// Attribute inputs of leaf nodes
    #[serde(default)]
    pub inputs: Vec<WebTemplateInput>,

    /// Child nodes, order-significant
    #[serde(default)]
    pub children: Vec<WebTemplateNode>,
}

impl WebTemplateNode {
    /// Creates a node with the given id and RM type
    pub fn new(id: impl Into<String>, rm_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            localized_name: None,
            localized_names: BTreeMap::new(),
            rm_type: rm_type.into(),
            node_id: None,
            min: 0,
            max: 1,
            aql_path: None,
            in_context: false,
            ordered: false,
            annotations: BTreeMap::new(),
            term_bindings: BTreeMap::new(),
            proportion_types: Vec::new(),
            inputs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Sets the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the occurrence bounds (-1 = unbounded)
    pub fn with_occurrences(mut self, min: i64, max: i64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Sets the AQL path
    pub fn with_aql_path(mut self, aql_path: impl Into<String>) -> Self {
        self.aql_path = Some(aql_path.into());
        self
    }

    /// Marks the node as an RM attribute node
    pub fn in_context(mut self) -> Self {
        self.in_context = true;
        self
    }

    /// Adds an attribute input
    pub fn with_input(mut self, input: WebTemplateInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Adds a child node
    pub fn with_child(mut self, child: WebTemplateNode) -> Self {
        self.children.push(child);
        self
    }

    /// Display name for a language, falling back to the default names and the id
    pub fn display_name(&self, language: &str) -> &str {
        self.localized_names
            .get(language)
            .or(self.localized_name.as_ref())
            .or(self.name.as_ref())
            .map(String::as_str)
            .unwrap_or(&self.id)
    }

    /// Minimum occurrences as an unsigned count
    pub fn min_occurrences(&self) -> usize {
        self.min.max(0) as usize
    }

    /// Maximum occurrences, `None` when unbounded
    pub fn max_occurrences(&self) -> Option<usize> {
        if self.max < 0 {
            None
        } else {
            Some(self.max as usize)
        }
    }

    /// Input for an attribute suffix (`None` = the bare value input)
    pub fn input(&self, suffix: Option<&str>) -> Option<&WebTemplateInput> {
        self.inputs
            .iter()
            .find(|input| input.suffix.as_deref() == suffix)
    }

    /// Whether an annotation is set to a truthy value
    pub fn has_annotation(&self, key: &str) -> bool {
        self.annotations
            .get(key)
            .map(|v| v.is_empty() || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// Binding of a node to an external terminology code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TermBinding {
    pub value: TermBindingValue,
}

/// Code of a terminology binding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TermBindingValue {
    pub code_string: String,
    pub terminology_id: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Attribute input of a leaf node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebTemplateInput {
    /// Attribute suffix (`magnitude`, `unit`, `code`, ...), absent for the bare value
    #[serde(default)]
    pub suffix: Option<String>,

    /// Input type (`TEXT`, `CODED_TEXT`, `DECIMAL`, `INTEGER`, ...)
    #[serde(rename = "type", default)]
    pub input_type: String,

    /// Allowed values
    #[serde(default)]
    pub list: Vec<WebTemplateInputValue>,

    /// Whether values outside `list` are accepted
    #[serde(default)]
    pub list_open: bool,

    /// Terminology of coded values
    #[serde(default)]
    pub terminology: Option<String>,

    /// Range and precision constraints
    #[serde(default)]
    pub validation: Option<InputValidation>,

    /// Value used when the attribute is absent
    #[serde(default)]
    pub default_value: Option<Value>,

    /// Value always used, overriding any supplied one
    #[serde(default)]
    pub fixed_value: Option<Value>,
}

impl WebTemplateInput {
    /// Creates an input for an attribute suffix
    pub fn new(suffix: Option<&str>, input_type: impl Into<String>) -> Self {
        Self {
            suffix: suffix.map(str::to_string),
            input_type: input_type.into(),
            list: Vec::new(),
            list_open: false,
            terminology: None,
            validation: None,
            default_value: None,
            fixed_value: None,
        }
    }

    /// Sets the terminology
    pub fn with_terminology(mut self, terminology: impl Into<String>) -> Self {
        self.terminology = Some(terminology.into());
        self
    }

    /// Adds an allowed value
    pub fn with_item(mut self, value: impl Into<String>, label: impl Into<String>) -> Self {
        self.list.push(WebTemplateInputValue::new(value, label));
        self
    }

    /// Finds a list item by its value (code)
    pub fn item(&self, value: &str) -> Option<&WebTemplateInputValue> {
        self.list.iter().find(|item| item.value == value)
    }
}

/// One allowed value of an input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebTemplateInputValue {
    /// Code or unit
    pub value: String,

    /// Display label
    #[serde(default)]
    pub label: Option<String>,

    /// Display labels keyed by language
    #[serde(default)]
    pub localized_labels: BTreeMap<String, String>,

    /// Ordinal degree (DV_ORDINAL)
    #[serde(default)]
    pub ordinal: Option<i64>,

    /// ISM states a careflow step leads to
    #[serde(default, deserialize_with = "string_or_seq")]
    pub current_states: Vec<String>,

    /// Per-value constraints (magnitude range of a unit)
    #[serde(default)]
    pub validation: Option<InputValidation>,
}

impl WebTemplateInputValue {
    /// Creates an allowed value
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: Some(label.into()),
            localized_labels: BTreeMap::new(),
            ordinal: None,
            current_states: Vec::new(),
            validation: None,
        }
    }

    /// Label for a language, falling back to the default label and the value
    pub fn display_label(&self, language: &str) -> &str {
        self.localized_labels
            .get(language)
            .or(self.label.as_ref())
            .map(String::as_str)
            .unwrap_or(&self.value)
    }
}

/// Constraints of an input
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputValidation {
    #[serde(default)]
    pub range: Option<ValidationRange>,
    #[serde(default)]
    pub precision: Option<ValidationRange>,
}

/// Numeric interval constraint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRange {
    #[serde(default)]
    pub min_op: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max_op: Option<String>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl ValidationRange {
    /// Whether a value lies inside the range
    ///
    /// ```
    /// use meridian::domain::template::ValidationRange;
    ///
    /// let range = ValidationRange {
    ///     min_op: Some(">=".into()), min: Some(0.0),
    ///     max_op: Some("<".into()), max: Some(10.0),
    /// };
    /// assert!(range.contains(0.0));
    /// assert!(!range.contains(10.0));
    /// ```
    pub fn contains(&self, value: f64) -> bool {
        let above_min = match self.min {
            Some(min) if self.min_op.as_deref() == Some(">") => value > min,
            Some(min) => value >= min,
            None => true,
        };
        let below_max = match self.max {
            Some(max) if self.max_op.as_deref() == Some("<") => value < max,
            Some(max) => value <= max,
            None => true,
        };
        above_min && below_max
    }

    /// Human readable form, e.g. `>=0..<10`
    pub fn describe(&self) -> String {
        let min = self
            .min
            .map(|m| format!("{}{}", self.min_op.as_deref().unwrap_or(">="), m))
            .unwrap_or_default();
        let max = self
            .max
            .map(|m| format!("{}{}", self.max_op.as_deref().unwrap_or("<="), m))
            .unwrap_or_default();
        format!("{min}..{max}")
    }
}

fn string_or_seq<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(state)) => vec![state],
        Some(OneOrMany::Many(states)) => states,
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quantity_node() -> WebTemplateNode {
        serde_json::from_value(json!({
            "id": "temperature",
            "name": "Temperature",
            "localizedNames": {"en": "Temperature", "de": "Temperatur"},
            "rmType": "DV_QUANTITY",
            "nodeId": "at0004",
            "min": 0,
            "max": 1,
            "inputs": [
                {"suffix": "magnitude", "type": "DECIMAL"},
                {"suffix": "unit", "type": "CODED_TEXT", "list": [
                    {"value": "°C", "label": "°C", "validation": {"range": {"minOp": ">=", "min": 0.0, "maxOp": "<=", "max": 100.0}}}
                ]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_node_deserialization_defaults() {
        let node = quantity_node();
        assert_eq!(node.rm_type, "DV_QUANTITY");
        assert!(!node.in_context);
        assert!(node.children.is_empty());
        assert_eq!(node.max_occurrences(), Some(1));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let node = quantity_node();
        assert_eq!(node.display_name("de"), "Temperatur");
        assert_eq!(node.display_name("fr"), "Temperature");

        let bare = WebTemplateNode::new("bare", "CLUSTER");
        assert_eq!(bare.display_name("en"), "bare");
    }

    #[test]
    fn test_unbounded_max() {
        let node = WebTemplateNode::new("events", "EVENT").with_occurrences(1, -1);
        assert_eq!(node.min_occurrences(), 1);
        assert_eq!(node.max_occurrences(), None);
    }

    #[test]
    fn test_input_lookup() {
        let node = quantity_node();
        let unit = node.input(Some("unit")).unwrap();
        let item = unit.item("°C").unwrap();
        assert!(item.validation.as_ref().unwrap().range.as_ref().unwrap().contains(37.5));
        assert!(node.input(None).is_none());
    }

    #[test]
    fn test_current_states_accepts_string_or_list() {
        let single: WebTemplateInputValue =
            serde_json::from_value(json!({"value": "at0005", "currentStates": "526"})).unwrap();
        assert_eq!(single.current_states, vec!["526"]);

        let many: WebTemplateInputValue =
            serde_json::from_value(json!({"value": "at0006", "currentStates": ["245", "532"]}))
                .unwrap();
        assert_eq!(many.current_states, vec!["245", "532"]);
    }

    #[test]
    fn test_annotations() {
        let mut node = WebTemplateNode::new("encounter", "COMPOSITION");
        node.annotations
            .insert("persistent".to_string(), "true".to_string());
        assert!(node.has_annotation("persistent"));
        assert!(!node.has_annotation("self_composer"));
    }

    #[test]
    fn test_template_parse_error() {
        let result = WebTemplate::from_json_str("{\"templateId\": \"x\"}");
        assert!(matches!(result, Err(MeridianError::Schema(_))));
    }

    #[test]
    fn test_range_describe() {
        let range = ValidationRange {
            min_op: Some(">=".to_string()),
            min: Some(0.0),
            max_op: None,
            max: None,
        };
        assert_eq!(range.describe(), ">=0..");
    }
}
