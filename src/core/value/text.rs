//! Coded values: DV_CODED_TEXT, DV_ORDINAL and CODE_PHRASE

use super::quantity::{integer, parse_number};
use super::rm::{code_phrase, dv_coded_text, read_code_phrase, str_field};
use super::{attributes, get_string, Attributes};
use crate::core::schema::IndexedNode;
use crate::domain::{ConversionError, ConversionResult, WebTemplateInput, WebTemplateInputValue};
use serde_json::{json, Value};

/// Terminology of codes local to the archetype
pub const LOCAL_TERMINOLOGY: &str = "local";

/// Input carrying a node's value set
fn coded_input(node: &IndexedNode) -> Option<&WebTemplateInput> {
    node.input(Some("code")).or_else(|| node.input(None))
}

fn value_set_name(node: &IndexedNode, terminology: &str) -> String {
    format!("{terminology} value set of '{}'", node.path)
}

fn is_closed(input: &WebTemplateInput) -> bool {
    !input.list.is_empty() && !input.list_open
}

/// DV_CODED_TEXT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedTextValue {
    pub code: String,
    pub value: String,
    pub terminology: String,
}

impl CodedTextValue {
    /// Builds a coded text from `|code`, `|value` and `|terminology`
    ///
    /// A bare code is completed from the schema's value set: the display
    /// value comes from the list item's label in `language`. Codes outside a
    /// closed list fail with [`ConversionError::UnknownCode`]; open lists
    /// accept any code and default the value to the code.
    pub fn from_attributes(node: &IndexedNode, attrs: &Attributes, language: &str) -> ConversionResult<Self> {
        let input = coded_input(node);
        let supplied_value = get_string(attrs, "value")?;
        let code = match get_string(attrs, "code")? {
            Some(code) => code,
            None => {
                let by_label = input.zip(supplied_value.as_deref()).and_then(|(input, label)| {
                    input
                        .list
                        .iter()
                        .find(|item| item.display_label(language) == label)
                });
                match by_label {
                    Some(item) => item.value.clone(),
                    None => return Err(ConversionError::invalid_attribute("code", "required")),
                }
            }
        };

        let terminology = get_string(attrs, "terminology")?
            .or_else(|| input.and_then(|i| i.terminology.clone()))
            .unwrap_or_else(|| LOCAL_TERMINOLOGY.to_string());

        let item = input.and_then(|input| input.item(&code));
        if item.is_none() && input.is_some_and(is_closed) {
            return Err(ConversionError::UnknownCode {
                value_set: value_set_name(node, &terminology),
                code,
            });
        }

        let value = supplied_value
            .or_else(|| item.map(|item| item.display_label(language).to_string()))
            .unwrap_or_else(|| code.clone());

        Ok(Self {
            code,
            value,
            terminology,
        })
    }

    pub fn attributes(&self) -> Attributes {
        attributes([
            ("code", Some(json!(self.code))),
            ("value", Some(json!(self.value))),
            ("terminology", Some(json!(self.terminology))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        dv_coded_text(&self.value, &self.terminology, &self.code)
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        let defining_code = raw
            .get("defining_code")
            .ok_or_else(|| ConversionError::invalid_attribute("code", "missing defining_code"))?;
        let (terminology, code) = read_code_phrase(defining_code)?;
        Ok(Self {
            code,
            value: str_field(raw, "value")?.to_string(),
            terminology,
        })
    }
}

/// DV_ORDINAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalValue {
    pub ordinal: i64,
    pub code: String,
    pub value: String,
    pub terminology: String,
}

impl OrdinalValue {
    /// Builds an ordinal from a code, an ordinal degree or a label
    ///
    /// Whatever is supplied must identify exactly one declared list item.
    pub fn from_attributes(node: &IndexedNode, attrs: &Attributes, language: &str) -> ConversionResult<Self> {
        let input = coded_input(node).ok_or_else(|| {
            ConversionError::InvalidSchema(format!("ordinal '{}' declares no values", node.path))
        })?;
        let terminology = input
            .terminology
            .clone()
            .unwrap_or_else(|| LOCAL_TERMINOLOGY.to_string());
        let unknown = |code: String| ConversionError::UnknownCode {
            code,
            value_set: value_set_name(node, &terminology),
        };

        let item: &WebTemplateInputValue = if let Some(code) = get_string(attrs, "code")? {
            input.item(&code).ok_or_else(|| unknown(code))?
        } else if let Some(ordinal) = attrs.get("ordinal") {
            let degree = integer("ordinal", parse_number("ordinal", ordinal)?)?;
            let degree = degree.as_i64();
            input
                .list
                .iter()
                .find(|item| item.ordinal.is_some() && item.ordinal == degree)
                .ok_or_else(|| unknown(ordinal.to_string()))?
        } else if let Some(label) = get_string(attrs, "value")? {
            input
                .list
                .iter()
                .find(|item| item.display_label(language) == label)
                .ok_or_else(|| unknown(label))?
        } else {
            return Err(ConversionError::invalid_attribute("code", "required"));
        };

        let ordinal = item.ordinal.ok_or_else(|| {
            ConversionError::InvalidSchema(format!(
                "ordinal '{}' item {} has no degree",
                node.path, item.value
            ))
        })?;

        Ok(Self {
            ordinal,
            code: item.value.clone(),
            value: item.display_label(language).to_string(),
            terminology,
        })
    }

    pub fn attributes(&self) -> Attributes {
        attributes([
            ("code", Some(json!(self.code))),
            ("value", Some(json!(self.value))),
            ("ordinal", Some(json!(self.ordinal))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        json!({
            "_type": "DV_ORDINAL",
            "value": self.ordinal,
            "symbol": dv_coded_text(&self.value, &self.terminology, &self.code)
        })
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        let ordinal = raw
            .get("value")
            .and_then(Value::as_i64)
            .ok_or_else(|| ConversionError::invalid_attribute("ordinal", "missing in raw DV_ORDINAL"))?;
        let symbol = raw
            .get("symbol")
            .ok_or_else(|| ConversionError::invalid_attribute("code", "missing symbol"))?;
        let symbol = CodedTextValue::from_rm(symbol)?;
        Ok(Self {
            ordinal,
            code: symbol.code,
            value: symbol.value,
            terminology: symbol.terminology,
        })
    }
}

/// CODE_PHRASE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePhraseValue {
    pub code: String,
    pub terminology: String,
}

impl CodePhraseValue {
    pub fn from_attributes(node: &IndexedNode, attrs: &Attributes) -> ConversionResult<Self> {
        let code = get_string(attrs, "code")?
            .ok_or_else(|| ConversionError::invalid_attribute("code", "required"))?;
        let code_input = node.input(Some("code"));
        let terminology = get_string(attrs, "terminology")?
            .or_else(|| code_input.and_then(|input| input.terminology.clone()))
            .or_else(|| {
                node.input(Some("terminology"))
                    .and_then(|input| input.default_value.as_ref())
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| LOCAL_TERMINOLOGY.to_string());

        if let Some(input) = code_input.filter(|input| is_closed(input)) {
            if input.item(&code).is_none() {
                return Err(ConversionError::UnknownCode {
                    value_set: value_set_name(node, &terminology),
                    code,
                });
            }
        }
        Ok(Self { code, terminology })
    }

    pub fn attributes(&self) -> Attributes {
        attributes([
            ("code", Some(json!(self.code))),
            ("terminology", Some(json!(self.terminology))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        code_phrase(&self.terminology, &self.code)
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        let (terminology, code) = read_code_phrase(raw)?;
        Ok(Self { code, terminology })
    }
}
