//! DV_MULTIMEDIA and DV_PARSABLE

use super::quantity::{integer, parse_number};
use super::rm::{code_phrase, opt_str_field, read_code_phrase, str_field};
use super::{attributes, get_string, Attributes};
use crate::core::schema::openehr::MEDIA_TERMINOLOGY;
use crate::domain::{ConversionError, ConversionResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

/// Formalism used when a parsable value names none
pub const DEFAULT_FORMALISM: &str = "text/plain";

/// DV_MULTIMEDIA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultimediaValue {
    pub url: Option<String>,
    pub mediatype: String,
    pub size: u64,
    /// Base64 encoded inline data
    pub data: Option<String>,
    pub alternate_text: Option<String>,
}

impl MultimediaValue {
    /// Builds a media value; a URL or inline base64 data is required
    ///
    /// Inline data determines the size when `|size` is absent and must agree
    /// with it when present.
    pub fn from_attributes(attrs: &Attributes) -> ConversionResult<Self> {
        let mediatype = get_string(attrs, "mediatype")?
            .ok_or_else(|| ConversionError::invalid_attribute("mediatype", "required"))?;
        let url = get_string(attrs, "url")?;
        let data = get_string(attrs, "data")?;
        if url.is_none() && data.is_none() {
            return Err(ConversionError::invalid_attribute("url", "a url or inline data is required"));
        }

        let decoded_len = match &data {
            Some(data) => Some(
                STANDARD
                    .decode(data.trim())
                    .map_err(|e| ConversionError::invalid_attribute("data", format!("not base64: {e}")))?
                    .len() as u64,
            ),
            None => None,
        };
        let supplied_size = match attrs.get("size") {
            Some(size) => Some(
                integer("size", parse_number("size", size)?)?
                    .as_u64()
                    .ok_or_else(|| ConversionError::invalid_attribute("size", "must not be negative"))?,
            ),
            None => None,
        };

        let size = match (supplied_size, decoded_len) {
            (Some(size), Some(decoded)) if size != decoded => {
                return Err(ConversionError::invalid_attribute(
                    "size",
                    format!("{size} does not match {decoded} bytes of data"),
                ))
            }
            (Some(size), _) => size,
            (None, Some(decoded)) => decoded,
            (None, None) => 0,
        };

        Ok(Self {
            url,
            mediatype,
            size,
            data,
            alternate_text: get_string(attrs, "alternatetext")?,
        })
    }

    pub fn attributes(&self) -> Attributes {
        attributes([
            ("url", self.url.as_ref().map(|v| json!(v))),
            ("mediatype", Some(json!(self.mediatype))),
            ("size", Some(json!(self.size))),
            ("data", self.data.as_ref().map(|v| json!(v))),
            ("alternatetext", self.alternate_text.as_ref().map(|v| json!(v))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        let mut raw = json!({
            "_type": "DV_MULTIMEDIA",
            "media_type": code_phrase(MEDIA_TERMINOLOGY, &self.mediatype),
            "size": self.size
        });
        if let Some(url) = &self.url {
            raw["uri"] = json!({"_type": "DV_URI", "value": url});
        }
        if let Some(data) = &self.data {
            raw["data"] = json!(data);
        }
        if let Some(text) = &self.alternate_text {
            raw["alternate_text"] = json!(text);
        }
        raw
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        let media_type = raw
            .get("media_type")
            .ok_or_else(|| ConversionError::invalid_attribute("mediatype", "missing media_type"))?;
        let (_, mediatype) = read_code_phrase(media_type)?;
        Ok(Self {
            url: super::rm::text_field(raw, "uri").map(str::to_string),
            mediatype,
            size: raw.get("size").and_then(Value::as_u64).unwrap_or(0),
            data: opt_str_field(raw, "data").map(str::to_string),
            alternate_text: opt_str_field(raw, "alternate_text").map(str::to_string),
        })
    }
}

/// DV_PARSABLE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsableValue {
    pub value: String,
    pub formalism: String,
}

impl ParsableValue {
    pub fn from_attributes(attrs: &Attributes) -> ConversionResult<Self> {
        Ok(Self {
            value: get_string(attrs, "")?
                .ok_or_else(|| ConversionError::invalid_attribute("value", "required"))?,
            formalism: get_string(attrs, "formalism")?
                .unwrap_or_else(|| DEFAULT_FORMALISM.to_string()),
        })
    }

    pub fn attributes(&self) -> Attributes {
        attributes([
            ("", Some(json!(self.value))),
            ("formalism", Some(json!(self.formalism))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        json!({"_type": "DV_PARSABLE", "value": self.value, "formalism": self.formalism})
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        Ok(Self {
            value: str_field(raw, "value")?.to_string(),
            formalism: str_field(raw, "formalism")?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_inline_data_sets_size() {
        let media = MultimediaValue::from_attributes(&attrs(&[
            ("mediatype", json!("text/plain")),
            ("data", json!("aGVsbG8=")),
        ]))
        .unwrap();
        assert_eq!(media.size, 5);
        assert_eq!(MultimediaValue::from_rm(&media.to_rm()).unwrap(), media);
    }

    #[test]
    fn test_size_mismatch() {
        let err = MultimediaValue::from_attributes(&attrs(&[
            ("mediatype", json!("text/plain")),
            ("data", json!("aGVsbG8=")),
            ("size", json!(9)),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_media_requires_location() {
        assert!(MultimediaValue::from_attributes(&attrs(&[("mediatype", json!("image/png"))])).is_err());
        let linked = MultimediaValue::from_attributes(&attrs(&[
            ("mediatype", json!("image/png")),
            ("url", json!("https://example.org/x.png")),
            ("size", json!("1024")),
        ]))
        .unwrap();
        assert_eq!(linked.to_rm()["uri"]["value"], "https://example.org/x.png");
        assert_eq!(linked.size, 1024);
    }

    #[test]
    fn test_parsable_default_formalism() {
        let parsable = ParsableValue::from_attributes(&attrs(&[("", json!("x > 1"))])).unwrap();
        assert_eq!(parsable.formalism, DEFAULT_FORMALISM);
    }
}
