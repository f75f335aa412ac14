//! Raw RM JSON constructors and readers
//!
//! Every object written into a raw composition carries a `_type`
//! discriminator. These helpers keep the shapes of the small recurring
//! structures (CODE_PHRASE, DV_TEXT, PARTY_REF, ...) in one place.

use crate::domain::{ConversionError, ConversionResult};
use serde_json::{json, Map, Value};

/// A raw RM object
pub type RawObject = Map<String, Value>;

/// `_type` of a raw value
pub fn type_of(raw: &Value) -> Option<&str> {
    raw.get("_type").and_then(Value::as_str)
}

/// `name/value` of a raw LOCATABLE
pub fn name_of(raw: &Value) -> Option<&str> {
    raw.get("name")
        .and_then(|name| name.get("value"))
        .and_then(Value::as_str)
}

/// DV_TEXT
pub fn dv_text(value: &str) -> Value {
    json!({"_type": "DV_TEXT", "value": value})
}

/// DV_CODED_TEXT
pub fn dv_coded_text(value: &str, terminology: &str, code: &str) -> Value {
    json!({
        "_type": "DV_CODED_TEXT",
        "value": value,
        "defining_code": code_phrase(terminology, code)
    })
}

/// CODE_PHRASE
pub fn code_phrase(terminology: &str, code: &str) -> Value {
    json!({
        "_type": "CODE_PHRASE",
        "terminology_id": {"_type": "TERMINOLOGY_ID", "value": terminology},
        "code_string": code
    })
}

/// DV_DATE_TIME
pub fn dv_date_time(value: &str) -> Value {
    json!({"_type": "DV_DATE_TIME", "value": value})
}

/// PARTY_SELF
pub fn party_self() -> Value {
    json!({"_type": "PARTY_SELF"})
}

/// PARTY_REF with a GENERIC_ID
pub fn party_ref(id: &str, scheme: &str, namespace: &str, ref_type: &str) -> Value {
    json!({
        "_type": "PARTY_REF",
        "id": {"_type": "GENERIC_ID", "value": id, "scheme": scheme},
        "namespace": namespace,
        "type": ref_type
    })
}

/// OBJECT_REF with a GENERIC_ID
pub fn object_ref(id: &str, scheme: &str, namespace: &str, ref_type: &str) -> Value {
    json!({
        "_type": "OBJECT_REF",
        "id": {"_type": "GENERIC_ID", "value": id, "scheme": scheme},
        "namespace": namespace,
        "type": ref_type
    })
}

/// LINK
pub fn link(meaning: &str, link_type: &str, target: &str) -> Value {
    json!({
        "_type": "LINK",
        "meaning": dv_text(meaning),
        "type": dv_text(link_type),
        "target": {"_type": "DV_EHR_URI", "value": target}
    })
}

/// Reads a required string field of a raw value
pub fn str_field<'a>(raw: &'a Value, field: &str) -> ConversionResult<&'a str> {
    raw.get(field).and_then(Value::as_str).ok_or_else(|| {
        ConversionError::invalid_attribute(
            field,
            format!("missing in raw {}", type_of(raw).unwrap_or("value")),
        )
    })
}

/// Reads an optional string field of a raw value
pub fn opt_str_field<'a>(raw: &'a Value, field: &str) -> Option<&'a str> {
    raw.get(field).and_then(Value::as_str)
}

/// Reads `value` of a nested DV_TEXT-like field
pub fn text_field<'a>(raw: &'a Value, field: &str) -> Option<&'a str> {
    raw.get(field)
        .and_then(|inner| inner.get("value"))
        .and_then(Value::as_str)
}

/// Reads `(terminology, code)` of a raw CODE_PHRASE
pub fn read_code_phrase(raw: &Value) -> ConversionResult<(String, String)> {
    let terminology = raw
        .get("terminology_id")
        .and_then(|t| t.get("value"))
        .and_then(Value::as_str)
        .ok_or_else(|| ConversionError::invalid_attribute("terminology", "missing terminology_id"))?;
    let code = str_field(raw, "code_string")?;
    Ok((terminology.to_string(), code.to_string()))
}

/// Reads `(id, scheme, namespace, type)` of a raw PARTY_REF or OBJECT_REF
pub fn read_object_ref(raw: &Value) -> ConversionResult<(String, Option<String>, String, String)> {
    let id = raw
        .get("id")
        .and_then(|id| id.get("value"))
        .and_then(Value::as_str)
        .ok_or_else(|| ConversionError::invalid_attribute("id", "missing reference id"))?;
    let scheme = raw
        .get("id")
        .and_then(|id| id.get("scheme"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let namespace = str_field(raw, "namespace")?;
    let ref_type = str_field(raw, "type")?;
    Ok((
        id.to_string(),
        scheme,
        namespace.to_string(),
        ref_type.to_string(),
    ))
}

/// Ensures a raw value is an object with a `_type`
pub fn expect_typed<'a>(raw: &'a Value, path: &str) -> ConversionResult<&'a str> {
    if !raw.is_object() {
        return Err(ConversionError::MalformedTree {
            path: path.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    }
    type_of(raw).ok_or_else(|| ConversionError::MalformedTree {
        path: path.to_string(),
        reason: "object has no _type".to_string(),
    })
}
