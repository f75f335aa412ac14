//! Value coercion layer
//!
//! Converts between the flat attribute form of a leaf (`|magnitude`, `|unit`,
//! `|code`, ...) and typed [`DataValue`]s, and between [`DataValue`]s and raw
//! RM JSON. Every dispatch is an exhaustive match on [`RmType`] or on the
//! [`DataValue`] tag.
//!
//! Attribute maps use the empty key `""` for the bare value of a leaf
//! (`encounter/comment` rather than `encounter/comment|value`). Each type has a
//! fixed set of canonical keys plus a few aliases, normalised by
//! [`canonicalize`] before coercion.

pub mod duration;
pub mod identifier;
pub mod interval;
pub mod media;
pub mod quantity;
pub mod rm;
pub mod temporal;
pub mod text;

use crate::core::schema::IndexedNode;
use crate::domain::{ConversionError, ConversionResult, RmType};
use indexmap::IndexMap;
use serde_json::{json, Value};

pub use duration::{allowed_components, DurationValue};
pub use identifier::{parse_ehr_uri, parse_uri, IdentifierValue, PartyId, PartyValue};
pub use interval::{compare, IntervalValue, INTERVAL_FLAGS};
pub use media::{MultimediaValue, ParsableValue};
pub use quantity::{parse_number, real, CountValue, ProportionKind, ProportionValue, QuantityValue};
pub use temporal::{parse_boolean, TemporalKind, TemporalValue};
pub use text::{CodePhraseValue, CodedTextValue, OrdinalValue, LOCAL_TERMINOLOGY};

/// Attributes of one leaf occurrence, keyed by suffix (`""` = bare value)
pub type Attributes = IndexMap<String, Value>;

/// A typed data value
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Text(String),
    CodedText(CodedTextValue),
    Quantity(QuantityValue),
    Count(CountValue),
    Proportion(ProportionValue),
    Duration(DurationValue),
    Interval(IntervalValue),
    Ordinal(OrdinalValue),
    Temporal(TemporalValue),
    Boolean(bool),
    Identifier(IdentifierValue),
    Multimedia(MultimediaValue),
    Uri(String),
    EhrUri(String),
    Parsable(ParsableValue),
    CodePhrase(CodePhraseValue),
    Party(PartyValue),
}

impl DataValue {
    /// RM type written into the raw `_type`
    pub fn rm_type_name(&self) -> &'static str {
        match self {
            DataValue::Text(_) => "DV_TEXT",
            DataValue::CodedText(_) => "DV_CODED_TEXT",
            DataValue::Quantity(_) => "DV_QUANTITY",
            DataValue::Count(_) => "DV_COUNT",
            DataValue::Proportion(_) => "DV_PROPORTION",
            DataValue::Duration(_) => "DV_DURATION",
            DataValue::Interval(_) => "DV_INTERVAL",
            DataValue::Ordinal(_) => "DV_ORDINAL",
            DataValue::Temporal(value) => value.kind.rm_type(),
            DataValue::Boolean(_) => "DV_BOOLEAN",
            DataValue::Identifier(_) => "DV_IDENTIFIER",
            DataValue::Multimedia(_) => "DV_MULTIMEDIA",
            DataValue::Uri(_) => "DV_URI",
            DataValue::EhrUri(_) => "DV_EHR_URI",
            DataValue::Parsable(_) => "DV_PARSABLE",
            DataValue::CodePhrase(_) => "CODE_PHRASE",
            DataValue::Party(PartyValue::Myself) => "PARTY_SELF",
            DataValue::Party(_) => "PARTY_IDENTIFIED",
        }
    }

    /// Raw RM JSON of the value
    pub fn to_rm(&self) -> Value {
        match self {
            DataValue::Text(text) => rm::dv_text(text),
            DataValue::CodedText(value) => value.to_rm(),
            DataValue::Quantity(value) => value.to_rm(),
            DataValue::Count(value) => value.to_rm(),
            DataValue::Proportion(value) => value.to_rm(),
            DataValue::Duration(value) => value.to_rm(),
            DataValue::Interval(value) => value.to_rm(),
            DataValue::Ordinal(value) => value.to_rm(),
            DataValue::Temporal(value) => value.to_rm(),
            DataValue::Boolean(flag) => json!({"_type": "DV_BOOLEAN", "value": flag}),
            DataValue::Identifier(value) => value.to_rm(),
            DataValue::Multimedia(value) => value.to_rm(),
            DataValue::Uri(uri) => json!({"_type": "DV_URI", "value": uri}),
            DataValue::EhrUri(uri) => json!({"_type": "DV_EHR_URI", "value": uri}),
            DataValue::Parsable(value) => value.to_rm(),
            DataValue::CodePhrase(value) => value.to_rm(),
            DataValue::Party(value) => value.to_rm(),
        }
    }

    /// Reads a raw value that sits in a slot declared as `expected`
    ///
    /// The raw `_type` decides the variant, so a DV_CODED_TEXT in a DV_TEXT
    /// slot reads as coded text. A type the slot does not accept is an
    /// [`ConversionError::InvalidAttribute`] on `_type`.
    pub fn from_rm(expected: &RmType, raw: &Value) -> ConversionResult<Self> {
        let raw_type = rm::type_of(raw)
            .ok_or_else(|| ConversionError::invalid_attribute("_type", "missing on data value"))?;
        let accepted = expected.accepts(raw_type)
            || (expected.is_party() && raw_type.starts_with("PARTY_"));
        if !accepted {
            return Err(ConversionError::invalid_attribute(
                "_type",
                format!("{raw_type} where {expected} is expected"),
            ));
        }

        Ok(match raw_type {
            "DV_TEXT" => DataValue::Text(rm::str_field(raw, "value")?.to_string()),
            "DV_CODED_TEXT" => DataValue::CodedText(CodedTextValue::from_rm(raw)?),
            "DV_QUANTITY" => DataValue::Quantity(QuantityValue::from_rm(raw)?),
            "DV_COUNT" => DataValue::Count(CountValue::from_rm(raw)?),
            "DV_PROPORTION" => DataValue::Proportion(ProportionValue::from_rm(raw)?),
            "DV_DURATION" => DataValue::Duration(DurationValue::from_rm(raw)?),
            "DV_ORDINAL" => DataValue::Ordinal(OrdinalValue::from_rm(raw)?),
            "DV_DATE_TIME" => DataValue::Temporal(TemporalValue::from_rm(TemporalKind::DateTime, raw)?),
            "DV_DATE" => DataValue::Temporal(TemporalValue::from_rm(TemporalKind::Date, raw)?),
            "DV_TIME" => DataValue::Temporal(TemporalValue::from_rm(TemporalKind::Time, raw)?),
            "DV_BOOLEAN" => DataValue::Boolean(
                raw.get("value")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| ConversionError::invalid_attribute("value", "missing in raw DV_BOOLEAN"))?,
            ),
            "DV_IDENTIFIER" => DataValue::Identifier(IdentifierValue::from_rm(raw)?),
            "DV_MULTIMEDIA" => DataValue::Multimedia(MultimediaValue::from_rm(raw)?),
            "DV_URI" => DataValue::Uri(rm::str_field(raw, "value")?.to_string()),
            "DV_EHR_URI" => DataValue::EhrUri(rm::str_field(raw, "value")?.to_string()),
            "DV_PARSABLE" => DataValue::Parsable(ParsableValue::from_rm(raw)?),
            "CODE_PHRASE" => DataValue::CodePhrase(CodePhraseValue::from_rm(raw)?),
            party if party.starts_with("PARTY_") => DataValue::Party(PartyValue::from_rm(raw)?),
            interval if interval.starts_with("DV_INTERVAL") => match expected {
                RmType::DvInterval(element) => DataValue::Interval(IntervalValue::from_rm(element, raw)?),
                other => {
                    return Err(ConversionError::invalid_attribute(
                        "_type",
                        format!("{interval} where {other} is expected"),
                    ))
                }
            },
            other => {
                return Err(ConversionError::invalid_attribute(
                    "_type",
                    format!("unsupported data value type {other}"),
                ))
            }
        })
    }
}

/// Canonical attribute keys of a leaf type
pub fn attribute_keys(rm_type: &RmType) -> &'static [&'static str] {
    match rm_type {
        RmType::DvText => &["", "code", "terminology"],
        RmType::DvCodedText => &["code", "value", "terminology"],
        RmType::DvQuantity => &["magnitude", "unit", "precision"],
        RmType::DvCount => &[""],
        RmType::DvProportion => &["numerator", "denominator", "type", "precision"],
        RmType::DvDuration => &["", "year", "month", "week", "day", "hour", "minute", "second"],
        RmType::DvInterval(_) => &INTERVAL_FLAGS,
        RmType::DvOrdinal => &["code", "value", "ordinal"],
        RmType::DvDateTime
        | RmType::DvDate
        | RmType::DvTime
        | RmType::DvBoolean
        | RmType::DvUri
        | RmType::DvEhrUri => &[""],
        RmType::DvIdentifier => &["id", "issuer", "assigner", "type"],
        RmType::DvMultimedia => &["url", "mediatype", "size", "data", "alternatetext"],
        RmType::DvParsable => &["", "formalism"],
        RmType::CodePhrase => &["code", "terminology"],
        RmType::PartyProxy | RmType::PartyIdentified | RmType::PartySelf => {
            &["name", "id", "id_scheme", "id_namespace"]
        }
        RmType::Composition
        | RmType::Section
        | RmType::Observation
        | RmType::Evaluation
        | RmType::Instruction
        | RmType::Action
        | RmType::AdminEntry
        | RmType::Activity
        | RmType::History
        | RmType::Event
        | RmType::PointEvent
        | RmType::IntervalEvent
        | RmType::ItemTree
        | RmType::ItemStructure
        | RmType::Cluster
        | RmType::Element
        | RmType::EventContext
        | RmType::IsmTransition => &[],
    }
}

/// Alternative spelling of a canonical key
fn alias(rm_type: &RmType, key: &str) -> Option<&'static str> {
    match (rm_type, key) {
        (
            RmType::DvText
            | RmType::DvDuration
            | RmType::DvDateTime
            | RmType::DvDate
            | RmType::DvTime
            | RmType::DvBoolean
            | RmType::DvUri
            | RmType::DvEhrUri
            | RmType::DvParsable,
            "value",
        ) => Some(""),
        (RmType::DvCount, "magnitude") => Some(""),
        (RmType::DvCodedText | RmType::DvOrdinal | RmType::CodePhrase, "") => Some("code"),
        (RmType::DvIdentifier, "") => Some("id"),
        (RmType::DvMultimedia, "") => Some("url"),
        (RmType::PartyProxy | RmType::PartyIdentified | RmType::PartySelf, "") => Some("name"),
        _ => None,
    }
}

/// Canonical form of one attribute key
pub fn canonical_key<'a>(rm_type: &RmType, key: &'a str) -> &'a str {
    alias(rm_type, key).unwrap_or(key)
}

/// Normalises aliases and rejects keys the type does not have
///
/// ```
/// use meridian::core::value::{canonicalize, Attributes};
/// use meridian::domain::RmType;
/// use serde_json::json;
///
/// let mut attrs = Attributes::new();
/// attrs.insert("magnitude".to_string(), json!(3));
/// let canonical = canonicalize(&RmType::DvCount, &attrs).unwrap();
/// assert_eq!(canonical[""], json!(3));
///
/// attrs.insert("unit".to_string(), json!("mm"));
/// assert!(canonicalize(&RmType::DvCount, &attrs).is_err());
/// ```
pub fn canonicalize(rm_type: &RmType, attrs: &Attributes) -> ConversionResult<Attributes> {
    let keys = attribute_keys(rm_type);
    let mut canonical = Attributes::with_capacity(attrs.len());
    for (key, value) in attrs {
        let name = canonical_key(rm_type, key);
        if !keys.contains(&name) {
            return Err(ConversionError::invalid_attribute(
                key.as_str(),
                format!("not an attribute of {rm_type}"),
            ));
        }
        match canonical.get(name) {
            Some(existing) if existing != value => {
                return Err(ConversionError::invalid_attribute(
                    name,
                    "supplied twice with different values",
                ))
            }
            Some(_) => {}
            None => {
                canonical.insert(name.to_string(), value.clone());
            }
        }
    }
    Ok(canonical)
}

/// Whether every key is an attribute of the type
pub fn covers<'a>(rm_type: &RmType, keys: impl IntoIterator<Item = &'a str>) -> bool {
    let accepted = attribute_keys(rm_type);
    let mut keys = keys.into_iter().peekable();
    keys.peek().is_some() && keys.all(|key| accepted.contains(&canonical_key(rm_type, key)))
}

/// Coerces the attributes of one leaf occurrence into a typed value
pub fn to_value(node: &IndexedNode, attrs: &Attributes, language: &str) -> ConversionResult<DataValue> {
    let attrs = canonicalize(&node.rm_type, attrs)?;
    let bare = || {
        attrs
            .get("")
            .filter(|value| !value.is_null())
            .ok_or_else(|| ConversionError::invalid_attribute("value", "required"))
    };

    Ok(match &node.rm_type {
        RmType::DvText => match get_string(&attrs, "code")? {
            Some(code) => DataValue::CodedText(CodedTextValue {
                code,
                value: non_empty_text(bare()?)?,
                terminology: get_string(&attrs, "terminology")?.ok_or_else(|| {
                    ConversionError::invalid_attribute("terminology", "required with a code")
                })?,
            }),
            None => DataValue::Text(non_empty_text(bare()?)?),
        },
        RmType::DvCodedText => DataValue::CodedText(CodedTextValue::from_attributes(node, &attrs, language)?),
        RmType::DvQuantity => DataValue::Quantity(QuantityValue::from_attributes(node, &attrs)?),
        RmType::DvCount => DataValue::Count(CountValue::from_attributes(node, &attrs)?),
        RmType::DvProportion => DataValue::Proportion(ProportionValue::from_attributes(node, &attrs)?),
        RmType::DvDuration => DataValue::Duration(DurationValue::from_attributes(node, &attrs)?),
        RmType::DvOrdinal => DataValue::Ordinal(OrdinalValue::from_attributes(node, &attrs, language)?),
        RmType::DvDateTime => DataValue::Temporal(TemporalValue::from_scalar(TemporalKind::DateTime, bare()?)?),
        RmType::DvDate => DataValue::Temporal(TemporalValue::from_scalar(TemporalKind::Date, bare()?)?),
        RmType::DvTime => DataValue::Temporal(TemporalValue::from_scalar(TemporalKind::Time, bare()?)?),
        RmType::DvBoolean => DataValue::Boolean(parse_boolean("value", bare()?)?),
        RmType::DvIdentifier => DataValue::Identifier(IdentifierValue::from_attributes(&attrs)?),
        RmType::DvMultimedia => DataValue::Multimedia(MultimediaValue::from_attributes(&attrs)?),
        RmType::DvUri => DataValue::Uri(parse_uri(bare()?)?),
        RmType::DvEhrUri => DataValue::EhrUri(parse_ehr_uri(bare()?)?),
        RmType::DvParsable => DataValue::Parsable(ParsableValue::from_attributes(&attrs)?),
        RmType::CodePhrase => DataValue::CodePhrase(CodePhraseValue::from_attributes(node, &attrs)?),
        RmType::PartyProxy | RmType::PartyIdentified | RmType::PartySelf => {
            DataValue::Party(PartyValue::from_attributes(&attrs)?)
        }
        RmType::DvInterval(_) => {
            return Err(ConversionError::invalid_attribute(
                "value",
                "interval values are built from their lower and upper bounds",
            ))
        }
        other => {
            return Err(ConversionError::InvalidSchema(format!(
                "'{}' of type {other} holds no data value",
                node.path
            )))
        }
    })
}

/// Attributes of a typed value in canonical form
///
/// Durations use the component form when the node declares component
/// inputs, and fail when a non-zero component has no input. Coded text in a
/// DV_TEXT slot keeps its value as the bare text.
pub fn from_value(node: &IndexedNode, value: &DataValue) -> ConversionResult<Attributes> {
    Ok(match value {
        DataValue::Text(text) => attributes([("", Some(json!(text)))]),
        DataValue::CodedText(coded) if node.rm_type == RmType::DvText => attributes([
            ("", Some(json!(coded.value))),
            ("code", Some(json!(coded.code))),
            ("terminology", Some(json!(coded.terminology))),
        ]),
        DataValue::CodedText(coded) => coded.attributes(),
        DataValue::Quantity(quantity) => quantity.attributes(),
        DataValue::Count(count) => count.attributes(),
        DataValue::Proportion(proportion) => proportion.attributes(),
        DataValue::Duration(duration) => duration.attributes(&allowed_components(node))?,
        DataValue::Interval(interval) => interval.attributes(),
        DataValue::Ordinal(ordinal) => ordinal.attributes(),
        DataValue::Temporal(temporal) => attributes([("", Some(json!(temporal.value)))]),
        DataValue::Boolean(flag) => attributes([("", Some(json!(flag)))]),
        DataValue::Identifier(identifier) => identifier.attributes(),
        DataValue::Multimedia(media) => media.attributes(),
        DataValue::Uri(uri) | DataValue::EhrUri(uri) => attributes([("", Some(json!(uri)))]),
        DataValue::Parsable(parsable) => parsable.attributes(),
        DataValue::CodePhrase(phrase) => phrase.attributes(),
        DataValue::Party(party) => party.attributes(),
    })
}

fn non_empty_text(value: &Value) -> ConversionResult<String> {
    let text = scalar_string("value", value)?;
    if text.is_empty() {
        return Err(ConversionError::invalid_attribute("value", "text must not be empty"));
    }
    Ok(text)
}

/// Collects present attributes, preserving order
pub(crate) fn attributes<const N: usize>(pairs: [(&str, Option<Value>); N]) -> Attributes {
    pairs
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect()
}

/// Renders a JSON scalar as text
pub(crate) fn scalar_string(attribute: &str, value: &Value) -> ConversionResult<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(ConversionError::invalid_attribute(
            attribute,
            format!("expected a scalar, got {other}"),
        )),
    }
}

/// Reads an optional text attribute; `null` counts as absent
pub(crate) fn get_string(attrs: &Attributes, key: &str) -> ConversionResult<Option<String>> {
    attrs
        .get(key)
        .filter(|value| !value.is_null())
        .map(|value| scalar_string(key, value))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SchemaIndex;
    use crate::domain::WebTemplate;
    use test_case::test_case;

    fn index() -> SchemaIndex {
        let template: WebTemplate = serde_json::from_value(json!({
            "templateId": "Values.v1",
            "tree": {
                "id": "values", "name": "Values", "rmType": "COMPOSITION", "min": 1,
                "nodeId": "openEHR-EHR-COMPOSITION.values.v1",
                "children": [{
                    "id": "entry", "rmType": "ADMIN_ENTRY", "nodeId": "openEHR-EHR-ADMIN_ENTRY.values.v1",
                    "children": [
                        {"id": "length", "rmType": "DV_QUANTITY", "nodeId": "at0001", "inputs": [
                            {"suffix": "magnitude", "type": "DECIMAL",
                             "validation": {"range": {"minOp": ">=", "min": 0.0}}},
                            {"suffix": "unit", "type": "CODED_TEXT", "list": [
                                {"value": "mm", "validation": {"range": {"minOp": ">=", "min": 0.0, "maxOp": "<=", "max": 1000.0}}},
                                {"value": "cm"}
                            ]}
                        ]},
                        {"id": "weight", "rmType": "DV_QUANTITY", "nodeId": "at0002", "inputs": [
                            {"suffix": "magnitude", "type": "DECIMAL",
                             "validation": {"precision": {"minOp": ">=", "min": 0.0, "maxOp": "<=", "max": 1.0}}},
                            {"suffix": "unit", "type": "CODED_TEXT", "list": [{"value": "kg"}]}
                        ]},
                        {"id": "count", "rmType": "DV_COUNT", "nodeId": "at0003"},
                        {"id": "note", "rmType": "DV_TEXT", "nodeId": "at0004"},
                        {"id": "ratio", "rmType": "DV_PROPORTION", "nodeId": "at0005", "proportionTypes": ["fraction"]},
                        {"id": "age", "rmType": "DV_DURATION", "nodeId": "at0006", "inputs": [
                            {"suffix": "year", "type": "INTEGER"},
                            {"suffix": "month", "type": "INTEGER"}
                        ]},
                        {"id": "flag", "rmType": "DV_BOOLEAN", "nodeId": "at0007"},
                        {"id": "share", "rmType": "DV_PROPORTION", "nodeId": "at0008", "proportionTypes": ["ratio"], "inputs": [
                            {"suffix": "numerator", "type": "DECIMAL",
                             "validation": {"precision": {"minOp": ">=", "min": 0.0, "maxOp": "<=", "max": 0.0}}},
                            {"suffix": "denominator", "type": "DECIMAL"}
                        ]}
                    ]
                }]
            }
        }))
        .unwrap();
        SchemaIndex::build(&template).unwrap()
    }

    fn node<'a>(index: &'a SchemaIndex, id: &str) -> &'a IndexedNode {
        let entry = index.resolve(index.root(), "entry", false).unwrap().candidates[0];
        index.node(index.resolve(entry, id, false).unwrap().candidates[0])
    }

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_quantity_magnitude_becomes_real() {
        let index = index();
        let value = to_value(
            node(&index, "length"),
            &attrs(&[("magnitude", json!(300)), ("unit", json!("mm"))]),
            "en",
        )
        .unwrap();
        let raw = value.to_rm();
        assert_eq!(serde_json::to_string(&raw["magnitude"]).unwrap(), "300.0");
        assert_eq!(raw["units"], "mm");
    }

    #[test]
    fn test_quantity_large_integer_stays_integral() {
        let index = index();
        let value = to_value(
            node(&index, "length"),
            &attrs(&[("magnitude", json!("1234567890123456789")), ("unit", json!("cm"))]),
            "en",
        )
        .unwrap();
        let raw = value.to_rm();
        assert_eq!(raw["magnitude"].to_string(), "1234567890123456789");
        let back = from_value(node(&index, "length"), &DataValue::from_rm(&RmType::DvQuantity, &raw).unwrap()).unwrap();
        assert_eq!(back["magnitude"].to_string(), "1234567890123456789");
    }

    #[test]
    fn test_quantity_invalid_unit() {
        let index = index();
        let err = to_value(
            node(&index, "length"),
            &attrs(&[("magnitude", json!(3)), ("unit", json!("km"))]),
            "en",
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidUnit { .. }));
    }

    #[test]
    fn test_quantity_unit_range() {
        let index = index();
        let err = to_value(
            node(&index, "length"),
            &attrs(&[("magnitude", json!(5000)), ("unit", json!("mm"))]),
            "en",
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::ConstraintViolation(_)));
    }

    #[test]
    fn test_single_unit_is_defaulted() {
        let index = index();
        let value = to_value(node(&index, "weight"), &attrs(&[("magnitude", json!(72.5))]), "en").unwrap();
        assert!(matches!(value, DataValue::Quantity(ref q) if q.unit == "kg"));
    }

    #[test_case(0 ; "lowest")]
    #[test_case(1 ; "highest")]
    fn test_precision_inside_declared_range(precision: i64) {
        let index = index();
        let value = to_value(
            node(&index, "weight"),
            &attrs(&[("magnitude", json!(72.5)), ("precision", json!(precision))]),
            "en",
        )
        .unwrap();
        assert_eq!(value.to_rm()["precision"], json!(precision));
    }

    #[test]
    fn test_precision_outside_declared_range() {
        let index = index();
        let err = to_value(
            node(&index, "weight"),
            &attrs(&[("magnitude", json!(1.2345)), ("precision", json!(4))]),
            "en",
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::ConstraintViolation(ref message) if message.contains("precision 4")));

        let err = to_value(
            node(&index, "share"),
            &attrs(&[("numerator", json!(1.5)), ("denominator", json!(2)), ("precision", json!(1))]),
            "en",
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::ConstraintViolation(_)));

        assert!(to_value(
            node(&index, "share"),
            &attrs(&[("numerator", json!(3)), ("denominator", json!(4)), ("precision", json!(0))]),
            "en",
        )
        .is_ok());
    }

    #[test_case("count", &[("magnitude", json!(3))], "DV_COUNT" ; "count alias")]
    #[test_case("note", &[("value", json!("free text"))], "DV_TEXT" ; "text alias")]
    #[test_case("flag", &[("", json!("true"))], "DV_BOOLEAN" ; "boolean string")]
    #[test_case("age", &[("year", json!(2))], "DV_DURATION" ; "duration component")]
    fn test_coerced_type(id: &str, pairs: &[(&str, Value)], expected: &str) {
        let index = index();
        let value = to_value(node(&index, id), &attrs(pairs), "en").unwrap();
        assert_eq!(value.rm_type_name(), expected);
        assert_eq!(value.to_rm()["_type"], expected);
    }

    #[test]
    fn test_unknown_attribute() {
        let index = index();
        let err = to_value(node(&index, "count"), &attrs(&[("unit", json!("mm"))]), "en").unwrap_err();
        assert!(matches!(err, ConversionError::InvalidAttribute { ref attribute, .. } if attribute == "unit"));
    }

    #[test]
    fn test_proportion_kind_mismatch() {
        let index = index();
        let err = to_value(
            node(&index, "ratio"),
            &attrs(&[("numerator", json!(1)), ("denominator", json!(2)), ("type", json!(0))]),
            "en",
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidAttribute { .. }));

        let err = to_value(
            node(&index, "ratio"),
            &attrs(&[("numerator", json!(1.5)), ("denominator", json!(2))]),
            "en",
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_duration_excluded_component() {
        let index = index();
        let err = to_value(node(&index, "age"), &attrs(&[("", json!("P2W"))]), "en").unwrap_err();
        assert!(matches!(err, ConversionError::ConstraintViolation(_)));

        let value = to_value(node(&index, "age"), &attrs(&[("", json!("P3Y"))]), "en").unwrap();
        let flat = from_value(node(&index, "age"), &value).unwrap();
        assert_eq!(flat["year"], json!(3));
        assert_eq!(flat["month"], json!(0));
    }

    #[test]
    fn test_coded_text_in_text_slot() {
        let index = index();
        let raw = rm::dv_coded_text("Fever", "SNOMED-CT", "386661006");
        let value = DataValue::from_rm(&RmType::DvText, &raw).unwrap();
        let flat = from_value(node(&index, "note"), &value).unwrap();
        assert_eq!(flat[""], json!("Fever"));
        let again = to_value(node(&index, "note"), &flat, "en").unwrap();
        assert_eq!(again, value);
    }

    #[test]
    fn test_from_rm_rejects_foreign_type() {
        let raw = json!({"_type": "DV_COUNT", "magnitude": 1});
        assert!(DataValue::from_rm(&RmType::DvQuantity, &raw).is_err());
    }

    #[test]
    fn test_covers() {
        assert!(covers(&RmType::DvQuantity, ["magnitude", "unit"]));
        assert!(!covers(&RmType::DvCount, ["magnitude", "unit"]));
        assert!(covers(&RmType::DvText, [""]));
        assert!(!covers(&RmType::DvText, std::iter::empty()));
    }
}
