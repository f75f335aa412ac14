//! Meta segments below a node occurrence
//!
//! `_uid`, `_name` and `_link:N` apply to any LOCATABLE, `_work_flow_id` and
//! `_other_participation:N` to entries, `_end_time`, `_location` and
//! `_health_care_facility` to the event context. `_mapping:N` and
//! `_normal_range` decorate the data value of a leaf.

use super::input::InputNode;
use crate::core::path::join_segment;
use crate::core::schema::openehr::{participation_mode_name, DEFAULT_PARTICIPATION_MODE, OPENEHR};
use crate::core::schema::IndexedNode;
use crate::core::value::rm::{code_phrase, dv_coded_text, dv_date_time, dv_text, link, object_ref, type_of, RawObject};
use crate::core::value::{
    canonicalize, get_string, parse_ehr_uri, to_value, Attributes, IntervalValue, PartyValue, TemporalKind,
    TemporalValue,
};
use crate::domain::{ContextBag, ConversionError, ConversionResult, LocatableUid, RmType};
use indexmap::IndexMap;
use serde_json::{json, Value};

/// Segments handled by [`apply_value_meta`]
const VALUE_META: &[&str] = &["_mapping", "_normal_range"];

/// Term mapping match operators
const MAPPING_MATCHES: &[&str] = &["=", "<", ">", "?"];

/// Applies the object level meta segments of an occurrence to its raw object
///
/// Value level segments are left to [`apply_value_meta`]. A segment that
/// does not apply to the object's RM type is an invalid attribute.
pub(super) fn apply_object_meta(
    object: &mut RawObject,
    input: &InputNode,
    context: &ContextBag,
) -> ConversionResult<()> {
    let type_name = object
        .get("_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let rm_type = type_name.parse::<RmType>().ok();

    for (name, occurrences) in input.meta_children() {
        if VALUE_META.contains(&name.as_str()) {
            continue;
        }
        let applies = match name.as_str() {
            "_uid" | "_name" | "_link" => rm_type.as_ref().is_some_and(RmType::is_locatable),
            "_work_flow_id" | "_other_participation" => rm_type.as_ref().is_some_and(RmType::is_entry),
            "_end_time" | "_location" | "_health_care_facility" => rm_type == Some(RmType::EventContext),
            _ => {
                return Err(ConversionError::malformed_path(
                    join_segment(&input.path, name, None),
                    "unknown meta segment",
                ))
            }
        };
        if !applies {
            return Err(ConversionError::invalid_attribute(
                name.as_str(),
                format!("not applicable to {type_name}"),
            ));
        }

        match name.as_str() {
            "_link" => {
                for occurrence in occurrences.values() {
                    let raw = link_value(occurrence).map_err(|e| e.at(&occurrence.path))?;
                    push(object, "links", raw);
                }
            }
            "_other_participation" => {
                for occurrence in occurrences.values() {
                    let raw = participation(occurrence, context).map_err(|e| e.at(&occurrence.path))?;
                    push(object, "other_participations", raw);
                }
            }
            _ => {
                let occurrence = single(input, name, occurrences)?;
                let (attribute, raw) = match name.as_str() {
                    "_uid" => ("uid", uid(occurrence)),
                    "_name" => ("name", name_value(occurrence)),
                    "_work_flow_id" => ("work_flow_id", work_flow_id(occurrence)),
                    "_end_time" => ("end_time", end_time(occurrence)),
                    "_location" => ("location", location(occurrence)),
                    _ => ("health_care_facility", facility(occurrence, context)),
                };
                let raw = raw.map_err(|e| e.at(&occurrence.path))?;
                object.insert(attribute.to_string(), raw);
            }
        }
    }
    Ok(())
}

/// Applies `_mapping:N` and `_normal_range` to the raw data value of a leaf
pub(super) fn apply_value_meta(
    raw: &mut Value,
    node: &IndexedNode,
    input: &InputNode,
    language: &str,
) -> ConversionResult<()> {
    let raw_type = type_of(raw).unwrap_or_default().to_string();
    for (name, occurrences) in input.meta_children() {
        match name.as_str() {
            "_mapping" => {
                if !matches!(raw_type.as_str(), "DV_TEXT" | "DV_CODED_TEXT") {
                    return Err(ConversionError::invalid_attribute(
                        "_mapping",
                        format!("not applicable to {raw_type}"),
                    ));
                }
                for occurrence in occurrences.values() {
                    let mapping = term_mapping(occurrence).map_err(|e| e.at(&occurrence.path))?;
                    if let Some(object) = raw.as_object_mut() {
                        push(object, "mappings", mapping);
                    }
                }
            }
            "_normal_range" => {
                if !matches!(
                    raw_type.as_str(),
                    "DV_QUANTITY" | "DV_COUNT" | "DV_ORDINAL" | "DV_PROPORTION"
                ) {
                    return Err(ConversionError::invalid_attribute(
                        "_normal_range",
                        format!("not applicable to {raw_type}"),
                    ));
                }
                let occurrence = single(input, name, occurrences)?;
                let range = normal_range(node, occurrence, language).map_err(|e| e.at(&occurrence.path))?;
                raw["normal_range"] = range;
            }
            _ => {}
        }
    }
    Ok(())
}

fn push(object: &mut RawObject, attribute: &str, value: Value) {
    let slot = object
        .entry(attribute.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Some(items) = slot.as_array_mut() {
        items.push(value);
    }
}

fn single<'a>(
    parent: &InputNode,
    name: &str,
    occurrences: &'a IndexMap<usize, InputNode>,
) -> ConversionResult<&'a InputNode> {
    match occurrences.get(&0) {
        Some(occurrence) if occurrences.len() == 1 => Ok(occurrence),
        _ => Err(ConversionError::Cardinality {
            node: join_segment(&parent.path, name, None),
            found: occurrences.len().max(2),
            min: 0,
            max: Some(1),
        }),
    }
}

/// Rejects attributes and children a meta segment does not take
fn expect_shape(input: &InputNode, keys: &[&str], children: &[&str]) -> ConversionResult<()> {
    if let Some(key) = input.attributes.keys().find(|k| !keys.contains(&k.as_str())) {
        return Err(ConversionError::invalid_attribute(key.as_str(), "not accepted here"));
    }
    if let Some(child) = input.children.keys().find(|c| !children.contains(&c.as_str())) {
        return Err(ConversionError::UnknownPath {
            segment: child.clone(),
            parent: input.path.clone(),
        });
    }
    Ok(())
}

fn required(attrs: &Attributes, key: &str) -> ConversionResult<String> {
    get_string(attrs, key)?.ok_or_else(|| ConversionError::invalid_attribute(key, "required"))
}

fn uid(input: &InputNode) -> ConversionResult<Value> {
    expect_shape(input, &["", "value"], &[])?;
    let value = get_string(&input.attributes, "")?
        .or(get_string(&input.attributes, "value")?)
        .ok_or_else(|| ConversionError::invalid_attribute("_uid", "required"))?;
    let uid = LocatableUid::parse(&value).map_err(|e| ConversionError::invalid_attribute("_uid", e))?;
    Ok(uid.to_rm())
}

fn name_value(input: &InputNode) -> ConversionResult<Value> {
    expect_shape(input, &["", "value", "code", "terminology"], &[])?;
    let text = get_string(&input.attributes, "")?
        .or(get_string(&input.attributes, "value")?)
        .ok_or_else(|| ConversionError::invalid_attribute("_name", "required"))?;
    match get_string(&input.attributes, "code")? {
        Some(code) => Ok(dv_coded_text(&text, &required(&input.attributes, "terminology")?, &code)),
        None => Ok(dv_text(&text)),
    }
}

fn link_value(input: &InputNode) -> ConversionResult<Value> {
    expect_shape(input, &["meaning", "type", "target"], &[])?;
    let target = parse_ehr_uri(&json!(required(&input.attributes, "target")?))?;
    Ok(link(
        &required(&input.attributes, "meaning")?,
        &required(&input.attributes, "type")?,
        &target,
    ))
}

fn work_flow_id(input: &InputNode) -> ConversionResult<Value> {
    expect_shape(input, &["id", "id_scheme", "namespace", "type"], &[])?;
    Ok(object_ref(
        &required(&input.attributes, "id")?,
        &required(&input.attributes, "id_scheme")?,
        &required(&input.attributes, "namespace")?,
        &required(&input.attributes, "type")?,
    ))
}

/// Party attributes with the context's id scheme and namespace filled in
pub(super) fn party_attributes(attrs: &Attributes, context: &ContextBag) -> Attributes {
    let mut attrs = attrs.clone();
    if attrs.contains_key("id") {
        if let (false, Some(scheme)) = (attrs.contains_key("id_scheme"), &context.id_scheme) {
            attrs.insert("id_scheme".to_string(), json!(scheme));
        }
        if let (false, Some(namespace)) = (attrs.contains_key("id_namespace"), &context.id_namespace) {
            attrs.insert("id_namespace".to_string(), json!(namespace));
        }
    }
    attrs
}

fn participation(input: &InputNode, context: &ContextBag) -> ConversionResult<Value> {
    expect_shape(
        input,
        &["function", "mode", "name", "id", "id_scheme", "id_namespace"],
        &[],
    )?;
    let function = required(&input.attributes, "function")?;
    let (mode_code, mode_name) = match get_string(&input.attributes, "mode")? {
        Some(code) => {
            let name = participation_mode_name(&code).ok_or_else(|| ConversionError::UnknownCode {
                code: code.clone(),
                value_set: "openehr participation modes".to_string(),
            })?;
            (code, name)
        }
        None => (
            DEFAULT_PARTICIPATION_MODE.0.to_string(),
            DEFAULT_PARTICIPATION_MODE.1,
        ),
    };

    let mut party = Attributes::new();
    for key in ["name", "id", "id_scheme", "id_namespace"] {
        if let Some(value) = input.attributes.get(key) {
            party.insert(key.to_string(), value.clone());
        }
    }
    let performer = PartyValue::from_attributes(&party_attributes(&party, context))?;

    Ok(json!({
        "_type": "PARTICIPATION",
        "function": dv_text(&function),
        "mode": dv_coded_text(mode_name, OPENEHR, &mode_code),
        "performer": performer.to_rm()
    }))
}

fn end_time(input: &InputNode) -> ConversionResult<Value> {
    expect_shape(input, &["", "value"], &[])?;
    let value = input
        .attributes
        .get("")
        .or_else(|| input.attributes.get("value"))
        .ok_or_else(|| ConversionError::invalid_attribute("_end_time", "required"))?;
    let time = TemporalValue::from_scalar(TemporalKind::DateTime, value)?;
    Ok(dv_date_time(&time.value))
}

fn location(input: &InputNode) -> ConversionResult<Value> {
    expect_shape(input, &["", "value"], &[])?;
    let text = get_string(&input.attributes, "")?
        .or(get_string(&input.attributes, "value")?)
        .ok_or_else(|| ConversionError::invalid_attribute("_location", "required"))?;
    Ok(json!(text))
}

fn facility(input: &InputNode, context: &ContextBag) -> ConversionResult<Value> {
    expect_shape(input, &["name", "id", "id_scheme", "id_namespace"], &[])?;
    match PartyValue::from_attributes(&party_attributes(&input.attributes, context))? {
        PartyValue::Myself => Err(ConversionError::invalid_attribute(
            "name",
            "a health care facility needs a name or an id",
        )),
        party => Ok(party.to_rm()),
    }
}

fn term_mapping(input: &InputNode) -> ConversionResult<Value> {
    expect_shape(input, &["match"], &["target"])?;
    let operator = required(&input.attributes, "match")?;
    if !MAPPING_MATCHES.contains(&operator.as_str()) {
        return Err(ConversionError::invalid_attribute(
            "match",
            format!("'{operator}' is not one of {}", MAPPING_MATCHES.join(" ")),
        ));
    }
    let target = input
        .children
        .get("target")
        .and_then(|occurrences| occurrences.get(&0))
        .ok_or_else(|| ConversionError::invalid_attribute("target", "required"))?;
    expect_shape(target, &["code", "terminology"], &[])?;
    Ok(json!({
        "_type": "TERM_MAPPING",
        "match": operator,
        "target": code_phrase(
            &required(&target.attributes, "terminology")?,
            &required(&target.attributes, "code")?,
        )
    }))
}

fn normal_range(node: &IndexedNode, input: &InputNode, language: &str) -> ConversionResult<Value> {
    expect_shape(
        input,
        &["lower_included", "upper_included", "lower_unbounded", "upper_unbounded"],
        &["lower", "upper"],
    )?;
    let flags = canonicalize(&RmType::DvInterval(Box::new(node.rm_type.clone())), &input.attributes)?;
    let bound = |name: &str| -> ConversionResult<Option<crate::core::value::DataValue>> {
        match input.children.get(name).and_then(|occurrences| occurrences.get(&0)) {
            Some(bound) => to_value(node, &bound.attributes, language)
                .map(Some)
                .map_err(|e| e.at(&bound.path)),
            None => Ok(None),
        }
    };
    let interval = IntervalValue::new(&flags, bound("lower")?, bound("upper")?)?;
    Ok(interval.to_rm())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occurrence(path: &str, pairs: &[(&str, Value)]) -> InputNode {
        let mut node = InputNode::new(path);
        for (key, value) in pairs {
            node.attributes.insert(key.to_string(), value.clone());
        }
        node
    }

    fn with_meta(name: &str, occurrences: Vec<InputNode>) -> InputNode {
        let mut input = InputNode::new("encounter/vitals:0");
        input
            .children
            .insert(name.to_string(), occurrences.into_iter().enumerate().collect());
        input
    }

    fn entry() -> RawObject {
        json!({"_type": "OBSERVATION", "archetype_node_id": "openEHR-EHR-OBSERVATION.x.v1"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_links_accumulate() {
        let input = with_meta(
            "_link",
            vec![
                occurrence("l0", &[("meaning", json!("m")), ("type", json!("t")), ("target", json!("ehr://a/b"))]),
                occurrence("l1", &[("meaning", json!("n")), ("type", json!("t")), ("target", json!("ehr://a/c"))]),
            ],
        );
        let mut object = entry();
        apply_object_meta(&mut object, &input, &ContextBag::new()).unwrap();
        assert_eq!(object["links"].as_array().unwrap().len(), 2);
        assert_eq!(object["links"][1]["target"]["value"], "ehr://a/c");
    }

    #[test]
    fn test_link_requires_all_fields() {
        let input = with_meta("_link", vec![occurrence("l0", &[("meaning", json!("m"))])]);
        let err = apply_object_meta(&mut entry(), &input, &ContextBag::new()).unwrap_err();
        assert!(matches!(err.root_cause(), ConversionError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_versioned_uid() {
        let input = with_meta(
            "_uid",
            vec![occurrence("u", &[("", json!("9f2b1c4e-8d9a-4a3b-9c1e-2f3a4b5c6d7e::local::1"))])],
        );
        let mut object = entry();
        apply_object_meta(&mut object, &input, &ContextBag::new()).unwrap();
        assert_eq!(object["uid"]["_type"], "OBJECT_VERSION_ID");
    }

    #[test]
    fn test_context_meta_rejected_on_entry() {
        let input = with_meta("_end_time", vec![occurrence("e", &[("", json!("2024-01-01T10:00:00Z"))])]);
        let err = apply_object_meta(&mut entry(), &input, &ContextBag::new()).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_participation_takes_scheme_from_context() {
        let input = with_meta(
            "_other_participation",
            vec![occurrence("p", &[("function", json!("requester")), ("id", json!("42"))])],
        );
        let context = ContextBag {
            id_scheme: Some("HOSPITAL".to_string()),
            id_namespace: Some("HOSPITAL-NS".to_string()),
            ..Default::default()
        };
        let mut object = entry();
        apply_object_meta(&mut object, &input, &context).unwrap();
        let participation = &object["other_participations"][0];
        assert_eq!(participation["mode"]["defining_code"]["code_string"], "193");
        assert_eq!(participation["performer"]["external_ref"]["namespace"], "HOSPITAL-NS");
    }
}
