//! Composition flattener
//!
//! Walks a raw composition in schema order and emits one flat entry per
//! attribute of every populated leaf. Occurrence indices are written for
//! nodes that may repeat; single nodes get none, so the output feeds straight
//! back into the builder.
//!
//! Besides data values the flattener surfaces the meta attributes the
//! builder understands: overridden names, uids, links, work flow ids, other
//! participations, term mappings, normal ranges and the event context extras.

use crate::core::path::{join_segment, with_attribute};
use crate::core::schema::{choose_alternative, occurrences, IndexedNode, NodeKind, NodeRef, SchemaIndex};
use crate::core::value::rm::{name_of, read_code_phrase, read_object_ref, type_of, RawObject};
use crate::core::value::{from_value, Attributes, CodedTextValue, DataValue, IntervalValue, PartyValue};
use crate::domain::{ConversionError, ConversionResult, RmType};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;

/// Flat output, in emission order
pub type FlatDocument = IndexMap<String, Value>;

/// Flattens raw compositions of one schema
pub struct CompositionFlattener<'a> {
    index: &'a SchemaIndex,
    language: &'a str,
}

impl<'a> CompositionFlattener<'a> {
    /// `language` picks the display names the flattener treats as known
    pub fn new(index: &'a SchemaIndex, language: &'a str) -> Self {
        Self { index, language }
    }

    /// Flattens a raw COMPOSITION
    ///
    /// Fails with [`ConversionError::MalformedTree`] when `raw` is not a
    /// COMPOSITION, and with a [`ConversionError::Build`] naming the flat
    /// path of the first value that cannot be read.
    pub fn flatten(&self, raw: &Value) -> ConversionResult<FlatDocument> {
        if type_of(raw) != Some("COMPOSITION") {
            return Err(ConversionError::MalformedTree {
                path: String::new(),
                reason: format!(
                    "expected a COMPOSITION, got {}",
                    type_of(raw).unwrap_or("an untyped value")
                ),
            });
        }

        let root = self.index.node(self.index.root());
        let mut out = FlatDocument::new();
        self.object_meta(root, raw, &root.id, &mut out)?;
        self.children(self.index.root(), raw, &root.id, &mut out)?;

        if type_of(&raw["composer"]) == Some("PARTY_SELF") {
            out.insert("ctx/composer_self".to_string(), json!(true));
        }

        debug!(
            template_id = %self.index.template_id(),
            entries = out.len(),
            "Composition flattened"
        );
        Ok(out)
    }

    fn children(&self, parent: NodeRef, raw: &Value, path: &str, out: &mut FlatDocument) -> ConversionResult<()> {
        for &child in &self.index.node(parent).children {
            let node = self.index.node(child);
            for (position, occurrence) in occurrences(self.index, child, raw).into_iter().enumerate() {
                let index = (!node.is_single()).then_some(position);
                let occurrence_path = join_segment(path, &node.id, index);
                self.occurrence(child, occurrence.holder, occurrence.value, &occurrence_path, out)
                    .map_err(|e| e.at(&occurrence_path))?;
            }
        }
        Ok(())
    }

    fn occurrence(
        &self,
        child: NodeRef,
        holder: &Value,
        value: Option<&Value>,
        path: &str,
        out: &mut FlatDocument,
    ) -> ConversionResult<()> {
        let node = self.index.node(child);
        match node.kind {
            NodeKind::Structural => {
                let Some(object) = value else {
                    return Ok(());
                };
                self.object_meta(node, object, path, out)?;
                self.children(child, object, path, out)
            }
            NodeKind::Choice => {
                let Some(element) = value else {
                    return Ok(());
                };
                self.object_meta(node, element, path, out)?;
                let Some(data) = element.get("value").filter(|v| !v.is_null()) else {
                    return Ok(());
                };
                let alternative = choose_alternative(self.index, child, data).ok_or_else(|| {
                    ConversionError::invalid_attribute(
                        "_type",
                        format!("{} is not an alternative of this element", type_of(data).unwrap_or("untyped value")),
                    )
                })?;
                let alternative_node = self.index.node(alternative);
                let alternative_path = join_segment(path, &alternative_node.id, None);
                self.data_value(alternative, data, &alternative_path, out)
                    .map_err(|e| e.at(&alternative_path))
            }
            NodeKind::Leaf | NodeKind::Interval => {
                if node.has_wrapper() {
                    self.object_meta(node, holder, path, out)?;
                }
                match value.filter(|v| !v.is_null()) {
                    Some(data) => self.data_value(child, data, path, out),
                    None => Ok(()),
                }
            }
            NodeKind::Ism => match value {
                Some(ism) => self.ism(ism, path, out),
                None => Ok(()),
            },
        }
    }

    /// Attributes of one data value plus its mappings and normal range
    fn data_value(&self, child: NodeRef, raw: &Value, path: &str, out: &mut FlatDocument) -> ConversionResult<()> {
        let node = self.index.node(child);
        let value = DataValue::from_rm(&node.rm_type, raw)?;

        if let DataValue::Interval(interval) = &value {
            self.interval(child, interval, path, out)?;
        } else {
            emit(out, path, from_value(node, &value)?);
        }

        if let Some(mappings) = raw.get("mappings").and_then(Value::as_array) {
            for (position, mapping) in mappings.iter().enumerate() {
                let mapping_path = join_segment(path, "_mapping", Some(position));
                if let Some(operator) = mapping.get("match").and_then(Value::as_str) {
                    out.insert(with_attribute(&mapping_path, Some("match")), json!(operator));
                }
                if let Some(target) = mapping.get("target") {
                    let (terminology, code) = read_code_phrase(target)?;
                    let target_path = join_segment(&mapping_path, "target", None);
                    out.insert(with_attribute(&target_path, Some("code")), json!(code));
                    out.insert(with_attribute(&target_path, Some("terminology")), json!(terminology));
                }
            }
        }

        if let Some(range) = raw.get("normal_range").filter(|r| !r.is_null()) {
            let range = IntervalValue::from_rm(&node.rm_type, range)?;
            let range_path = join_segment(path, "_normal_range", None);
            emit(out, &range_path, range.attributes());
            for (bound, value) in [("lower", &range.lower), ("upper", &range.upper)] {
                if let Some(value) = value {
                    emit(out, &join_segment(&range_path, bound, None), from_value(node, value)?);
                }
            }
        }
        Ok(())
    }

    fn interval(
        &self,
        child: NodeRef,
        interval: &IntervalValue,
        path: &str,
        out: &mut FlatDocument,
    ) -> ConversionResult<()> {
        emit(out, path, interval.attributes());
        let node = self.index.node(child);
        for (bound, value) in [("lower", &interval.lower), ("upper", &interval.upper)] {
            let Some(value) = value else { continue };
            let bound_node = node
                .children
                .iter()
                .map(|&c| self.index.node(c))
                .find(|n| n.id == bound)
                .unwrap_or(node);
            emit(out, &join_segment(path, bound, None), from_value(bound_node, value)?);
        }
        Ok(())
    }

    fn ism(&self, raw: &Value, path: &str, out: &mut FlatDocument) -> ConversionResult<()> {
        for part in ["current_state", "transition", "careflow_step"] {
            let Some(coded) = raw.get(part).filter(|v| !v.is_null()) else {
                continue;
            };
            let coded = CodedTextValue::from_rm(coded)?;
            let part_path = join_segment(path, part, None);
            out.insert(with_attribute(&part_path, Some("code")), json!(coded.code));
            out.insert(with_attribute(&part_path, Some("value")), json!(coded.value));
        }
        Ok(())
    }

    /// Meta segments of a raw object, by RM type
    fn object_meta(&self, node: &IndexedNode, raw: &Value, path: &str, out: &mut FlatDocument) -> ConversionResult<()> {
        let Some(object) = raw.as_object() else {
            return Ok(());
        };
        let rm_type = type_of(raw).and_then(|name| name.parse::<RmType>().ok());

        if rm_type.as_ref().is_some_and(RmType::is_locatable) {
            self.name_meta(node, raw, path, out)?;
            if let Some(uid) = object.get("uid").and_then(|uid| uid.get("value")) {
                out.insert(join_segment(path, "_uid", None), uid.clone());
            }
            for (position, link) in list(object, "links").enumerate() {
                let link_path = join_segment(path, "_link", Some(position));
                for (attribute, value) in [
                    ("meaning", link.pointer("/meaning/value")),
                    ("type", link.pointer("/type/value")),
                    ("target", link.pointer("/target/value")),
                ] {
                    if let Some(value) = value {
                        out.insert(with_attribute(&link_path, Some(attribute)), value.clone());
                    }
                }
            }
        }

        if rm_type.as_ref().is_some_and(RmType::is_entry) {
            if let Some(reference) = object.get("work_flow_id").filter(|v| !v.is_null()) {
                let (id, scheme, namespace, ref_type) = read_object_ref(reference)?;
                let base = join_segment(path, "_work_flow_id", None);
                out.insert(with_attribute(&base, Some("id")), json!(id));
                if let Some(scheme) = scheme {
                    out.insert(with_attribute(&base, Some("id_scheme")), json!(scheme));
                }
                out.insert(with_attribute(&base, Some("namespace")), json!(namespace));
                out.insert(with_attribute(&base, Some("type")), json!(ref_type));
            }
            for (position, participation) in list(object, "other_participations").enumerate() {
                let base = join_segment(path, "_other_participation", Some(position));
                if let Some(function) = participation.pointer("/function/value") {
                    out.insert(with_attribute(&base, Some("function")), function.clone());
                }
                if let Some(mode) = participation.pointer("/mode/defining_code/code_string") {
                    out.insert(with_attribute(&base, Some("mode")), mode.clone());
                }
                if let Some(performer) = participation.get("performer") {
                    emit(out, &base, PartyValue::from_rm(performer)?.attributes());
                }
            }
        }

        if rm_type == Some(RmType::EventContext) {
            if let Some(end_time) = object.get("end_time").and_then(|t| t.get("value")) {
                out.insert(join_segment(path, "_end_time", None), end_time.clone());
            }
            if let Some(location) = object.get("location").filter(|v| !v.is_null()) {
                out.insert(join_segment(path, "_location", None), location.clone());
            }
            if let Some(facility) = object.get("health_care_facility").filter(|v| !v.is_null()) {
                let base = join_segment(path, "_health_care_facility", None);
                emit(out, &base, PartyValue::from_rm(facility)?.attributes());
            }
        }
        Ok(())
    }

    /// `_name` when the raw name is not one the schema knows for the node
    fn name_meta(&self, node: &IndexedNode, raw: &Value, path: &str, out: &mut FlatDocument) -> ConversionResult<()> {
        let (Some(name), Some(text)) = (raw.get("name").filter(|n| !n.is_null()), name_of(raw)) else {
            return Ok(());
        };
        if text == node.instance_name(self.language) || node.is_known_name(text) {
            return Ok(());
        }

        let base = join_segment(path, "_name", None);
        if type_of(name) == Some("DV_CODED_TEXT") {
            let coded = CodedTextValue::from_rm(name)?;
            out.insert(with_attribute(&base, Some("value")), json!(coded.value));
            out.insert(with_attribute(&base, Some("code")), json!(coded.code));
            out.insert(with_attribute(&base, Some("terminology")), json!(coded.terminology));
        } else {
            out.insert(base, json!(text));
        }
        Ok(())
    }
}

fn list<'r>(object: &'r RawObject, attribute: &str) -> impl Iterator<Item = &'r Value> {
    object
        .get(attribute)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn emit(out: &mut FlatDocument, path: &str, attrs: Attributes) {
    for (attribute, value) in attrs {
        out.insert(with_attribute(path, Some(&attribute)), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WebTemplate;

    fn index() -> SchemaIndex {
        let template: WebTemplate = serde_json::from_value(json!({
            "templateId": "Flatten.v1",
            "defaultLanguage": "en",
            "tree": {
                "id": "visit", "name": "Visit", "rmType": "COMPOSITION", "min": 1,
                "nodeId": "openEHR-EHR-COMPOSITION.visit.v1", "aqlPath": "/",
                "children": [{
                    "id": "pulse", "name": "Pulse", "rmType": "OBSERVATION", "max": -1,
                    "nodeId": "openEHR-EHR-OBSERVATION.pulse.v1",
                    "aqlPath": "/content[openEHR-EHR-OBSERVATION.pulse.v1]",
                    "children": [{
                        "id": "any_event", "name": "Any event", "rmType": "EVENT", "max": -1,
                        "nodeId": "at0002",
                        "aqlPath": "/content[openEHR-EHR-OBSERVATION.pulse.v1]/data[at0001]/events[at0002]",
                        "children": [{
                            "id": "rate", "name": "Rate", "rmType": "DV_COUNT", "nodeId": "at0004",
                            "aqlPath": "/content[openEHR-EHR-OBSERVATION.pulse.v1]/data[at0001]/events[at0002]/data[at0003]/items[at0004]/value"
                        }]
                    }]
                }]
            }
        }))
        .unwrap();
        SchemaIndex::build(&template).unwrap()
    }

    fn raw() -> Value {
        json!({
            "_type": "COMPOSITION",
            "name": {"_type": "DV_TEXT", "value": "Visit"},
            "archetype_node_id": "openEHR-EHR-COMPOSITION.visit.v1",
            "language": {"_type": "CODE_PHRASE", "terminology_id": {"_type": "TERMINOLOGY_ID", "value": "ISO_639-1"}, "code_string": "en"},
            "composer": {"_type": "PARTY_SELF"},
            "content": [{
                "_type": "OBSERVATION",
                "name": {"_type": "DV_TEXT", "value": "Pulse"},
                "archetype_node_id": "openEHR-EHR-OBSERVATION.pulse.v1",
                "links": [{
                    "_type": "LINK",
                    "meaning": {"_type": "DV_TEXT", "value": "follows"},
                    "type": {"_type": "DV_TEXT", "value": "issue"},
                    "target": {"_type": "DV_EHR_URI", "value": "ehr://a/b"}
                }],
                "data": {
                    "_type": "HISTORY", "archetype_node_id": "at0001",
                    "events": [{
                        "_type": "POINT_EVENT", "archetype_node_id": "at0002",
                        "name": {"_type": "DV_TEXT", "value": "Any event"},
                        "data": {
                            "_type": "ITEM_TREE", "archetype_node_id": "at0003",
                            "items": [{
                                "_type": "ELEMENT", "archetype_node_id": "at0004",
                                "name": {"_type": "DV_TEXT", "value": "Resting rate"},
                                "value": {"_type": "DV_COUNT", "magnitude": 9007199254740993_u64}
                            }]
                        }
                    }, {
                        "_type": "POINT_EVENT", "archetype_node_id": "at0002",
                        "name": {"_type": "DV_TEXT", "value": "Any event"}
                    }]
                }
            }]
        })
    }

    #[test]
    fn test_flatten_emits_indices_for_repeating_nodes() {
        let index = index();
        let flat = CompositionFlattener::new(&index, "en").flatten(&raw()).unwrap();
        assert_eq!(flat["visit/language|code"], "en");
        assert_eq!(flat["visit/pulse:0/any_event:0/rate"], json!(9007199254740993_u64));
        assert_eq!(flat["visit/pulse:0/any_event:0/rate/_name"], "Resting rate");
        assert_eq!(flat["visit/pulse:0/_link:0|target"], "ehr://a/b");
        assert_eq!(flat["ctx/composer_self"], true);
        assert!(!flat.contains_key("visit/pulse:0/_name"));
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let index = index();
        let flattener = CompositionFlattener::new(&index, "en");
        let first: Vec<String> = flattener.flatten(&raw()).unwrap().into_keys().collect();
        let second: Vec<String> = flattener.flatten(&raw()).unwrap().into_keys().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_composition_root() {
        let index = index();
        let err = CompositionFlattener::new(&index, "en")
            .flatten(&json!({"_type": "OBSERVATION"}))
            .unwrap_err();
        assert!(matches!(err, ConversionError::MalformedTree { .. }));
    }

    #[test]
    fn test_wrong_value_type_names_the_path() {
        let index = index();
        let mut raw = raw();
        raw["content"][0]["data"]["events"][0]["data"]["items"][0]["value"] =
            json!({"_type": "DV_QUANTITY", "magnitude": 1.0, "units": "mm"});
        let err = CompositionFlattener::new(&index, "en").flatten(&raw).unwrap_err();
        assert_eq!(err.path(), Some("visit/pulse:0/any_event:0/rate"));
    }
}
