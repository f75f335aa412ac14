//! RM defaults merged into the raw tree after the walk
//!
//! Every default is insert-if-absent, so anything the walk produced from
//! explicit input (including meta segments) wins over the context bag.

use crate::core::convert::ConversionOptions;
use crate::core::schema::openehr::{
    setting_name, ANY_ACTION_ARCHETYPE, CATEGORY_EVENT, CATEGORY_PERSISTENT, DEFAULT_ENCODING,
    DEFAULT_SETTING, ENCODING_TERMINOLOGY, LANGUAGE_TERMINOLOGY, OPENEHR, TERRITORY_TERMINOLOGY,
};
use crate::core::schema::{IndexedNode, IsmRequest, TransitionTable};
use crate::core::value::rm::{code_phrase, dv_coded_text, dv_date_time, dv_text, link, object_ref, party_self, RawObject};
use crate::core::value::{parse_ehr_uri, Attributes, PartyValue, TemporalKind, TemporalValue};
use crate::domain::{ContextBag, ConversionError, ConversionResult, LinkSpec, ObjectVersionId, RmType};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use super::meta::party_attributes;

/// Composition and entry level defaults for one build
pub(super) struct RmDefaults<'a> {
    context: &'a ContextBag,
    language: &'a str,
    root: &'a IndexedNode,
    options: &'a ConversionOptions,
    start_time: String,
}

impl<'a> RmDefaults<'a> {
    /// Resolves the start time once so every event of the build shares it
    pub(super) fn new(
        context: &'a ContextBag,
        language: &'a str,
        root: &'a IndexedNode,
        options: &'a ConversionOptions,
    ) -> ConversionResult<Self> {
        let start_time = match &context.start_time {
            Some(time) => {
                TemporalValue::parse(TemporalKind::DateTime, time)
                    .map_err(|e| e.at("ctx/start_time"))?
                    .value
            }
            None => Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        Ok(Self {
            context,
            language,
            root,
            options,
            start_time,
        })
    }

    pub(super) fn apply(&self, composition: &mut RawObject) -> ConversionResult<()> {
        self.composition(composition)?;
        for (attribute, value) in composition.iter_mut() {
            if attribute != "context" {
                self.nested(value)?;
            }
        }
        Ok(())
    }

    fn composition(&self, composition: &mut RawObject) -> ConversionResult<()> {
        let root = &self.root.id;

        insert_absent(composition, "language", || {
            code_phrase(LANGUAGE_TERMINOLOGY, self.language)
        });

        if !composition.contains_key("territory") {
            let territory = self.context.territory.as_deref().ok_or_else(|| {
                ConversionError::Cardinality {
                    node: format!("{root}/territory"),
                    found: 0,
                    min: 1,
                    max: Some(1),
                }
            })?;
            composition.insert(
                "territory".to_string(),
                code_phrase(TERRITORY_TERMINOLOGY, territory),
            );
        }

        insert_absent(composition, "category", || {
            let (code, name) = if self.root.has_annotation("persistent") {
                CATEGORY_PERSISTENT
            } else {
                CATEGORY_EVENT
            };
            dv_coded_text(name, OPENEHR, code)
        });

        if !composition.contains_key("composer") {
            let composer = self.composer().map_err(|e| e.at(format!("{root}/composer")))?;
            composition.insert("composer".to_string(), composer);
        }

        let is_event = composition
            .get("category")
            .and_then(|category| category.pointer("/defining_code/code_string"))
            .and_then(Value::as_str)
            == Some(CATEGORY_EVENT.0);
        if is_event {
            let context = composition
                .entry("context".to_string())
                .or_insert_with(|| json!({"_type": "EVENT_CONTEXT"}));
            if let Some(context) = context.as_object_mut() {
                self.event_context(context)
                    .map_err(|e| e.at(format!("{root}/context")))?;
            }
        }

        if !composition.contains_key("links") && !self.context.link.is_empty() {
            let links = self
                .context
                .link
                .iter()
                .enumerate()
                .map(|(position, spec)| {
                    context_link(spec).map_err(|e| e.at(format!("ctx/link:{position}")))
                })
                .collect::<ConversionResult<Vec<_>>>()?;
            composition.insert("links".to_string(), Value::Array(links));
        }

        if self.options.generate_uid && !composition.contains_key("uid") {
            let uid = ObjectVersionId::generate(&self.options.system_id);
            composition.insert(
                "uid".to_string(),
                json!({"_type": "OBJECT_VERSION_ID", "value": uid.as_str()}),
            );
        }
        Ok(())
    }

    /// PARTY_SELF when flagged, otherwise a party identified from the bag
    fn composer(&self) -> ConversionResult<Value> {
        if self.context.composer_self == Some(true) || self.root.has_annotation("self_composer") {
            return Ok(party_self());
        }
        let mut attrs = Attributes::new();
        if let Some(name) = &self.context.composer_name {
            attrs.insert("name".to_string(), json!(name));
        }
        if let Some(id) = &self.context.composer_id {
            attrs.insert("id".to_string(), json!(id));
        }
        match PartyValue::from_attributes(&party_attributes(&attrs, self.context))? {
            PartyValue::Myself => Err(ConversionError::Cardinality {
                node: format!("{}/composer", self.root.id),
                found: 0,
                min: 1,
                max: Some(1),
            }),
            party => Ok(party.to_rm()),
        }
    }

    fn event_context(&self, context: &mut RawObject) -> ConversionResult<()> {
        insert_absent(context, "start_time", || dv_date_time(&self.start_time));

        if !context.contains_key("setting") {
            let setting = match &self.context.setting {
                Some(code) => {
                    let name = setting_name(code).ok_or_else(|| ConversionError::UnknownCode {
                        code: code.clone(),
                        value_set: "openehr settings".to_string(),
                    })?;
                    dv_coded_text(name, OPENEHR, code)
                }
                None => dv_coded_text(DEFAULT_SETTING.1, OPENEHR, DEFAULT_SETTING.0),
            };
            context.insert("setting".to_string(), setting);
        }

        if let (false, Some(end_time)) = (context.contains_key("end_time"), &self.context.end_time) {
            let end_time = TemporalValue::parse(TemporalKind::DateTime, end_time)?;
            context.insert("end_time".to_string(), dv_date_time(&end_time.value));
        }
        if let (false, Some(location)) = (context.contains_key("location"), &self.context.location) {
            context.insert("location".to_string(), json!(location));
        }
        if let (false, Some(facility)) = (
            context.contains_key("health_care_facility"),
            &self.context.health_care_facility,
        ) {
            let mut attrs = Attributes::new();
            if let Some(name) = &facility.name {
                attrs.insert("name".to_string(), json!(name));
            }
            if let Some(id) = &facility.id {
                attrs.insert("id".to_string(), json!(id));
            }
            match PartyValue::from_attributes(&party_attributes(&attrs, self.context))? {
                PartyValue::Myself => {}
                party => {
                    context.insert("health_care_facility".to_string(), party.to_rm());
                }
            }
        }
        Ok(())
    }

    fn nested(&self, value: &mut Value) -> ConversionResult<()> {
        match value {
            Value::Array(items) => items.iter_mut().try_for_each(|item| self.nested(item)),
            Value::Object(object) => {
                let rm_type = object
                    .get("_type")
                    .and_then(Value::as_str)
                    .and_then(|name| name.parse::<RmType>().ok());
                if let Some(rm_type) = rm_type {
                    self.object(&rm_type, object)?;
                }
                object.values_mut().try_for_each(|child| match child {
                    Value::Array(_) | Value::Object(_) => self.nested(child),
                    _ => Ok(()),
                })
            }
            _ => Ok(()),
        }
    }

    fn object(&self, rm_type: &RmType, object: &mut RawObject) -> ConversionResult<()> {
        if rm_type.is_entry() {
            insert_absent(object, "language", || {
                code_phrase(LANGUAGE_TERMINOLOGY, self.language)
            });
            insert_absent(object, "encoding", || {
                code_phrase(
                    self.context
                        .encoding_terminology
                        .as_deref()
                        .unwrap_or(ENCODING_TERMINOLOGY),
                    self.context.encoding.as_deref().unwrap_or(DEFAULT_ENCODING),
                )
            });
            insert_absent(object, "subject", party_self);
            if let (false, Some(spec)) = (object.contains_key("work_flow_id"), &self.context.work_flow_id) {
                let field = |value: &Option<String>, name: &str| {
                    value.clone().ok_or_else(|| {
                        ConversionError::invalid_attribute(name, "required").at("ctx/work_flow_id")
                    })
                };
                let reference = object_ref(
                    &field(&spec.id, "id")?,
                    &field(&spec.id_scheme, "id_scheme")?,
                    &field(&spec.namespace, "namespace")?,
                    &field(&spec.ref_type, "type")?,
                );
                object.insert("work_flow_id".to_string(), reference);
            }
        }

        match rm_type {
            RmType::Action => {
                insert_absent(object, "time", || dv_date_time(&self.start_time));
                if let (false, Some(ism)) = (object.contains_key("ism_transition"), &self.context.ism_transition) {
                    let request = IsmRequest {
                        careflow_step: ism.careflow_step.clone(),
                        current_state: ism.current_state.clone(),
                        transition: ism.transition.clone(),
                        ..Default::default()
                    };
                    let resolution = TransitionTable::default()
                        .resolve("ctx/ism_transition", &request)
                        .map_err(|e| e.at("ctx/ism_transition"))?;
                    object.insert("ism_transition".to_string(), resolution.to_rm());
                }
            }
            RmType::Instruction => {
                let narrative = object
                    .get("name")
                    .and_then(|name| name.get("value"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                insert_absent(object, "narrative", || dv_text(&narrative));
            }
            RmType::Activity => {
                insert_absent(object, "action_archetype_id", || json!(ANY_ACTION_ARCHETYPE));
            }
            RmType::Event | RmType::PointEvent => {
                insert_absent(object, "time", || dv_date_time(&self.start_time));
            }
            RmType::IntervalEvent => {
                insert_absent(object, "time", || dv_date_time(&self.start_time));
                insert_absent(object, "width", || json!({"_type": "DV_DURATION", "value": "PT0S"}));
                insert_absent(object, "math_function", || dv_coded_text("actual", OPENEHR, "146"));
            }
            RmType::History => {
                insert_absent(object, "origin", || dv_date_time(&self.start_time));
            }
            _ => {}
        }
        Ok(())
    }
}

fn context_link(spec: &LinkSpec) -> ConversionResult<Value> {
    let field = |value: &Option<String>, name: &str| {
        value
            .clone()
            .ok_or_else(|| ConversionError::invalid_attribute(name, "required"))
    };
    let target = parse_ehr_uri(&json!(field(&spec.target, "target")?))?;
    Ok(link(
        &field(&spec.meaning, "meaning")?,
        &field(&spec.link_type, "type")?,
        &target,
    ))
}

fn insert_absent(object: &mut RawObject, attribute: &str, value: impl FnOnce() -> Value) {
    if !object.contains_key(attribute) {
        object.insert(attribute.to_string(), value());
    }
}
