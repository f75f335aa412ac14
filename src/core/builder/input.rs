//! Input trie
//!
//! Flat entries are grouped into a tree of occurrences before the schema walk,
//! so every node sees all of its input at once. `ctx/...` entries are split off
//! and read into a [`ContextBag`].

use crate::core::path::{join_segment, parse_flat_path, Segment, CONTEXT_ROOT};
use crate::core::value::{parse_boolean, scalar_string, Attributes};
use crate::domain::{ContextBag, ConversionError, ConversionResult, LinkSpec};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;

/// Input addressed at one node occurrence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputNode {
    /// Rendered path of the occurrence
    pub path: String,
    /// Attributes of the occurrence (`""` = bare value)
    pub attributes: Attributes,
    /// Child occurrences by segment, in the order the input first names them
    pub children: IndexMap<String, IndexMap<usize, InputNode>>,
    /// Position of the first flat entry that addresses the occurrence
    pub order: usize,
}

impl InputNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Whether the occurrence carries neither attributes nor children
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty()
    }

    /// Children that address schema nodes rather than meta attributes
    pub fn data_children(&self) -> impl Iterator<Item = (&String, &IndexMap<usize, InputNode>)> {
        self.children.iter().filter(|(name, _)| !name.starts_with('_'))
    }

    /// Children named by a meta segment (`_link`, `_uid`, ...)
    pub fn meta_children(&self) -> impl Iterator<Item = (&String, &IndexMap<usize, InputNode>)> {
        self.children.iter().filter(|(name, _)| name.starts_with('_'))
    }

    fn insert(&mut self, segments: &[Segment], value: Value, order: usize) -> ConversionResult<()> {
        let Some((segment, rest)) = segments.split_first() else {
            return Ok(());
        };
        let path = join_segment(&self.path, &segment.name, segment.index);
        let child = self
            .children
            .entry(segment.name.clone())
            .or_default()
            .entry(segment.occurrence())
            .or_insert_with(|| InputNode {
                order,
                ..InputNode::new(path)
            });

        if rest.is_empty() {
            let key = segment.attribute.clone().unwrap_or_default();
            child.set_attribute(key, value)
        } else {
            child.insert(rest, value, order)
        }
    }

    fn set_attribute(&mut self, key: String, value: Value) -> ConversionResult<()> {
        match self.attributes.get(&key) {
            Some(existing) if *existing != value => Err(ConversionError::malformed_path(
                self.path.clone(),
                format!("attribute '{key}' supplied twice with different values"),
            )),
            Some(_) => Ok(()),
            None => {
                self.attributes.insert(key, value);
                Ok(())
            }
        }
    }
}

/// Flat input split into the record tree and the context it carries
#[derive(Debug, Clone, Default)]
pub struct ParsedInput {
    pub root: InputNode,
    pub context: ContextBag,
}

/// Groups flat entries into an occurrence trie below the composition root
///
/// `is_root` decides whether the first segment of a record path names the
/// template root. Values must be JSON scalars (or `null`).
pub fn parse_input(
    flat: &IndexMap<String, Value>,
    is_root: impl Fn(&str) -> bool,
) -> ConversionResult<ParsedInput> {
    let mut parsed = ParsedInput::default();
    let mut root_segment: Option<String> = None;
    let mut links: BTreeMap<usize, LinkSpec> = BTreeMap::new();

    for (order, (path, value)) in flat.iter().enumerate() {
        if value.is_array() || value.is_object() {
            return Err(ConversionError::malformed_path(
                path.clone(),
                "flat values must be scalars",
            ));
        }
        let segments = parse_flat_path(path)?;
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| ConversionError::malformed_path(path.clone(), "empty path"))?;

        if first.name == CONTEXT_ROOT {
            apply_context_entry(&mut parsed.context, &mut links, rest, value, path)?;
            continue;
        }

        if !is_root(&first.name) {
            return Err(ConversionError::UnknownPath {
                segment: first.name.clone(),
                parent: String::new(),
            });
        }
        match &root_segment {
            Some(name) if *name != first.name => {
                return Err(ConversionError::malformed_path(
                    path.clone(),
                    format!("root addressed both as '{name}' and '{}'", first.name),
                ))
            }
            Some(_) => {}
            None => {
                parsed.root.path = first.name.clone();
                root_segment = Some(first.name.clone());
            }
        }
        if first.occurrence() != 0 {
            return Err(ConversionError::Cardinality {
                node: first.name.clone(),
                found: first.occurrence().saturating_add(1),
                min: 1,
                max: Some(1),
            });
        }

        if rest.is_empty() {
            let key = first.attribute.clone().unwrap_or_default();
            parsed.root.set_attribute(key, value.clone())?;
        } else {
            parsed.root.insert(rest, value.clone(), order)?;
        }
    }

    if !links.is_empty() {
        parsed.context.link = links.into_values().collect();
    }
    Ok(parsed)
}

/// Reads one `ctx/...` entry into the bag
///
/// Links are collected by index and compacted into the bag once every entry
/// has been read.
fn apply_context_entry(
    bag: &mut ContextBag,
    links: &mut BTreeMap<usize, LinkSpec>,
    segments: &[Segment],
    value: &Value,
    path: &str,
) -> ConversionResult<()> {
    let unknown = || ConversionError::malformed_path(path, "unknown context key");
    let text = || -> ConversionResult<Option<String>> {
        match value {
            Value::Null => Ok(None),
            other => scalar_string(path, other).map(Some),
        }
    };

    let names: Vec<&str> = segments.iter().map(|s| s.name.as_str()).collect();
    let attribute = segments.last().and_then(|s| s.attribute.as_deref());
    let Some(first) = segments.first() else {
        return Err(unknown());
    };
    if first.name != "link" && segments.iter().any(|s| s.occurrence() != 0) {
        return Err(ConversionError::malformed_path(
            path,
            "context keys other than 'link' take no occurrence index",
        ));
    }

    match (names.as_slice(), attribute) {
        (["language"], None | Some("code")) => bag.language = text()?,
        (["territory"], None | Some("code")) => bag.territory = text()?,
        (["composer_name"], None) => bag.composer_name = text()?,
        (["composer_id"], None) => bag.composer_id = text()?,
        (["composer_self"], None) => bag.composer_self = Some(parse_boolean(path, value)?),
        (["id_scheme"], None) => bag.id_scheme = text()?,
        (["id_namespace"], None) => bag.id_namespace = text()?,
        (["start_time" | "time"], None) => bag.start_time = text()?,
        (["end_time"], None) => bag.end_time = text()?,
        (["location"], None) => bag.location = text()?,
        (["setting"], None | Some("code")) => bag.setting = text()?,
        (["encoding"], None | Some("code")) => bag.encoding = text()?,
        (["encoding"], Some("terminology")) => bag.encoding_terminology = text()?,
        (["health_care_facility"], Some(field @ ("name" | "id"))) => {
            let facility = bag.health_care_facility.get_or_insert_with(Default::default);
            match field {
                "name" => facility.name = text()?,
                _ => facility.id = text()?,
            }
        }
        (["link"], Some(field @ ("meaning" | "type" | "target"))) => {
            let link = links.entry(first.occurrence()).or_default();
            match field {
                "meaning" => link.meaning = text()?,
                "type" => link.link_type = text()?,
                _ => link.target = text()?,
            }
        }
        (["work_flow_id"], Some(field @ ("id" | "id_scheme" | "namespace" | "type"))) => {
            let reference = bag.work_flow_id.get_or_insert_with(Default::default);
            match field {
                "id" => reference.id = text()?,
                "id_scheme" => reference.id_scheme = text()?,
                "namespace" => reference.namespace = text()?,
                _ => reference.ref_type = text()?,
            }
        }
        (["ism_transition", part], None | Some("code")) => {
            let ism = bag.ism_transition.get_or_insert_with(Default::default);
            match *part {
                "current_state" => ism.current_state = text()?,
                "careflow_step" => ism.careflow_step = text()?,
                "transition" => ism.transition = text()?,
                _ => return Err(unknown()),
            }
        }
        _ => return Err(unknown()),
    }
    Ok(())
}
