//! Composition builder
//!
//! Turns a flat or structured document into a raw RM composition. The input
//! is first grouped into an occurrence trie ([`InputNode`]); the builder then
//! walks the schema index depth first, coercing leaves through the value
//! layer and placing every occurrence below its parent's raw object along the
//! node's placement steps. Composition level defaults from the context bag
//! are merged in once the walk is done.
//!
//! The first fatal problem aborts the build with a [`ConversionError::Build`]
//! naming the occurrence path it happened at.

mod defaults;
mod input;
mod meta;

pub use input::{parse_input, InputNode, ParsedInput};

use crate::core::convert::{ConversionOptions, FixedValuePolicy};
use crate::core::path::{join_segment, structured_to_flat};
use crate::core::schema::{IndexedNode, IsmRequest, NodeKind, NodeRef, PlacementStep, SchemaIndex, TransitionTable};
use crate::core::value::rm::{dv_text, name_of, type_of, RawObject};
use crate::core::value::{
    canonical_key, canonicalize, covers, get_string, scalar_string, to_value, Attributes, DataValue,
    IntervalValue,
};
use crate::domain::{ContextBag, ConversionError, ConversionResult, RmType};
use defaults::RmDefaults;
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Builds raw compositions for one schema
///
/// # Examples
///
/// ```
/// use meridian::core::builder::CompositionBuilder;
/// use meridian::core::convert::ConversionOptions;
/// use meridian::core::schema::SchemaIndex;
/// use meridian::domain::{ContextBag, WebTemplate};
/// use serde_json::json;
///
/// let template = WebTemplate::from_json_str(r#"{
///     "templateId": "Note.v1", "defaultLanguage": "en",
///     "tree": {"id": "note", "name": "Note", "rmType": "COMPOSITION", "min": 1,
///              "nodeId": "openEHR-EHR-COMPOSITION.note.v1", "aqlPath": "/"}
/// }"#).unwrap();
/// let index = SchemaIndex::build(&template).unwrap();
/// let options = ConversionOptions::default();
/// let context = ContextBag::new().with_territory("IE").with_composer_name("John");
///
/// let flat = [("note/context/start_time".to_string(), json!("2024-01-01T10:00:00Z"))]
///     .into_iter()
///     .collect();
/// let raw = CompositionBuilder::new(&index, &options).build_flat(&flat, &context).unwrap();
/// assert_eq!(raw["_type"], "COMPOSITION");
/// assert_eq!(raw["composer"]["name"], "John");
/// assert_eq!(raw["context"]["start_time"]["value"], "2024-01-01T10:00:00Z");
/// ```
pub struct CompositionBuilder<'a> {
    index: &'a SchemaIndex,
    options: &'a ConversionOptions,
}

const ISM_PARTS: [&str; 3] = ["current_state", "careflow_step", "transition"];

/// The raw object of one occurrence, ready to be placed
struct Built {
    object: Value,
    /// Whether any leaf below produced a value
    produced: bool,
}

/// State of one build, shared read-only by the recursion
struct Walk<'a> {
    index: &'a SchemaIndex,
    options: &'a ConversionOptions,
    context: &'a ContextBag,
    language: &'a str,
}

impl<'a> CompositionBuilder<'a> {
    pub fn new(index: &'a SchemaIndex, options: &'a ConversionOptions) -> Self {
        Self { index, options }
    }

    /// Builds a composition from flat `path → value` entries
    pub fn build_flat(&self, flat: &IndexMap<String, Value>, context: &ContextBag) -> ConversionResult<Value> {
        let root = self.index.node(self.index.root());
        let parsed = parse_input(flat, |segment| {
            segment == root.id || (self.options.relaxed_names && root.is_known_name(segment))
        })?;
        let context = context.clone().merged_with(parsed.context);
        let language = context
            .language
            .clone()
            .or_else(|| self.options.default_language.clone())
            .unwrap_or_else(|| self.index.default_language().to_string());

        let walk = Walk {
            index: self.index,
            options: self.options,
            context: &context,
            language: &language,
        };
        let mut input = parsed.root;
        if input.path.is_empty() {
            input.path = root.id.clone();
        }

        let mut composition = walk.own_object(root, true);
        if let Some(key) = input.attributes.keys().next() {
            return Err(ConversionError::invalid_attribute(key.as_str(), "a COMPOSITION holds no value").at(&input.path));
        }
        meta::apply_object_meta(&mut composition, &input, &context).map_err(|e| e.at(&input.path))?;
        walk.fill_children(self.index.root(), &input, &mut composition)?;

        RmDefaults::new(&context, &language, root, self.options)?.apply(&mut composition)?;

        debug!(
            template_id = %self.index.template_id(),
            entries = flat.len(),
            "Composition built"
        );
        Ok(Value::Object(composition))
    }

    /// Builds a composition from a structured document
    pub fn build_structured(&self, document: &Value, context: &ContextBag) -> ConversionResult<Value> {
        let flat = structured_to_flat(document)?;
        self.build_flat(&flat, context)
    }
}

impl Walk<'_> {
    /// Builds every schema child of one occurrence into `target`
    fn fill_children(&self, parent: NodeRef, input: &InputNode, target: &mut RawObject) -> ConversionResult<bool> {
        let parent_node = self.index.node(parent);
        let mut grouped: BTreeMap<NodeRef, BTreeMap<usize, &InputNode>> = BTreeMap::new();
        let mut sequence: Vec<(usize, (usize, usize), &InputNode)> = Vec::new();

        for (segment, occurrences) in input.data_children() {
            let matched = self
                .index
                .resolve(parent, segment, self.options.relaxed_names)
                .ok_or_else(|| ConversionError::UnknownPath {
                    segment: segment.clone(),
                    parent: input.path.clone(),
                })?;

            for (&occurrence, child) in occurrences {
                let (node, local) = matched.locate(self.index, occurrence).ok_or_else(|| {
                    ConversionError::UnknownPath {
                        segment: segment.clone(),
                        parent: input.path.clone(),
                    }
                })?;
                if grouped.entry(node).or_default().insert(local, child).is_some() {
                    return Err(ConversionError::malformed_path(
                        child.path.clone(),
                        "node addressed twice under different names",
                    ));
                }
                if parent_node.ordered {
                    sequence.push((child.order, (self.index.declared_position(node), local), child));
                }
            }
        }

        if parent_node.ordered {
            check_input_order(&input.path, sequence)?;
        }

        let mut produced = false;
        for &child in &parent_node.children {
            let occurrences = grouped.remove(&child).unwrap_or_default();
            produced |= self.fill_node(child, &occurrences, input, target)?;
        }
        Ok(produced)
    }

    /// Builds all occurrences of one schema node and checks its cardinality
    fn fill_node(
        &self,
        child: NodeRef,
        occurrences: &BTreeMap<usize, &InputNode>,
        parent_input: &InputNode,
        target: &mut RawObject,
    ) -> ConversionResult<bool> {
        let node = self.index.node(child);
        let cardinality = |found: usize| ConversionError::Cardinality {
            node: join_segment(&parent_input.path, &node.id, None),
            found,
            min: node.min,
            max: node.max,
        };

        let found = occurrences.keys().next_back().map_or(0, |last| last.saturating_add(1));
        if node.max.is_some_and(|max| found > max) {
            return Err(cardinality(found));
        }
        if occurrences.is_empty() {
            return self.fill_missing(child, parent_input, target);
        }
        if occurrences.len() < node.min && !self.is_exempt(node) {
            return Err(cardinality(occurrences.len()));
        }

        debug!(node = %node.path, occurrences = occurrences.len(), "Building node");
        let mut produced = false;
        for input in occurrences.values() {
            if let Some(built) = self.build_occurrence(child, input).map_err(|e| e.at(&input.path))? {
                self.place(node, target, built.object, &input.path)?;
                produced |= built.produced;
            }
        }
        Ok(produced)
    }

    /// Nodes whose absence the walk does not check
    ///
    /// In-context attributes are defaulted after the walk and choice
    /// alternatives exclude each other.
    fn is_exempt(&self, node: &IndexedNode) -> bool {
        (node.in_context && node.kind != NodeKind::Ism)
            || node
                .parent
                .is_some_and(|parent| self.index.node(parent).kind == NodeKind::Choice)
    }

    /// Handles a node without input: ISM overrides, fallback values and the
    /// minimum occurrence check
    fn fill_missing(&self, child: NodeRef, parent_input: &InputNode, target: &mut RawObject) -> ConversionResult<bool> {
        let node = self.index.node(child);
        let path = join_segment(&parent_input.path, &node.id, None);

        if node.kind == NodeKind::Ism {
            return match self.build_ism(child, None, &path)? {
                Some(object) => {
                    self.place(node, target, object, &path)?;
                    Ok(true)
                }
                None => Ok(false),
            };
        }
        if self.is_exempt(node) || !node.is_mandatory() {
            return Ok(false);
        }

        let empty = InputNode::new(path.clone());
        match self.build_occurrence(child, &empty) {
            Ok(Some(built)) if built.produced => {
                self.place(node, target, built.object, &path)?;
                Ok(true)
            }
            _ => Err(ConversionError::Cardinality {
                node: path,
                found: 0,
                min: node.min,
                max: node.max,
            }),
        }
    }

    /// Builds the raw object of one occurrence; `None` when it is omitted
    fn build_occurrence(&self, child: NodeRef, input: &InputNode) -> ConversionResult<Option<Built>> {
        let node = self.index.node(child);
        match node.kind {
            NodeKind::Structural => {
                if let Some(key) = input.attributes.keys().next() {
                    return Err(ConversionError::invalid_attribute(
                        key.as_str(),
                        format!("{} holds no value", node.rm_type),
                    ));
                }
                let mut object = self.own_object(node, false);
                meta::apply_object_meta(&mut object, input, self.context)?;
                let produced = self.fill_children(child, input, &mut object)?;
                Ok(Some(Built {
                    object: self.wrap(node, Value::Object(object)),
                    produced,
                }))
            }
            NodeKind::Leaf => {
                reject_children(input)?;
                let attrs = self.leaf_attributes(node, &input.attributes, &input.path)?;
                let value = to_value(node, &attrs, self.language)?;
                self.wrap_value(node, value, input).map(Some)
            }
            NodeKind::Interval => {
                let value = self.interval_value(child, input)?;
                self.wrap_value(node, value, input).map(Some)
            }
            NodeKind::Choice => self.build_choice(child, input),
            NodeKind::Ism => Ok(self.build_ism(child, Some(input), &input.path)?.map(|object| Built {
                object,
                produced: true,
            })),
        }
    }

    /// Applies fixed and default values to the supplied attributes of a leaf
    fn leaf_attributes(&self, node: &IndexedNode, supplied: &Attributes, path: &str) -> ConversionResult<Attributes> {
        let mut attrs = supplied.clone();
        for input in &node.inputs {
            let key = input.suffix.as_deref().unwrap_or_default();
            let canonical = canonical_key(&node.rm_type, key);
            let present = attrs
                .keys()
                .find(|existing| canonical_key(&node.rm_type, existing) == canonical)
                .cloned();

            match (&input.fixed_value, &input.default_value, present) {
                (Some(fixed), _, Some(existing)) => {
                    let supplied = &attrs[&existing];
                    if scalar_string(key, supplied).ok() != scalar_string(key, fixed).ok() {
                        match self.options.fixed_values {
                            FixedValuePolicy::Ignore => warn!(
                                path,
                                attribute = key,
                                supplied = %supplied,
                                fixed = %fixed,
                                "Supplied value replaced by the fixed value"
                            ),
                            FixedValuePolicy::Reject => {
                                return Err(ConversionError::ConstraintViolation(format!(
                                    "'{}' is fixed to {fixed}, got {supplied}",
                                    if key.is_empty() { "value" } else { key }
                                )))
                            }
                        }
                    }
                    attrs.shift_remove(&existing);
                    attrs.insert(key.to_string(), fixed.clone());
                }
                (Some(fixed), _, None) | (None, Some(fixed), None) => {
                    attrs.insert(key.to_string(), fixed.clone());
                }
                _ => {}
            }
        }

        if node.rm_type.is_party() {
            attrs = meta::party_attributes(&attrs, self.context);
        }
        Ok(attrs)
    }

    /// Raw value with value meta applied, wrapped in its ELEMENT when the
    /// placement has one
    fn wrap_value(&self, node: &IndexedNode, value: DataValue, input: &InputNode) -> ConversionResult<Built> {
        let mut raw = value.to_rm();
        meta::apply_value_meta(&mut raw, node, input, self.language)?;
        let mut object = self.wrap(node, raw);
        match object.as_object_mut() {
            Some(wrapper) if node.has_wrapper() => meta::apply_object_meta(wrapper, input, self.context)?,
            _ => {
                if let Some(name) = input
                    .meta_children()
                    .map(|(name, _)| name)
                    .find(|name| !matches!(name.as_str(), "_mapping" | "_normal_range"))
                {
                    return Err(ConversionError::invalid_attribute(
                        name.as_str(),
                        format!("not applicable to {}", value.rm_type_name()),
                    ));
                }
            }
        }
        Ok(Built { object, produced: true })
    }

    /// DV_INTERVAL from `lower`/`upper` bound children and flag attributes
    fn interval_value(&self, child: NodeRef, input: &InputNode) -> ConversionResult<DataValue> {
        let node = self.index.node(child);
        let flags = canonicalize(&node.rm_type, &input.attributes)?;
        let mut bounds: [Option<DataValue>; 2] = [None, None];

        for (segment, occurrences) in input.data_children() {
            let position = ["lower", "upper"]
                .iter()
                .position(|bound| bound == segment)
                .ok_or_else(|| ConversionError::UnknownPath {
                    segment: segment.clone(),
                    parent: input.path.clone(),
                })?;
            let bound_ref = node
                .children
                .iter()
                .copied()
                .find(|&c| self.index.node(c).id == *segment)
                .ok_or_else(|| ConversionError::InvalidSchema(format!("'{}' has no {segment} bound", node.path)))?;
            let bound_node = self.index.node(bound_ref);
            let bound_input = match occurrences.get(&0) {
                Some(bound) if occurrences.len() == 1 => bound,
                _ => {
                    return Err(ConversionError::Cardinality {
                        node: join_segment(&input.path, segment, None),
                        found: occurrences.len().max(2),
                        min: 0,
                        max: Some(1),
                    })
                }
            };
            reject_children(bound_input)?;
            let attrs = self.leaf_attributes(bound_node, &bound_input.attributes, &bound_input.path)?;
            let value = to_value(bound_node, &attrs, self.language).map_err(|e| e.at(&bound_input.path))?;
            bounds[position] = Some(value);
        }

        let [lower, upper] = bounds;
        Ok(DataValue::Interval(IntervalValue::new(&flags, lower, upper)?))
    }

    /// ELEMENT whose value is one of several alternative types
    ///
    /// The alternative is named explicitly by a child segment, or found as
    /// the first declared alternative whose attribute keys cover the
    /// attributes supplied directly on the element.
    fn build_choice(&self, child: NodeRef, input: &InputNode) -> ConversionResult<Option<Built>> {
        let node = self.index.node(child);
        let alternatives: Vec<NodeRef> = node
            .children
            .iter()
            .copied()
            .filter(|&c| {
                let alternative = self.index.node(c);
                !alternative.in_context && alternative.rm_type.is_data_value()
            })
            .collect();
        let ambiguous = |reason: String| ConversionError::AmbiguousChoice {
            node: input.path.clone(),
            reason,
        };

        let explicit: Vec<&String> = input
            .data_children()
            .map(|(segment, _)| segment)
            .filter(|segment| {
                self.index
                    .resolve(child, segment, self.options.relaxed_names)
                    .is_some_and(|matched| matched.candidates.iter().any(|c| alternatives.contains(c)))
            })
            .collect();
        if explicit.len() > 1 {
            return Err(ambiguous(format!(
                "alternatives {} supplied together",
                explicit.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(", ")
            )));
        }
        if let (Some(segment), false) = (explicit.first(), input.attributes.is_empty()) {
            return Err(ambiguous(format!(
                "attributes supplied next to the alternative '{segment}'"
            )));
        }

        let mut object = self.own_object(node, false);
        meta::apply_object_meta(&mut object, input, self.context)?;

        let produced = if input.attributes.is_empty() {
            self.fill_children(child, input, &mut object)?
        } else {
            let keys: Vec<&str> = input.attributes.keys().map(String::as_str).collect();
            let alternative = alternatives
                .iter()
                .copied()
                .find(|&c| covers(&self.index.node(c).rm_type, keys.iter().copied()))
                .ok_or_else(|| {
                    ambiguous(format!(
                        "no alternative accepts the attributes [{}]",
                        keys.join(", ")
                    ))
                })?;
            let mut routed = input.clone();
            routed.attributes.clear();
            let mut value_input = InputNode::new(input.path.clone());
            value_input.attributes = input.attributes.clone();
            routed.children.insert(
                self.index.node(alternative).id.clone(),
                IndexMap::from([(0, value_input)]),
            );
            self.fill_children(child, &routed, &mut object)?
        };

        if !produced {
            if node.is_mandatory() {
                return Err(ambiguous("no alternative supplied".to_string()));
            }
            return Ok(None);
        }
        Ok(Some(Built {
            object: self.wrap(node, Value::Object(object)),
            produced,
        }))
    }

    /// ISM_TRANSITION from `current_state`, `careflow_step` and `transition`
    /// children, or from the context override when the node has no input
    fn build_ism(&self, child: NodeRef, input: Option<&InputNode>, path: &str) -> ConversionResult<Option<Value>> {
        let node = self.index.node(child);
        let mut request = match input {
            Some(input) => self.ism_request(child, input)?,
            None => IsmRequest::default(),
        };

        if request.is_empty() {
            match &self.context.ism_transition {
                Some(ism) => {
                    request = IsmRequest {
                        careflow_step: ism.careflow_step.clone(),
                        current_state: ism.current_state.clone(),
                        transition: ism.transition.clone(),
                        ..Default::default()
                    }
                }
                None if node.is_mandatory() => {
                    return Err(ConversionError::Cardinality {
                        node: path.to_string(),
                        found: 0,
                        min: node.min,
                        max: node.max,
                    })
                }
                None => return Ok(None),
            }
        }

        let empty = TransitionTable::default();
        let table = node.transitions.as_ref().unwrap_or(&empty);
        let resolution = table.resolve(path, &request).map_err(|e| e.at(path))?;
        debug!(node = %node.path, state = %resolution.current_state.code, "ISM transition resolved");
        Ok(Some(resolution.to_rm()))
    }

    fn ism_request(&self, child: NodeRef, input: &InputNode) -> ConversionResult<IsmRequest> {
        if let Some(key) = input.attributes.keys().next() {
            return Err(ConversionError::invalid_attribute(key.as_str(), "ISM_TRANSITION holds no value"));
        }
        let mut request = IsmRequest::default();
        for (segment, occurrences) in input.data_children() {
            let part = ISM_PARTS
                .iter()
                .copied()
                .find(|part| part == segment)
                .or_else(|| {
                    self.index
                        .resolve(child, segment, self.options.relaxed_names)
                        .map(|matched| self.index.node(matched.candidates[0]).id.as_str())
                })
                .ok_or_else(|| ConversionError::UnknownPath {
                    segment: segment.clone(),
                    parent: input.path.clone(),
                })?;
            let Some(part_input) = occurrences.get(&0).filter(|_| occurrences.len() == 1) else {
                return Err(ConversionError::Cardinality {
                    node: join_segment(&input.path, segment, None),
                    found: occurrences.len(),
                    min: 0,
                    max: Some(1),
                });
            };
            reject_children(part_input)?;
            let attrs = canonicalize(&RmType::DvCodedText, &part_input.attributes)
                .map_err(|e| e.at(&part_input.path))?;
            let code = get_string(&attrs, "code")?;
            let value = get_string(&attrs, "value")?;
            match part {
                "current_state" => {
                    request.current_state = code;
                    request.current_state_value = value;
                }
                "careflow_step" => request.careflow_step = code,
                "transition" => {
                    request.transition = code;
                    request.transition_value = value;
                }
                other => {
                    return Err(ConversionError::UnknownPath {
                        segment: other.to_string(),
                        parent: input.path.clone(),
                    })
                }
            }
        }
        Ok(request)
    }

    /// The node's own raw object, before any wrapping
    fn own_object(&self, node: &IndexedNode, is_root: bool) -> RawObject {
        let rm_type = node.instance_type();
        let mut object = RawObject::new();
        object.insert("_type".to_string(), json!(rm_type));
        if !is_locatable(rm_type) {
            return object;
        }

        object.insert("name".to_string(), dv_text(node.instance_name(self.language)));
        let node_id = node
            .node_id
            .clone()
            .or_else(|| node.placement.last().and_then(|step| step.node_id.clone()));
        if let Some(node_id) = node_id {
            if node_id.starts_with("openEHR-") {
                let mut details = json!({
                    "_type": "ARCHETYPED",
                    "archetype_id": {"_type": "ARCHETYPE_ID", "value": node_id},
                    "rm_version": self.options.rm_version
                });
                if is_root {
                    details["template_id"] = json!({
                        "_type": "TEMPLATE_ID",
                        "value": self.index.template_id().as_str()
                    });
                }
                object.insert("archetype_details".to_string(), details);
            }
            object.insert("archetype_node_id".to_string(), json!(node_id));
        }
        object
    }

    /// Object created for a placement step that is not the node's own
    fn step_object(&self, step: &PlacementStep, anchor_of: Option<&IndexedNode>) -> RawObject {
        let mut object = RawObject::new();
        object.insert("_type".to_string(), json!(step.rm_type));
        if is_locatable(&step.rm_type) {
            let name = match anchor_of {
                Some(node) => node.instance_name(self.language),
                None => step
                    .name
                    .as_deref()
                    .or_else(|| step.default_name())
                    .unwrap_or(&step.attribute),
            };
            object.insert("name".to_string(), dv_text(name));
            if let Some(node_id) = &step.node_id {
                object.insert("archetype_node_id".to_string(), json!(node_id));
            }
        }
        object
    }

    /// Nests the node's own object into the objects between its anchor and
    /// the last placement step
    fn wrap(&self, node: &IndexedNode, own: Value) -> Value {
        let mut current = own;
        for position in (node.anchor + 1..node.placement.len()).rev() {
            let holder_position = position - 1;
            let anchor_of = (holder_position == node.anchor).then_some(node);
            let mut holder = self.step_object(&node.placement[holder_position], anchor_of);
            let step = &node.placement[position];
            let value = if step.multiple {
                Value::Array(vec![current])
            } else {
                current
            };
            holder.insert(step.attribute.clone(), value);
            current = Value::Object(holder);
        }
        current
    }

    /// Attaches an occurrence to the parent's raw object, creating shared
    /// intermediate objects on the way
    fn place(&self, node: &IndexedNode, target: &mut RawObject, object: Value, path: &str) -> ConversionResult<()> {
        let Some(anchor) = node.anchor_step() else {
            return Err(ConversionError::InvalidSchema(format!(
                "'{}' has no placement",
                node.path
            )));
        };
        let mut current = target;
        for step in &node.placement[..node.anchor] {
            current = self.step_into(current, step, path)?;
        }

        if anchor.multiple {
            let slot = current
                .entry(anchor.attribute.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            let items = slot.as_array_mut().ok_or_else(|| ConversionError::MalformedTree {
                path: path.to_string(),
                reason: format!("'{}' is not a list", anchor.attribute),
            })?;
            items.push(object);
        } else if current.contains_key(&anchor.attribute) {
            return Err(ConversionError::Cardinality {
                node: path.to_string(),
                found: 2,
                min: node.min,
                max: Some(1),
            });
        } else {
            current.insert(anchor.attribute.clone(), object);
        }
        Ok(())
    }

    fn step_into<'t>(
        &self,
        current: &'t mut RawObject,
        step: &PlacementStep,
        path: &str,
    ) -> ConversionResult<&'t mut RawObject> {
        let not_an_object = || ConversionError::MalformedTree {
            path: path.to_string(),
            reason: format!("'{}' does not hold an object", step.attribute),
        };
        let slot = if step.multiple {
            let list = current
                .entry(step.attribute.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            let items = list.as_array_mut().ok_or_else(not_an_object)?;
            let position = match items.iter().position(|item| step_matches(item, step)) {
                Some(position) => position,
                None => {
                    items.push(Value::Object(self.step_object(step, None)));
                    items.len() - 1
                }
            };
            &mut items[position]
        } else {
            current
                .entry(step.attribute.clone())
                .or_insert_with(|| Value::Object(self.step_object(step, None)))
        };
        slot.as_object_mut().ok_or_else(not_an_object)
    }
}

/// Whether an existing raw object is the one a placement step refers to
fn step_matches(item: &Value, step: &PlacementStep) -> bool {
    let identity = match &step.node_id {
        Some(node_id) => item.get("archetype_node_id").and_then(Value::as_str) == Some(node_id.as_str()),
        None => type_of(item) == Some(step.rm_type.as_str()),
    };
    identity && step.name.as_deref().is_none_or(|name| name_of(item) == Some(name))
}

fn is_locatable(rm_type: &str) -> bool {
    rm_type
        .parse::<RmType>()
        .map(|rm_type| rm_type.is_locatable())
        .unwrap_or(false)
}

/// Children of an ordered parent must arrive in declared order, and the
/// occurrences of one child in index order
///
/// `sequence` holds `(entry order, (declared position, occurrence), input)`.
fn check_input_order(parent: &str, mut sequence: Vec<(usize, (usize, usize), &InputNode)>) -> ConversionResult<()> {
    sequence.sort_by_key(|(order, _, _)| *order);
    for pair in sequence.windows(2) {
        let (_, previous_key, previous) = pair[0];
        let (_, key, current) = pair[1];
        if key < previous_key {
            return Err(ConversionError::Ordering {
                node: parent.to_string(),
                reason: format!("'{}' supplied after '{}'", current.path, previous.path),
            });
        }
    }
    Ok(())
}

/// Leaves only take attributes and value meta segments
fn reject_children(input: &InputNode) -> ConversionResult<()> {
    match input.data_children().next() {
        Some((segment, _)) => Err(ConversionError::UnknownPath {
            segment: segment.clone(),
            parent: input.path.clone(),
        }),
        None => Ok(()),
    }
}
