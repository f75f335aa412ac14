//! Schema index
//!
//! Flattens a [`WebTemplate`] into an arena of [`IndexedNode`]s with
//! precomputed lookup maps, so resolving a path segment below a node is a hash
//! lookup. The index also derives, once per schema, everything the builder,
//! flattener and validator share: node kinds, raw placement steps and ISM
//! transition tables.
//!
//! An index is never mutated after [`SchemaIndex::build`] returns and can be
//! shared freely between concurrent conversions.

pub mod ism;
pub mod locate;
pub mod matcher;
pub mod openehr;

use crate::core::path::{parse_aql_path, relative_steps, AqlStep};
use crate::domain::{
    ConversionError, ConversionResult, RmType, TemplateId, WebTemplate, WebTemplateInput,
    WebTemplateNode,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

pub use ism::{state_name, IsmRequest, IsmResolution, TransitionTable};
pub use locate::{anchor_items, choose_alternative, occurrences, RawOccurrence};
pub use matcher::{normalize_name, Matcher, MATCH_ORDER};

/// Position of a node in the index arena
pub type NodeRef = usize;

/// RM attributes that hold lists
const MULTIPLE_ATTRIBUTES: &[&str] = &[
    "content",
    "items",
    "events",
    "activities",
    "links",
    "other_participations",
];

/// How a node is converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Container whose children are schema nodes
    Structural,
    /// Data value, code phrase or party
    Leaf,
    /// ELEMENT whose children are mutually exclusive value alternatives
    Choice,
    /// DV_INTERVAL with `lower` and `upper` bound children
    Interval,
    /// ISM_TRANSITION of an ACTION
    Ism,
}

/// One step from a parent's raw object towards a node's raw object
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementStep {
    /// RM attribute holding the object
    pub attribute: String,
    /// Required `archetype_node_id` of the object
    pub node_id: Option<String>,
    /// Name predicate from the AQL path
    pub name: Option<String>,
    /// Concrete RM type created at this step
    pub rm_type: String,
    /// The attribute holds a list
    pub multiple: bool,
    /// Siblings share this step, so the object name disambiguates
    pub match_name: bool,
}

impl PlacementStep {
    /// Default name given to an intermediate object created at this step
    pub fn default_name(&self) -> Option<&'static str> {
        match self.rm_type.as_str() {
            "HISTORY" => Some("History"),
            "ITEM_TREE" => Some("Tree"),
            "POINT_EVENT" => Some("Any event"),
            "ACTIVITY" => Some("Activity"),
            "CLUSTER" => Some("Cluster"),
            _ => None,
        }
    }
}

/// A schema node with its derived conversion metadata
#[derive(Debug, Clone)]
pub struct IndexedNode {
    /// Web Template id, used as the flat path segment
    pub id: String,
    /// Flat path of ids from the root, without indices
    pub path: String,
    /// Display name in the template's default language
    pub name: String,
    /// Display names keyed by language
    pub names: BTreeMap<String, String>,
    pub rm_type: RmType,
    pub node_id: Option<String>,
    pub min: usize,
    /// `None` when unbounded
    pub max: Option<usize>,
    pub in_context: bool,
    pub ordered: bool,
    pub kind: NodeKind,
    pub parent: Option<NodeRef>,
    pub children: Vec<NodeRef>,
    /// Steps from the parent's raw object to this node's raw object
    pub placement: Vec<PlacementStep>,
    /// Step that starts a new occurrence
    pub anchor: usize,
    pub inputs: Vec<WebTemplateInput>,
    pub proportion_types: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    /// Careflow table of ISM nodes
    pub transitions: Option<TransitionTable>,
}

impl IndexedNode {
    /// Display name for a language
    pub fn display_name(&self, language: &str) -> &str {
        self.names.get(language).unwrap_or(&self.name)
    }

    /// Whether `name` is one of the node's display names
    pub fn is_known_name(&self, name: &str) -> bool {
        self.name == name
            || self.names.values().any(|n| n == name)
            || self.name_predicate() == Some(name)
    }

    /// Name written into the node's raw (or wrapper) object
    pub fn instance_name(&self, language: &str) -> &str {
        self.name_predicate()
            .unwrap_or_else(|| self.display_name(language))
    }

    /// The occurrence-bearing placement step, `None` for the root
    pub fn anchor_step(&self) -> Option<&PlacementStep> {
        self.placement.get(self.anchor)
    }

    fn name_predicate(&self) -> Option<&str> {
        self.anchor_step().and_then(|step| step.name.as_deref())
    }

    /// Concrete RM type of the node's own raw object
    pub fn instance_type(&self) -> &str {
        self.placement
            .last()
            .map(|step| step.rm_type.as_str())
            .unwrap_or_else(|| self.rm_type.instance_name())
    }

    /// Whether the leaf sits inside an ELEMENT wrapper
    pub fn has_wrapper(&self) -> bool {
        self.anchor + 1 < self.placement.len()
    }

    /// Input for an attribute suffix (`None` = the bare value input)
    pub fn input(&self, suffix: Option<&str>) -> Option<&WebTemplateInput> {
        self.inputs
            .iter()
            .find(|input| input.suffix.as_deref() == suffix)
    }

    /// Whether any input declares a fixed or default value
    pub fn has_fallback_value(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| input.fixed_value.is_some() || input.default_value.is_some())
    }

    /// Whether the node must occur at least once
    pub fn is_mandatory(&self) -> bool {
        self.min > 0
    }

    /// Whether a single occurrence is all the node allows
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    /// Whether an annotation is set to a truthy value
    pub fn has_annotation(&self, key: &str) -> bool {
        self.annotations
            .get(key)
            .map(|v| v.is_empty() || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// Candidates a segment resolved to, in declared order
#[derive(Debug, Clone, Copy)]
pub struct ChildMatch<'a> {
    pub matcher: Matcher,
    pub candidates: &'a [NodeRef],
}

impl ChildMatch<'_> {
    /// Distributes an occurrence index over the candidates
    ///
    /// Occurrences fill each candidate up to its maximum, in declared order.
    /// The last candidate absorbs any overflow so the caller reports the
    /// cardinality violation against it.
    pub fn locate(&self, index: &SchemaIndex, occurrence: usize) -> Option<(NodeRef, usize)> {
        let mut remaining = occurrence;
        let last = self.candidates.len().checked_sub(1)?;
        for (position, &candidate) in self.candidates.iter().enumerate() {
            if position == last {
                return Some((candidate, remaining));
            }
            match index.node(candidate).max {
                Some(max) if remaining >= max => remaining -= max,
                _ => return Some((candidate, remaining)),
            }
        }
        None
    }
}

/// Immutable lookup structure over one Web Template
#[derive(Debug, Clone)]
pub struct SchemaIndex {
    template_id: TemplateId,
    default_language: String,
    nodes: Vec<IndexedNode>,
    lookup: HashMap<(NodeRef, Matcher, String), Vec<NodeRef>>,
}

impl SchemaIndex {
    /// Indexes a Web Template
    ///
    /// Fails with [`ConversionError::InvalidSchema`] when the root is not a
    /// COMPOSITION, an RM type tag is unknown, or a node cannot be placed.
    ///
    /// # Examples
    ///
    /// ```
    /// use meridian::core::schema::SchemaIndex;
    /// use meridian::domain::WebTemplate;
    ///
    /// let template = WebTemplate::from_json_str(r#"{
    ///     "templateId": "Minimal.v1",
    ///     "tree": {"id": "minimal", "name": "Minimal", "rmType": "COMPOSITION",
    ///              "nodeId": "openEHR-EHR-COMPOSITION.minimal.v1", "aqlPath": "/", "min": 1}
    /// }"#).unwrap();
    /// let index = SchemaIndex::build(&template).unwrap();
    /// let language = index.resolve(index.root(), "language", false).unwrap();
    /// assert_eq!(index.node(language.candidates[0]).path, "minimal/language");
    /// ```
    pub fn build(template: &WebTemplate) -> ConversionResult<Self> {
        let mut tree = template.tree.clone();
        let root_type: RmType = tree
            .rm_type
            .parse()
            .map_err(ConversionError::InvalidSchema)?;
        if root_type != RmType::Composition {
            return Err(ConversionError::InvalidSchema(format!(
                "root node '{}' is {}, expected COMPOSITION",
                tree.id, tree.rm_type
            )));
        }
        if tree.aql_path.is_none() {
            tree.aql_path = Some("/".to_string());
        }
        synthesize_composition_attributes(&mut tree);

        let mut index = Self {
            template_id: template.template_id.clone(),
            default_language: template.default_language.clone(),
            nodes: Vec::new(),
            lookup: HashMap::new(),
        };
        index.add_node(&tree, None)?;

        tracing::debug!(
            template_id = %index.template_id,
            nodes = index.nodes.len(),
            "Schema index built"
        );
        Ok(index)
    }

    /// Template the index was built from
    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    /// Language used when the caller asks for none
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// The COMPOSITION node
    pub fn root(&self) -> NodeRef {
        0
    }

    /// Node at an arena position
    pub fn node(&self, node: NodeRef) -> &IndexedNode {
        &self.nodes[node]
    }

    /// Number of indexed nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the index is empty (never true for a built index)
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolves a path segment below `parent`
    ///
    /// Matchers run in [`MATCH_ORDER`]; the first one with a hit wins. With
    /// `relaxed_names` off only ids match.
    pub fn resolve(&self, parent: NodeRef, segment: &str, relaxed_names: bool) -> Option<ChildMatch<'_>> {
        MATCH_ORDER
            .iter()
            .filter(|matcher| matcher.enabled(relaxed_names))
            .find_map(|&matcher| {
                let key = match matcher {
                    Matcher::Id => segment.to_string(),
                    _ => normalize_name(segment),
                };
                self.lookup
                    .get(&(parent, matcher, key))
                    .map(|candidates| ChildMatch {
                        matcher,
                        candidates: candidates.as_slice(),
                    })
            })
    }

    /// Position of `child` among its parent's children
    pub fn declared_position(&self, child: NodeRef) -> usize {
        self.nodes[child]
            .parent
            .and_then(|parent| self.nodes[parent].children.iter().position(|&c| c == child))
            .unwrap_or(0)
    }

    fn add_node(
        &mut self,
        source: &WebTemplateNode,
        parent: Option<NodeRef>,
    ) -> ConversionResult<NodeRef> {
        let path = match parent {
            Some(parent) => format!("{}/{}", self.nodes[parent].path, source.id),
            None => source.id.clone(),
        };
        let rm_type: RmType = source
            .rm_type
            .parse()
            .map_err(|e: String| ConversionError::InvalidSchema(format!("node '{path}': {e}")))?;

        let mut source = source.clone();
        if let RmType::DvInterval(inner) = &rm_type {
            synthesize_interval_bounds(&mut source, inner);
        }

        let kind = classify(&rm_type, &source);
        let placement = match parent {
            Some(parent) => self.placement_for(parent, &source, &rm_type, &path)?,
            None => Vec::new(),
        };
        let anchor = placement
            .iter()
            .rposition(|step| step.node_id.is_some())
            .unwrap_or(placement.len().saturating_sub(1));

        let transitions = (kind == NodeKind::Ism).then(|| {
            source
                .children
                .iter()
                .find(|child| child.id == "careflow_step")
                .and_then(|step| step.input(Some("code")).or_else(|| step.input(None)))
                .map(|input| TransitionTable::from_input(input, &self.default_language))
                .unwrap_or_default()
        });

        let reference = self.nodes.len();
        self.nodes.push(IndexedNode {
            id: source.id.clone(),
            path,
            name: source.display_name(&self.default_language).to_string(),
            names: source.localized_names.clone(),
            rm_type,
            node_id: source.node_id.clone().filter(|id| !id.is_empty()),
            min: source.min_occurrences(),
            max: source.max_occurrences(),
            in_context: source.in_context,
            ordered: source.ordered,
            kind,
            parent,
            children: Vec::new(),
            placement,
            anchor,
            inputs: source.inputs.clone(),
            proportion_types: source.proportion_types.clone(),
            annotations: source.annotations.clone(),
            transitions,
        });

        if let Some(parent) = parent {
            self.nodes[parent].children.push(reference);
            for matcher in MATCH_ORDER {
                for key in matcher.keys(&source) {
                    self.lookup
                        .entry((parent, matcher, key))
                        .or_default()
                        .push(reference);
                }
            }
        }

        for child in &source.children {
            self.add_node(child, Some(reference))?;
        }
        self.mark_shared_anchors(reference);
        Ok(reference)
    }

    /// Flags anchor steps that only the object's name tells apart
    fn mark_shared_anchors(&mut self, parent: NodeRef) {
        let children = self.nodes[parent].children.clone();
        for &child in &children {
            let Some(step) = self.nodes[child].anchor_step().cloned() else {
                continue;
            };
            if step.node_id.is_none() {
                continue;
            }
            let shared = children.iter().any(|&other| {
                other != child
                    && self.nodes[other].anchor_step().is_some_and(|other| {
                        other.attribute == step.attribute && other.node_id == step.node_id
                    })
            });
            if shared {
                let anchor = self.nodes[child].anchor;
                self.nodes[child].placement[anchor].match_name = true;
            }
        }
    }

    fn placement_for(
        &self,
        parent: NodeRef,
        source: &WebTemplateNode,
        rm_type: &RmType,
        path: &str,
    ) -> ConversionResult<Vec<PlacementStep>> {
        let parent_node = &self.nodes[parent];
        let parent_steps = self.aql_steps(parent)?;
        let own_steps = match &source.aql_path {
            Some(aql) => parse_aql_path(aql)?,
            None => Vec::new(),
        };

        let relative: Vec<AqlStep> = match relative_steps(&parent_steps, &own_steps) {
            Some(steps) if !steps.is_empty() && source.aql_path.is_some() => steps.to_vec(),
            _ => fallback_steps(parent_node, source, rm_type, path)?,
        };

        let mut previous = parent_node.instance_type().to_string();
        let last = relative.len() - 1;
        relative
            .iter()
            .enumerate()
            .map(|(position, step)| {
                let instance = if position == last {
                    match rm_type {
                        RmType::DvInterval(_) => "DV_INTERVAL".to_string(),
                        other => other.instance_name().to_string(),
                    }
                } else {
                    let next = &relative[position + 1];
                    intermediate_type(&previous, &step.attribute, &next.attribute)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            ConversionError::InvalidSchema(format!(
                                "node '{path}': cannot create an intermediate object for '{}' below {previous}",
                                step.attribute
                            ))
                        })?
                };
                previous = instance.clone();
                Ok(PlacementStep {
                    attribute: step.attribute.clone(),
                    node_id: step.node_id.clone(),
                    name: step.name.clone(),
                    rm_type: instance,
                    multiple: MULTIPLE_ATTRIBUTES.contains(&step.attribute.as_str()),
                    match_name: false,
                })
            })
            .collect()
    }

    /// Absolute AQL steps of a node, rebuilt from the placement chain
    fn aql_steps(&self, node: NodeRef) -> ConversionResult<Vec<AqlStep>> {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(reference) = current {
            let node = &self.nodes[reference];
            chain.push(&node.placement);
            current = node.parent;
        }
        Ok(chain
            .into_iter()
            .rev()
            .flatten()
            .map(|step| AqlStep {
                attribute: step.attribute.clone(),
                node_id: step.node_id.clone(),
                name: step.name.clone(),
            })
            .collect())
    }
}

fn classify(rm_type: &RmType, source: &WebTemplateNode) -> NodeKind {
    match rm_type {
        RmType::DvInterval(_) => NodeKind::Interval,
        RmType::IsmTransition => NodeKind::Ism,
        leaf if leaf.is_leaf() => NodeKind::Leaf,
        RmType::Element
            if source.children.iter().any(|child| {
                !child.in_context
                    && child
                        .rm_type
                        .parse::<RmType>()
                        .map(|t| t.is_data_value())
                        .unwrap_or(false)
            }) =>
        {
            NodeKind::Choice
        }
        _ => NodeKind::Structural,
    }
}

/// Steps used when a node has no usable AQL path
fn fallback_steps(
    parent: &IndexedNode,
    source: &WebTemplateNode,
    rm_type: &RmType,
    path: &str,
) -> ConversionResult<Vec<AqlStep>> {
    if source.in_context || parent.kind == NodeKind::Interval || parent.kind == NodeKind::Ism {
        return Ok(vec![AqlStep::attribute(source.id.clone())]);
    }
    if parent.kind == NodeKind::Choice {
        return Ok(vec![AqlStep::attribute("value")]);
    }

    let (container, attribute) = match parent.instance_type() {
        "COMPOSITION" => (None, "content"),
        "SECTION" | "ITEM_TREE" | "ITEM_LIST" | "CLUSTER" => (None, "items"),
        "INSTRUCTION" => (None, "activities"),
        "HISTORY" => (None, "events"),
        "OBSERVATION" => (Some("data"), "events"),
        "EVALUATION" | "ADMIN_ENTRY" | "POINT_EVENT" | "INTERVAL_EVENT" => (Some("data"), "items"),
        "ACTION" | "ACTIVITY" => (Some("description"), "items"),
        "EVENT_CONTEXT" => (Some("other_context"), "items"),
        other => {
            return Err(ConversionError::InvalidSchema(format!(
                "node '{path}' has no aqlPath and {other} has no default child attribute"
            )))
        }
    };

    let mut steps: Vec<AqlStep> = container.map(AqlStep::attribute).into_iter().collect();
    steps.push(AqlStep {
        attribute: attribute.to_string(),
        node_id: source.node_id.clone().filter(|id| !id.is_empty()),
        name: None,
    });
    if rm_type.is_data_value() && attribute == "items" {
        steps.push(AqlStep::attribute("value"));
    }
    Ok(steps)
}

/// RM type of an implicit object between a parent and an archetyped child
fn intermediate_type(parent_type: &str, attribute: &str, next_attribute: &str) -> Option<&'static str> {
    match (parent_type, attribute) {
        ("OBSERVATION", "data") => Some("HISTORY"),
        ("HISTORY", "events") => Some("POINT_EVENT"),
        ("INSTRUCTION", "activities") => Some("ACTIVITY"),
        ("COMPOSITION", "context") => Some("EVENT_CONTEXT"),
        ("ITEM_TREE" | "ITEM_LIST" | "CLUSTER" | "SECTION", "items") => {
            if next_attribute == "value" {
                Some("ELEMENT")
            } else {
                Some("CLUSTER")
            }
        }
        ("OBSERVATION" | "EVALUATION" | "INSTRUCTION" | "ACTION" | "ADMIN_ENTRY", "protocol")
        | ("EVALUATION" | "ADMIN_ENTRY", "data")
        | ("POINT_EVENT" | "INTERVAL_EVENT", "data" | "state")
        | ("ACTION" | "ACTIVITY", "description")
        | ("HISTORY", "summary")
        | ("EVENT_CONTEXT", "other_context") => Some("ITEM_TREE"),
        _ => None,
    }
}

fn coded_input(terminology: &str, items: &[(&str, &str)]) -> WebTemplateInput {
    let mut input = WebTemplateInput::new(Some("code"), "CODED_TEXT").with_terminology(terminology);
    for (code, label) in items {
        input = input.with_item(*code, *label);
    }
    input
}

fn code_phrase_node(id: &str, terminology: &str) -> WebTemplateNode {
    let mut terminology_input = WebTemplateInput::new(Some("terminology"), "TEXT");
    terminology_input.default_value = Some(json!(terminology));
    WebTemplateNode::new(id, "CODE_PHRASE")
        .with_name(id)
        .with_occurrences(1, 1)
        .with_aql_path(format!("/{id}"))
        .in_context()
        .with_input(WebTemplateInput::new(Some("code"), "TEXT"))
        .with_input(terminology_input)
}

/// Adds the COMPOSITION attributes every conversion handles generically
fn synthesize_composition_attributes(root: &mut WebTemplateNode) {
    let has = |root: &WebTemplateNode, id: &str| root.children.iter().any(|c| c.id == id);

    if !has(root, "language") {
        root.children
            .push(code_phrase_node("language", openehr::LANGUAGE_TERMINOLOGY));
    }
    if !has(root, "territory") {
        root.children
            .push(code_phrase_node("territory", openehr::TERRITORY_TERMINOLOGY));
    }
    if !has(root, "category") {
        root.children.push(
            WebTemplateNode::new("category", "DV_CODED_TEXT")
                .with_name("Category")
                .with_occurrences(1, 1)
                .with_aql_path("/category")
                .in_context()
                .with_input(coded_input(
                    openehr::OPENEHR,
                    &[openehr::CATEGORY_EVENT, openehr::CATEGORY_PERSISTENT],
                )),
        );
    }
    if !has(root, "composer") {
        let mut composer = WebTemplateNode::new("composer", "PARTY_PROXY")
            .with_name("Composer")
            .with_occurrences(1, 1)
            .with_aql_path("/composer")
            .in_context();
        for suffix in ["name", "id", "id_scheme", "id_namespace"] {
            composer = composer.with_input(WebTemplateInput::new(Some(suffix), "TEXT"));
        }
        root.children.push(composer);
    }

    let context_position = match root.children.iter().position(|c| c.id == "context") {
        Some(position) => position,
        None => {
            root.children.push(
                WebTemplateNode::new("context", "EVENT_CONTEXT")
                    .with_name("context")
                    .with_occurrences(0, 1)
                    .with_aql_path("/context")
                    .in_context(),
            );
            root.children.len() - 1
        }
    };
    let context = &mut root.children[context_position];
    if !has(context, "start_time") {
        context.children.push(
            WebTemplateNode::new("start_time", "DV_DATE_TIME")
                .with_name("Start time")
                .with_occurrences(1, 1)
                .with_aql_path("/context/start_time")
                .in_context()
                .with_input(WebTemplateInput::new(None, "DATETIME")),
        );
    }
    if !has(context, "setting") {
        context.children.push(
            WebTemplateNode::new("setting", "DV_CODED_TEXT")
                .with_name("Setting")
                .with_occurrences(1, 1)
                .with_aql_path("/context/setting")
                .in_context()
                .with_input(coded_input(openehr::OPENEHR, openehr::SETTINGS)),
        );
    }
}

/// Gives DV_INTERVAL nodes explicit `lower` and `upper` children
fn synthesize_interval_bounds(node: &mut WebTemplateNode, inner: &RmType) {
    for bound in ["lower", "upper"] {
        if node.children.iter().any(|c| c.id == bound) {
            continue;
        }
        let mut child = WebTemplateNode::new(bound, inner.to_string())
            .with_name(bound)
            .with_occurrences(0, 1)
            .in_context();
        if let Some(aql) = &node.aql_path {
            child = child.with_aql_path(format!("{aql}/{bound}"));
        }
        child.inputs = node.inputs.clone();
        node.children.push(child);
    }
}
