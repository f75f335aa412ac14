//! Finding schema node occurrences in a raw tree
//!
//! The inverse of the builder's placement: starting from a parent's raw
//! object, follow a node's placement steps and collect every object that
//! stands for one occurrence of the node, in raw order.

use super::{IndexedNode, NodeKind, NodeRef, PlacementStep, SchemaIndex};
use crate::core::value::rm::{name_of, type_of};
use serde_json::Value;

/// One occurrence of a schema node in a raw tree
#[derive(Debug, Clone, Copy)]
pub struct RawOccurrence<'r> {
    /// Object at the anchor step (the ELEMENT of a wrapped leaf)
    pub holder: &'r Value,
    /// The node's own object; `None` when a wrapper holds no value
    pub value: Option<&'r Value>,
    /// Position in the anchor list, 0 for single valued attributes
    pub position: usize,
}

/// Occurrences of `child` below the raw object of its parent
pub fn occurrences<'r>(index: &SchemaIndex, child: NodeRef, parent: &'r Value) -> Vec<RawOccurrence<'r>> {
    let node = index.node(child);
    let Some(anchor) = node.anchor_step() else {
        return Vec::new();
    };

    anchor_items(node, parent)
        .into_iter()
        .filter(|(_, item)| anchor_matches(node, anchor, item))
        .map(|(position, holder)| RawOccurrence {
            holder,
            value: unwrap(node, holder),
            position,
        })
        .collect()
}

/// Every object found at the node's anchor attribute, matching or not
pub fn anchor_items<'r>(node: &IndexedNode, parent: &'r Value) -> Vec<(usize, &'r Value)> {
    let Some(anchor) = node.anchor_step() else {
        return Vec::new();
    };
    let mut frontier = vec![parent];
    for step in &node.placement[..node.anchor] {
        frontier = frontier
            .into_iter()
            .flat_map(|object| items(object, &step.attribute))
            .filter(|(_, item)| step_matches(step, item))
            .map(|(_, item)| item)
            .collect();
    }
    frontier
        .into_iter()
        .flat_map(|object| items(object, &anchor.attribute))
        .collect()
}

/// Alternative of a choice node that a raw value belongs to
///
/// An alternative whose concrete type equals the raw `_type` wins over one
/// that merely accepts it (DV_CODED_TEXT in a DV_TEXT slot).
pub fn choose_alternative(index: &SchemaIndex, choice: NodeRef, value: &Value) -> Option<NodeRef> {
    let raw_type = type_of(value)?;
    let alternatives: Vec<NodeRef> = index
        .node(choice)
        .children
        .iter()
        .copied()
        .filter(|&c| {
            let alternative = index.node(c);
            !alternative.in_context && alternative.rm_type.is_data_value()
        })
        .collect();
    alternatives
        .iter()
        .copied()
        .find(|&c| index.node(c).instance_type() == raw_type)
        .or_else(|| {
            alternatives
                .iter()
                .copied()
                .find(|&c| type_fits(index.node(c), raw_type))
        })
}

fn items<'r>(object: &'r Value, attribute: &str) -> Vec<(usize, &'r Value)> {
    match object.get(attribute) {
        Some(Value::Array(list)) => list.iter().enumerate().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![(0, single)],
    }
}

fn step_matches(step: &PlacementStep, item: &Value) -> bool {
    let identity = match &step.node_id {
        Some(node_id) => item.get("archetype_node_id").and_then(Value::as_str) == Some(node_id.as_str()),
        None => true,
    };
    identity && step.name.as_deref().is_none_or(|name| name_of(item) == Some(name))
}

fn anchor_matches(node: &IndexedNode, anchor: &PlacementStep, item: &Value) -> bool {
    match &anchor.node_id {
        Some(node_id) => {
            item.get("archetype_node_id").and_then(Value::as_str) == Some(node_id.as_str())
                && (!anchor.match_name || name_of(item).is_some_and(|name| node.is_known_name(name)))
        }
        None if node.has_wrapper() => true,
        None => match type_of(item) {
            Some(raw_type) if node.kind != NodeKind::Structural || node.rm_type.is_leaf() => {
                type_fits(node, raw_type)
            }
            _ => true,
        },
    }
}

fn type_fits(node: &IndexedNode, raw_type: &str) -> bool {
    node.rm_type.accepts(raw_type) || (node.rm_type.is_party() && raw_type.starts_with("PARTY_"))
}

/// Descends from the anchor object through the wrapper steps
fn unwrap<'r>(node: &IndexedNode, holder: &'r Value) -> Option<&'r Value> {
    node.placement[node.anchor + 1..]
        .iter()
        .try_fold(holder, |current, step| match current.get(&step.attribute) {
            Some(Value::Array(list)) => list.first(),
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        })
}
