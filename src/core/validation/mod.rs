//! Raw composition validation
//!
//! The validator walks a raw COMPOSITION in lockstep with the schema index and
//! collects every violation it finds instead of stopping at the first one.
//! It never assumes the tree came from this crate's builder.
//!
//! Checked per node:
//!
//! - occurrence counts against `min`/`max`
//! - data values, re-read through the value layer (codes, units, ranges)
//! - choice alternatives against the raw `_type`
//! - ISM current states and careflow steps
//! - participations (composer, other participations)
//! - sibling order below ordered parents
//! - archetyped objects no schema node accounts for
//!
//! Only a tree that cannot be walked at all is an error.

pub mod report;

pub use report::{reason, ValidationReport, Violation};

use crate::core::path::join_segment;
use crate::core::schema::{
    anchor_items, choose_alternative, occurrences, state_name, IndexedNode, NodeKind, NodeRef, RawOccurrence,
    SchemaIndex,
};
use crate::core::value::rm::type_of;
use crate::core::value::{from_value, to_value, CodedTextValue, DataValue, IntervalValue, PartyValue};
use crate::domain::{ConversionError, ConversionResult, RmType};
use serde_json::Value;
use tracing::debug;

/// Validates raw compositions against one schema
pub struct Validator<'a> {
    index: &'a SchemaIndex,
}

impl<'a> Validator<'a> {
    pub fn new(index: &'a SchemaIndex) -> Self {
        Self { index }
    }

    /// Collects the violations of a raw COMPOSITION
    ///
    /// Returns an empty list for a compliant tree. Fails with
    /// [`ConversionError::MalformedTree`] only when `raw` is not a
    /// COMPOSITION object.
    pub fn validate(&self, raw: &Value) -> ConversionResult<Vec<Violation>> {
        if !raw.is_object() || type_of(raw) != Some("COMPOSITION") {
            return Err(ConversionError::MalformedTree {
                path: String::new(),
                reason: "the root must be a COMPOSITION object".to_string(),
            });
        }

        let language = raw
            .pointer("/language/code_string")
            .and_then(Value::as_str)
            .unwrap_or(self.index.default_language());
        let mut check = Check {
            index: self.index,
            language,
            violations: Vec::new(),
        };

        let root = self.index.root();
        let path = self.index.node(root).id.as_str();
        check.children(root, raw, path);

        debug!(
            template_id = %self.index.template_id(),
            violations = check.violations.len(),
            "Composition validated"
        );
        Ok(check.violations)
    }
}

struct Check<'a> {
    index: &'a SchemaIndex,
    language: &'a str,
    violations: Vec<Violation>,
}

/// An occurrence of a child taking part in the ordering check
struct Placed {
    attribute: String,
    position: usize,
    declared: usize,
    path: String,
}

impl<'a> Check<'a> {
    fn push(&mut self, path: &str, reason_code: &str, message: impl Into<String>) {
        self.violations.push(Violation::new(path, reason_code, message));
    }

    fn push_error(&mut self, path: &str, error: &ConversionError) {
        let reason_code = match error.root_cause() {
            ConversionError::MalformedPath { .. }
            | ConversionError::MalformedTree { .. }
            | ConversionError::InvalidSchema(_) => reason::INVALID_VALUE,
            other => other.reason_code(),
        };
        let path = error.path().unwrap_or(path).to_string();
        self.push(&path, reason_code, error.root_cause().to_string());
    }

    fn children(&mut self, parent: NodeRef, raw: &'a Value, path: &str) {
        let index = self.index;
        let parent_node = index.node(parent);
        let mut claimed: Vec<&Value> = Vec::new();
        let mut placed: Vec<Placed> = Vec::new();

        for &child in &parent_node.children {
            let node = index.node(child);
            let found = occurrences(index, child, raw);
            self.cardinality(node, found.len(), &join_segment(path, &node.id, None));

            let ordered_anchor = node
                .anchor_step()
                .filter(|step| parent_node.ordered && node.anchor == 0 && step.multiple);

            for (i, occurrence) in found.iter().enumerate() {
                let occurrence_path = join_segment(path, &node.id, (!node.is_single()).then_some(i));
                claimed.push(occurrence.holder);
                if let Some(anchor) = ordered_anchor {
                    placed.push(Placed {
                        attribute: anchor.attribute.clone(),
                        position: occurrence.position,
                        declared: index.declared_position(child),
                        path: occurrence_path.clone(),
                    });
                }
                self.occurrence(child, occurrence, &occurrence_path);
            }
        }

        self.ordering(placed);
        self.unexpected(parent_node, raw, path, &claimed);
    }

    fn cardinality(&mut self, node: &IndexedNode, found: usize, path: &str) {
        let too_few = found < node.min;
        let too_many = node.max.is_some_and(|max| found > max);
        if !too_few && !too_many {
            return;
        }

        let bounds = match node.max {
            Some(max) => format!("{}..{max}", node.min),
            None => format!("{}..*", node.min),
        };
        let message = format!("'{}' occurs {found} times, expected {bounds}", node.id);
        if too_few && node.rm_type.is_party() {
            self.push(path, reason::MISSING_PARTICIPATION, message);
        } else {
            self.push(path, reason::CARDINALITY, message);
        }
    }

    fn occurrence(&mut self, child: NodeRef, occurrence: &RawOccurrence<'a>, path: &str) {
        let node = self.index.node(child);
        let value = occurrence.value.filter(|v| !v.is_null());
        match node.kind {
            NodeKind::Structural => {
                if let Some(object) = value {
                    self.participations(object, path);
                    self.children(child, object, path);
                }
            }
            NodeKind::Choice => {
                if let Some(data) = value.and_then(|element| element.get("value")).filter(|v| !v.is_null()) {
                    self.choice(child, data, path);
                }
            }
            NodeKind::Leaf => {
                if let Some(data) = value {
                    self.leaf(node, data, path);
                }
            }
            NodeKind::Interval => {
                if let Some(data) = value {
                    self.interval(node, data, path);
                }
            }
            NodeKind::Ism => {
                if let Some(ism) = value {
                    self.ism(node, ism, path);
                }
            }
        }
    }

    fn leaf(&mut self, node: &IndexedNode, data: &Value, path: &str) {
        let checked = DataValue::from_rm(&node.rm_type, data).and_then(|value| {
            if node.rm_type.is_party() {
                return Ok(value);
            }
            to_value(node, &from_value(node, &value)?, self.language)
        });
        match checked {
            Ok(DataValue::Party(PartyValue::Identified { name: None, id: None })) => self.push(
                path,
                reason::MISSING_PARTICIPATION,
                format!("'{}' names no party: a name or an external reference is required", node.id),
            ),
            Ok(_) => {}
            Err(e) => self.push_error(path, &e),
        }
    }

    fn choice(&mut self, choice: NodeRef, data: &Value, path: &str) {
        let Some(alternative) = choose_alternative(self.index, choice, data) else {
            let node = self.index.node(choice);
            self.push(
                path,
                reason::CHOICE_TYPE,
                format!(
                    "{} is not an alternative of '{}'",
                    type_of(data).unwrap_or("an untyped value"),
                    node.id
                ),
            );
            return;
        };

        let node = self.index.node(alternative);
        let alternative_path = join_segment(path, &node.id, None);
        match node.kind {
            NodeKind::Interval => self.interval(node, data, &alternative_path),
            _ => self.leaf(node, data, &alternative_path),
        }
    }

    fn interval(&mut self, node: &IndexedNode, data: &Value, path: &str) {
        let RmType::DvInterval(element) = &node.rm_type else {
            return self.leaf(node, data, path);
        };
        let interval = match IntervalValue::from_rm(element, data) {
            Ok(interval) => interval,
            Err(e) => return self.push_error(path, &e),
        };

        for (bound, value) in [("lower", &interval.lower), ("upper", &interval.upper)] {
            let Some(value) = value else { continue };
            let Some(bound_node) = node
                .children
                .iter()
                .map(|&c| self.index.node(c))
                .find(|n| n.id == bound)
            else {
                continue;
            };
            let checked = from_value(bound_node, value).and_then(|attrs| to_value(bound_node, &attrs, self.language));
            if let Err(e) = checked {
                self.push_error(&join_segment(path, bound, None), &e);
            }
        }

        let flags = interval.attributes();
        let lower = interval.lower.map(|bound| *bound);
        let upper = interval.upper.map(|bound| *bound);
        if let Err(e) = IntervalValue::new(&flags, lower, upper) {
            self.push_error(path, &e);
        }
    }

    fn ism(&mut self, node: &IndexedNode, raw: &Value, path: &str) {
        match raw.get("current_state").filter(|v| !v.is_null()) {
            None => self.push(
                &join_segment(path, "current_state", None),
                reason::INVALID_ATTRIBUTE,
                "an ISM transition needs a current state",
            ),
            Some(state) => match CodedTextValue::from_rm(state) {
                Ok(state) if state_name(&state.code).is_none() => self.push(
                    &join_segment(path, "current_state", None),
                    reason::UNKNOWN_CODE,
                    format!("'{}' is not an instruction state", state.code),
                ),
                Ok(_) => {}
                Err(e) => self.push_error(&join_segment(path, "current_state", None), &e),
            },
        }

        let Some(step) = raw.get("careflow_step").filter(|v| !v.is_null()) else {
            return;
        };
        let step_path = join_segment(path, "careflow_step", None);
        match CodedTextValue::from_rm(step) {
            Ok(step) => {
                let undeclared = node
                    .transitions
                    .as_ref()
                    .is_some_and(|table| !table.is_empty() && table.step(&step.code).is_none());
                if undeclared {
                    self.push(
                        &step_path,
                        reason::UNKNOWN_TRANSITION,
                        format!("careflow step '{}' is not declared for '{}'", step.code, node.id),
                    );
                }
            }
            Err(e) => self.push_error(&step_path, &e),
        }
    }

    /// Other participations of an entry need a function and a performer
    fn participations(&mut self, object: &Value, path: &str) {
        let is_entry = type_of(object)
            .and_then(|name| name.parse::<RmType>().ok())
            .is_some_and(|rm_type| rm_type.is_entry());
        if !is_entry {
            return;
        }

        let participations = object
            .get("other_participations")
            .and_then(Value::as_array)
            .into_iter()
            .flatten();
        for (i, participation) in participations.enumerate() {
            let participation_path = join_segment(path, "_other_participation", Some(i));
            if participation.pointer("/function/value").is_none() {
                self.push(
                    &participation_path,
                    reason::MISSING_PARTICIPATION,
                    "participation has no function",
                );
            }
            match participation.get("performer").filter(|v| !v.is_null()) {
                None => self.push(
                    &participation_path,
                    reason::MISSING_PARTICIPATION,
                    "participation has no performer",
                ),
                Some(performer) => {
                    if let Err(e) = PartyValue::from_rm(performer) {
                        self.push_error(&participation_path, &e);
                    }
                }
            }
        }
    }

    /// Children of one list attribute must follow declaration order
    fn ordering(&mut self, mut placed: Vec<Placed>) {
        placed.sort_by(|a, b| (&a.attribute, a.position).cmp(&(&b.attribute, b.position)));

        let mut furthest: Option<(&str, usize, &str)> = None;
        let mut out_of_order = Vec::new();
        for entry in &placed {
            match furthest {
                Some((attribute, declared, after)) if attribute == entry.attribute && entry.declared < declared => {
                    out_of_order.push((entry.path.clone(), after.to_string()));
                }
                Some((attribute, declared, _)) if attribute == entry.attribute && entry.declared == declared => {}
                _ => furthest = Some((&entry.attribute, entry.declared, &entry.path)),
            }
        }

        for (path, after) in out_of_order {
            let message = format!("'{path}' is declared before '{after}' but follows it");
            self.push(&path, reason::ORDERING, message);
        }
    }

    /// Archetyped objects in anchor lists that no child accounts for
    fn unexpected(&mut self, parent: &IndexedNode, raw: &Value, path: &str, claimed: &[&Value]) {
        let mut seen: Vec<&Value> = Vec::new();
        for &child in &parent.children {
            for (_, item) in anchor_items(self.index.node(child), raw) {
                if seen.iter().any(|s| std::ptr::eq(*s, item)) {
                    continue;
                }
                seen.push(item);

                let Some(node_id) = item.get("archetype_node_id").and_then(Value::as_str) else {
                    continue;
                };
                if claimed.iter().any(|c| std::ptr::eq(*c, item)) {
                    continue;
                }
                self.push(
                    &join_segment(path, node_id, None),
                    reason::UNEXPECTED_NODE,
                    format!(
                        "{} '{node_id}' is not part of template '{}'",
                        type_of(item).unwrap_or("object"),
                        self.index.template_id()
                    ),
                );
            }
        }
    }
}
