//! Conversion between STRUCTURED and FLAT documents
//!
//! STRUCTURED nests the same paths as JSON objects: every schema node is an
//! array of occurrences, attribute suffixes become `|attr` keys and a bare
//! value sitting next to attributes uses the empty key. The `ctx` subtree
//! keeps plain objects since its keys do not repeat.

use super::{join_segment, parse_flat_path, with_attribute, CONTEXT_ROOT};
use crate::domain::{ConversionError, ConversionResult};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Flattens a STRUCTURED document into FLAT path/value pairs
///
/// Arrays produce explicit occurrence indices; single objects produce none.
/// Key order of the input is preserved.
///
/// # Examples
///
/// ```
/// use meridian::core::path::structured_to_flat;
/// use serde_json::json;
///
/// let flat = structured_to_flat(&json!({
///     "encounter": [{"count": [{"": 3}], "note": ["hello"]}]
/// })).unwrap();
/// assert_eq!(flat["encounter:0/count:0"], json!(3));
/// assert_eq!(flat["encounter:0/note:0"], json!("hello"));
/// ```
pub fn structured_to_flat(document: &Value) -> ConversionResult<IndexMap<String, Value>> {
    let object = document.as_object().ok_or_else(|| {
        ConversionError::malformed_path("", "structured document must be a JSON object")
    })?;

    let mut flat = IndexMap::new();
    for (key, value) in object {
        walk_node(key, value, &mut flat)?;
    }
    Ok(flat)
}

fn walk_node(path: &str, value: &Value, flat: &mut IndexMap<String, Value>) -> ConversionResult<()> {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let occurrence = indexed(path, index);
                walk_occurrence(&occurrence, item, flat)?;
            }
            Ok(())
        }
        other => walk_occurrence(path, other, flat),
    }
}

fn walk_occurrence(
    path: &str,
    value: &Value,
    flat: &mut IndexMap<String, Value>,
) -> ConversionResult<()> {
    match value {
        Value::Null => Ok(()),
        Value::Object(entries) => {
            for (key, child) in entries {
                if key.is_empty() {
                    emit(path, child, flat)?;
                } else if let Some(attribute) = key.strip_prefix('|') {
                    emit(&with_attribute(path, Some(attribute)), child, flat)?;
                } else {
                    walk_node(&format!("{path}/{key}"), child, flat)?;
                }
            }
            Ok(())
        }
        Value::Array(_) => Err(ConversionError::malformed_path(
            path,
            "nested arrays are not valid occurrences",
        )),
        scalar => emit(path, scalar, flat),
    }
}

fn emit(path: &str, value: &Value, flat: &mut IndexMap<String, Value>) -> ConversionResult<()> {
    match value {
        Value::Null => Ok(()),
        Value::Array(_) | Value::Object(_) => Err(ConversionError::malformed_path(
            path,
            "attribute values must be scalars",
        )),
        scalar => {
            flat.insert(path.to_string(), scalar.clone());
            Ok(())
        }
    }
}

fn indexed(path: &str, index: usize) -> String {
    match path.rsplit_once('/') {
        Some((prefix, name)) => join_segment(prefix, name, Some(index)),
        None => join_segment("", path, Some(index)),
    }
}

#[derive(Debug, Default)]
struct Occurrence {
    value: Option<Value>,
    attributes: IndexMap<String, Value>,
    children: IndexMap<String, BTreeMap<usize, Occurrence>>,
}

impl Occurrence {
    fn descend(&mut self, name: &str, index: usize) -> &mut Occurrence {
        self.children
            .entry(name.to_string())
            .or_default()
            .entry(index)
            .or_default()
    }

    fn into_json(self, as_arrays: bool) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return self.value.unwrap_or(Value::Null);
        }

        let mut object = Map::new();
        if let Some(value) = self.value {
            object.insert(String::new(), value);
        }
        for (attribute, value) in self.attributes {
            object.insert(format!("|{attribute}"), value);
        }
        for (name, occurrences) in self.children {
            let mut occurrences = occurrences.into_values().map(|o| o.into_json(as_arrays));
            let value = if as_arrays {
                Value::Array(occurrences.collect())
            } else {
                occurrences.next().unwrap_or(Value::Null)
            };
            object.insert(name, value);
        }
        Value::Object(object)
    }
}

/// Nests FLAT path/value pairs into a STRUCTURED document
///
/// Every schema node becomes an array of occurrences, so occurrences without
/// an explicit index land at position 0. Gaps between indices close up, as
/// they do when building. Context entries stay plain objects.
pub fn flat_to_structured(flat: &IndexMap<String, Value>) -> ConversionResult<Value> {
    let mut root = Occurrence::default();

    for (path, value) in flat {
        let segments = parse_flat_path(path)?;
        let mut node = &mut root;
        for segment in &segments {
            node = node.descend(&segment.name, segment.occurrence());
        }
        let last = segments.last().and_then(|s| s.attribute.clone());
        match last {
            Some(attribute) => {
                node.attributes.insert(attribute, value.clone());
            }
            None => node.value = Some(value.clone()),
        }
    }

    let mut document = Map::new();
    for (name, occurrences) in root.children {
        let as_arrays = name != CONTEXT_ROOT;
        let mut rendered = occurrences.into_values().map(|o| o.into_json(as_arrays));
        let value = if as_arrays {
            Value::Array(rendered.collect())
        } else {
            rendered.next().unwrap_or(Value::Null)
        };
        document.insert(name, value);
    }
    Ok(Value::Object(document))
}
