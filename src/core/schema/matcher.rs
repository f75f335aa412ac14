//! Segment matchers
//!
//! A path segment resolves to schema children by trying an ordered list of
//! matchers. The order is fixed: an id always beats a name, and a name always
//! beats a terminology binding.

use crate::domain::WebTemplateNode;

/// Strategy used to resolve a path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Matcher {
    /// Web Template id or archetype node id
    Id,
    /// Normalised display name in any language
    RelaxedName,
    /// Code of an external terminology binding
    TermBinding,
}

/// Resolution order, most specific first
pub const MATCH_ORDER: [Matcher; 3] = [Matcher::Id, Matcher::RelaxedName, Matcher::TermBinding];

impl Matcher {
    /// Whether the matcher is active with the given relaxed-name setting
    pub fn enabled(self, relaxed_names: bool) -> bool {
        matches!(self, Matcher::Id) || relaxed_names
    }

    /// Keys under which a node is reachable through this matcher
    pub fn keys(self, node: &WebTemplateNode) -> Vec<String> {
        let mut keys = match self {
            Matcher::Id => {
                let mut keys = vec![node.id.clone()];
                keys.extend(node.node_id.clone().filter(|id| !id.is_empty()));
                keys
            }
            Matcher::RelaxedName => node
                .localized_names
                .values()
                .chain(node.name.iter())
                .chain(node.localized_name.iter())
                .map(|name| normalize_name(name))
                .filter(|key| !key.is_empty())
                .collect(),
            Matcher::TermBinding => node
                .term_bindings
                .iter()
                .flat_map(|(terminology, binding)| {
                    let code = binding.value.code_string.clone();
                    [
                        code.clone(),
                        format!("{}_{}", normalize_name(terminology), code),
                    ]
                })
                .collect(),
        };
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Normalises a free-text name into a path segment
///
/// Lower case, with every run of non-alphanumeric characters collapsed into a
/// single `_` and no leading or trailing `_`.
///
/// ```
/// use meridian::core::schema::normalize_name;
///
/// assert_eq!(normalize_name("Blood Pressure"), "blood_pressure");
/// assert_eq!(normalize_name("  Any event (point) "), "any_event_point");
/// assert_eq!(normalize_name("SNOMED-CT"), "snomed_ct");
/// ```
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_separator = false;
            normalized.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    normalized
}
