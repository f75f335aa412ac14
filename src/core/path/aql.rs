//! AQL path steps
//!
//! Web template nodes carry an `aqlPath` such as
//! `/content[openEHR-EHR-OBSERVATION.vitals.v1]/data[at0001]/events[at0002]`.
//! Placement of children inside the raw composition is driven by the steps
//! between a parent's path and its child's path.

use crate::domain::{ConversionError, ConversionResult};
use std::fmt;

/// One `attribute[predicate]` step of an AQL path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AqlStep {
    /// RM attribute name (`content`, `data`, `items`, ...)
    pub attribute: String,
    /// Archetype node id or archetype id from the predicate
    pub node_id: Option<String>,
    /// Name constraint from the predicate
    pub name: Option<String>,
}

impl AqlStep {
    /// Creates a bare attribute step
    pub fn attribute(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            node_id: None,
            name: None,
        }
    }
}

impl fmt::Display for AqlStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.attribute)?;
        match (&self.node_id, &self.name) {
            (Some(id), Some(name)) => write!(f, "[{id} and name/value='{name}']"),
            (Some(id), None) => write!(f, "[{id}]"),
            (None, Some(name)) => write!(f, "[name/value='{name}']"),
            (None, None) => Ok(()),
        }
    }
}

/// Parses an AQL path into steps
///
/// Accepts the predicate forms `[at0001]`, `[at0001,'Name']` and
/// `[at0001 and name/value='Name']`. Slashes inside brackets or quotes do not
/// split steps. The root path `/` yields no steps.
pub fn parse_aql_path(path: &str) -> ConversionResult<Vec<AqlStep>> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return Ok(Vec::new());
    }

    let mut raw_steps = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;

    for ch in trimmed.chars() {
        match ch {
            '\'' if depth > 0 => {
                quoted = !quoted;
                current.push(ch);
            }
            '[' if !quoted => {
                depth += 1;
                current.push(ch);
            }
            ']' if !quoted => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ConversionError::InvalidSchema(format!("unbalanced ']' in aqlPath '{path}'"))
                })?;
                current.push(ch);
            }
            '/' if depth == 0 => {
                if !current.is_empty() {
                    raw_steps.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if depth != 0 || quoted {
        return Err(ConversionError::InvalidSchema(format!(
            "unterminated predicate in aqlPath '{path}'"
        )));
    }
    if !current.is_empty() {
        raw_steps.push(current);
    }

    raw_steps.iter().map(|step| parse_step(step, path)).collect()
}

fn parse_step(step: &str, path: &str) -> ConversionResult<AqlStep> {
    let Some(open) = step.find('[') else {
        return Ok(AqlStep::attribute(step));
    };
    if !step.ends_with(']') {
        return Err(ConversionError::InvalidSchema(format!(
            "trailing text after predicate in aqlPath '{path}'"
        )));
    }

    let attribute = step[..open].to_string();
    let predicate = step[open + 1..step.len() - 1].trim();
    let (node_id, name) = parse_predicate(predicate);

    Ok(AqlStep {
        attribute,
        node_id,
        name,
    })
}

fn parse_predicate(predicate: &str) -> (Option<String>, Option<String>) {
    if let Some(position) = predicate.find(" and ") {
        let (id, rest) = predicate.split_at(position);
        let name = rest[" and ".len()..]
            .trim()
            .strip_prefix("name/value=")
            .map(unquote);
        return (non_empty(id), name);
    }

    if let Some(rest) = predicate.strip_prefix("name/value=") {
        return (None, Some(unquote(rest)));
    }

    match predicate.split_once(',') {
        Some((id, name)) => (non_empty(id), Some(unquote(name))),
        None => (non_empty(predicate), None),
    }
}

fn unquote(text: &str) -> String {
    text.trim().trim_matches('\'').trim_matches('"').to_string()
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Steps leading from `parent` to `child`, or `None` when `parent` is not a
/// prefix of `child`
///
/// Name predicates on the parent's own steps are ignored when comparing, so a
/// renamed parent still addresses its archetyped children.
pub fn relative_steps<'a>(parent: &[AqlStep], child: &'a [AqlStep]) -> Option<&'a [AqlStep]> {
    if parent.len() > child.len() {
        return None;
    }
    let is_prefix = parent
        .iter()
        .zip(child)
        .all(|(p, c)| p.attribute == c.attribute && p.node_id == c.node_id);
    is_prefix.then(|| &child[parent.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_archetyped_path() {
        let steps = parse_aql_path(
            "/content[openEHR-EHR-OBSERVATION.vitals.v1]/data[at0001]/events[at0002]/data[at0003]/items[at0004]/value",
        )
        .unwrap();
        assert_eq!(steps.len(), 6);
        assert_eq!(steps[0].attribute, "content");
        assert_eq!(
            steps[0].node_id.as_deref(),
            Some("openEHR-EHR-OBSERVATION.vitals.v1")
        );
        assert_eq!(steps[5], AqlStep::attribute("value"));
    }

    #[test_case("/items[at0004,'Blood pressure']" ; "comma form")]
    #[test_case("/items[at0004 and name/value='Blood pressure']" ; "and form")]
    fn test_parse_name_predicates(path: &str) {
        let steps = parse_aql_path(path).unwrap();
        assert_eq!(steps[0].node_id.as_deref(), Some("at0004"));
        assert_eq!(steps[0].name.as_deref(), Some("Blood pressure"));
    }

    #[test]
    fn test_slash_inside_name_does_not_split() {
        let steps = parse_aql_path("/items[at0004,'Systolic/Diastolic']/value").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name.as_deref(), Some("Systolic/Diastolic"));
    }

    #[test]
    fn test_root_path_has_no_steps() {
        assert!(parse_aql_path("/").unwrap().is_empty());
    }

    #[test]
    fn test_unbalanced_predicate_is_schema_error() {
        assert!(matches!(
            parse_aql_path("/content[openEHR"),
            Err(ConversionError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_relative_steps() {
        let parent = parse_aql_path("/content[openEHR-EHR-OBSERVATION.vitals.v1]").unwrap();
        let child = parse_aql_path(
            "/content[openEHR-EHR-OBSERVATION.vitals.v1]/data[at0001]/events[at0002]",
        )
        .unwrap();
        let relative = relative_steps(&parent, &child).unwrap();
        assert_eq!(relative.len(), 2);
        assert_eq!(relative[0].attribute, "data");

        let other = parse_aql_path("/context/other_context[at0001]").unwrap();
        assert!(relative_steps(&parent, &other).is_none());
    }

    #[test]
    fn test_display_round_trips_predicate() {
        let steps = parse_aql_path("/items[at0004 and name/value='Pulse']").unwrap();
        assert_eq!(steps[0].to_string(), "/items[at0004 and name/value='Pulse']");
    }
}
