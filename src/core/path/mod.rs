//! Path model
//!
//! Parses and renders the addressing scheme used by FLAT and STRUCTURED
//! compositions:
//!
//! ```text
//! encounter/vitals:0/any_event:1/temperature|magnitude
//! └─ segment ─┘└ occurrence ┘        └ attribute ┘
//! ```
//!
//! A path is a sequence of [`Segment`]s. Only the last segment may carry an
//! attribute suffix. Occurrence indices are zero-based; an omitted index means
//! `:0`. Paths starting with `ctx` address the context bag instead of the
//! schema tree but share the grammar.

pub mod aql;
pub mod structured;

use crate::domain::{ConversionError, ConversionResult};
use std::fmt;
use std::str::FromStr;

pub use aql::{parse_aql_path, relative_steps, AqlStep};
pub use structured::{flat_to_structured, structured_to_flat};

/// Root segment of context paths
pub const CONTEXT_ROOT: &str = "ctx";

/// Meta segments recognised below schema nodes
pub const META_SEGMENTS: &[&str] = &[
    "_uid",
    "_link",
    "_work_flow_id",
    "_name",
    "_mapping",
    "_normal_range",
    "_end_time",
    "_location",
    "_health_care_facility",
    "_other_participation",
];

/// One step of a flat path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    /// Node id, relaxed name or meta segment (`_link`)
    pub name: String,
    /// Zero-based occurrence index, `None` when omitted
    pub index: Option<usize>,
    /// Attribute suffix, only ever set on the last segment
    pub attribute: Option<String>,
}

impl Segment {
    /// Creates a segment without index or attribute
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
            attribute: None,
        }
    }

    /// Sets the occurrence index
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Sets the attribute suffix
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Occurrence index with the implicit `:0` applied
    pub fn occurrence(&self) -> usize {
        self.index.unwrap_or(0)
    }

    /// Whether the segment is a meta segment (`_uid`, `_link`, ...)
    pub fn is_meta(&self) -> bool {
        self.name.starts_with('_')
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(index) = self.index {
            write!(f, ":{index}")?;
        }
        if let Some(attribute) = &self.attribute {
            write!(f, "|{attribute}")?;
        }
        Ok(())
    }
}

/// A parsed flat path
///
/// # Examples
///
/// ```
/// use meridian::core::path::FlatPath;
///
/// let path: FlatPath = "encounter/vitals:1/temperature|magnitude".parse().unwrap();
/// assert_eq!(path.segments().len(), 3);
/// assert_eq!(path.segments()[1].index, Some(1));
/// assert_eq!(path.attribute(), Some("magnitude"));
/// assert_eq!(path.to_string(), "encounter/vitals:1/temperature|magnitude");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlatPath {
    segments: Vec<Segment>,
}

impl FlatPath {
    /// Parses a flat path
    pub fn parse(text: &str) -> ConversionResult<Self> {
        parse_flat_path(text).map(|segments| Self { segments })
    }

    /// Builds a path from segments, enforcing the attribute-last rule
    pub fn from_segments(segments: Vec<Segment>) -> ConversionResult<Self> {
        if segments.is_empty() {
            return Err(ConversionError::malformed_path("", "path is empty"));
        }
        let last = segments.len() - 1;
        if segments[..last].iter().any(|s| s.attribute.is_some()) {
            return Err(ConversionError::malformed_path(
                render_flat_path(&segments),
                "attribute suffix before the last segment",
            ));
        }
        Ok(Self { segments })
    }

    /// The segments of the path
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Consumes the path, returning its segments
    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Attribute suffix of the last segment
    pub fn attribute(&self) -> Option<&str> {
        self.segments.last().and_then(|s| s.attribute.as_deref())
    }

    /// Whether the path addresses the context bag
    pub fn is_context(&self) -> bool {
        self.segments
            .first()
            .map(|s| s.name == CONTEXT_ROOT)
            .unwrap_or(false)
    }
}

impl fmt::Display for FlatPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_flat_path(&self.segments))
    }
}

impl FromStr for FlatPath {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parses a flat path into its segments
///
/// Fails with [`ConversionError::MalformedPath`] when a segment is empty, an
/// occurrence index is not numeric, or an attribute suffix appears before the
/// last segment.
pub fn parse_flat_path(text: &str) -> ConversionResult<Vec<Segment>> {
    if text.trim().is_empty() {
        return Err(ConversionError::malformed_path(text, "path is empty"));
    }

    let parts: Vec<&str> = text.split('/').collect();
    let last = parts.len() - 1;
    let mut segments = Vec::with_capacity(parts.len());

    for (position, part) in parts.iter().enumerate() {
        let (head, attribute) = match part.split_once('|') {
            Some((head, attribute)) => {
                if position != last {
                    return Err(ConversionError::malformed_path(
                        text,
                        format!("attribute suffix '|{attribute}' before the last segment"),
                    ));
                }
                if attribute.is_empty() || attribute.contains('|') {
                    return Err(ConversionError::malformed_path(
                        text,
                        format!("invalid attribute suffix '|{attribute}'"),
                    ));
                }
                (head, Some(attribute.to_string()))
            }
            None => (*part, None),
        };

        let (name, index) = match head.split_once(':') {
            Some((name, index)) => {
                let index = index.parse::<usize>().map_err(|_| {
                    ConversionError::malformed_path(
                        text,
                        format!("non-numeric occurrence index ':{index}'"),
                    )
                })?;
                (name, Some(index))
            }
            None => (head, None),
        };

        if name.is_empty() {
            return Err(ConversionError::malformed_path(text, "empty segment"));
        }

        segments.push(Segment {
            name: name.to_string(),
            index,
            attribute,
        });
    }

    Ok(segments)
}

/// Renders segments back into flat path text
///
/// This is the left inverse of [`parse_flat_path`] for every path the
/// flattener produces.
pub fn render_flat_path(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(Segment::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// Appends a child segment (with optional index) to a rendered path prefix
pub(crate) fn join_segment(prefix: &str, name: &str, index: Option<usize>) -> String {
    let segment = match index {
        Some(index) => format!("{name}:{index}"),
        None => name.to_string(),
    };
    if prefix.is_empty() {
        segment
    } else {
        format!("{prefix}/{segment}")
    }
}

/// Appends an attribute suffix to a rendered path
pub(crate) fn with_attribute(path: &str, attribute: Option<&str>) -> String {
    match attribute {
        Some(attribute) if !attribute.is_empty() => format!("{path}|{attribute}"),
        _ => path.to_string(),
    }
}
