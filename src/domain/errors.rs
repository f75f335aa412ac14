//! Domain error types
//!
//! This module defines the error hierarchy for Meridian.
//! [`MeridianError`] is the crate-wide error; [`ConversionError`] is the taxonomy
//! raised by path parsing, value coercion, the composition builder and the
//! flattener. All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Meridian error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum MeridianError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Conversion errors (build, flatten, validate)
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Web Template could not be loaded
    #[error("Schema error: {0}")]
    Schema(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Conversion error taxonomy
///
/// Raised by the path model, the value coercion layer, the composition builder
/// and the flattener. Builder failures are wrapped in [`ConversionError::Build`]
/// carrying the flat path at which the first fatal cause happened.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// A flat path or structured segment could not be parsed
    #[error("Malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// A path segment does not resolve to any schema node
    #[error("Unknown path segment '{segment}' below '{parent}'")]
    UnknownPath { segment: String, parent: String },

    /// A code is not part of a closed value set
    #[error("Unknown code '{code}' in {value_set}")]
    UnknownCode { code: String, value_set: String },

    /// A unit is not allowed by the schema
    #[error("Invalid unit '{unit}', allowed: [{allowed}]")]
    InvalidUnit { unit: String, allowed: String },

    /// An attribute is missing, unexpected or has the wrong shape
    #[error("Invalid attribute '{attribute}': {reason}")]
    InvalidAttribute { attribute: String, reason: String },

    /// A value violates a schema constraint (range, pattern, fixed value)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Occurrence count outside the declared bounds
    #[error("Cardinality violation for '{node}': found {found}, expected {min}..{}", display_max(.max))]
    Cardinality {
        node: String,
        found: usize,
        min: usize,
        max: Option<usize>,
    },

    /// No (or more than one) alternative of a choice node applies
    #[error("Ambiguous choice at '{node}': {reason}")]
    AmbiguousChoice { node: String, reason: String },

    /// Children of an ordered node were supplied out of order
    #[error("Ordering violation at '{node}': {reason}")]
    Ordering { node: String, reason: String },

    /// A careflow step code is not present in the transition table
    #[error("Unknown careflow step '{careflow_step}' at '{node}'")]
    UnknownTransition { node: String, careflow_step: String },

    /// The Web Template cannot be indexed
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The raw tree cannot be walked at all
    #[error("Malformed raw tree at '{path}': {reason}")]
    MalformedTree { path: String, reason: String },

    /// First fatal cause of a build, with the path at which it happened
    #[error("Build failed at '{path}': {source}")]
    Build {
        path: String,
        source: Box<ConversionError>,
    },
}

fn display_max(max: &Option<usize>) -> String {
    match max {
        Some(max) => max.to_string(),
        None => "*".to_string(),
    }
}

impl ConversionError {
    /// Wraps the error with the path it happened at
    ///
    /// An error that already carries a build path is returned unchanged, so the
    /// innermost (most precise) path wins.
    pub fn at(self, path: impl Into<String>) -> Self {
        match self {
            ConversionError::Build { .. } => self,
            other => ConversionError::Build {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost cause, unwrapping any [`ConversionError::Build`] layers
    pub fn root_cause(&self) -> &ConversionError {
        match self {
            ConversionError::Build { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the path carried by a [`ConversionError::Build`] wrapper
    pub fn path(&self) -> Option<&str> {
        match self {
            ConversionError::Build { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Stable reason code used in validation reports
    pub fn reason_code(&self) -> &'static str {
        match self.root_cause() {
            ConversionError::MalformedPath { .. } => "MALFORMED_PATH",
            ConversionError::UnknownPath { .. } => "UNEXPECTED_NODE",
            ConversionError::UnknownCode { .. } => "UNKNOWN_CODE",
            ConversionError::InvalidUnit { .. } => "INVALID_UNIT",
            ConversionError::InvalidAttribute { .. } => "INVALID_ATTRIBUTE",
            ConversionError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            ConversionError::Cardinality { .. } => "CARDINALITY",
            ConversionError::AmbiguousChoice { .. } => "CHOICE_TYPE",
            ConversionError::Ordering { .. } => "ORDERING",
            ConversionError::UnknownTransition { .. } => "UNKNOWN_TRANSITION",
            ConversionError::InvalidSchema(_) => "INVALID_SCHEMA",
            ConversionError::MalformedTree { .. } => "INVALID_VALUE",
            ConversionError::Build { .. } => "BUILD",
        }
    }

    pub(crate) fn invalid_attribute(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::InvalidAttribute {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for conversion operations
pub type ConversionResult<T> = std::result::Result<T, ConversionError>;

// Conversion from std::io::Error
impl From<std::io::Error> for MeridianError {
    fn from(err: std::io::Error) -> Self {
        MeridianError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for MeridianError {
    fn from(err: serde_json::Error) -> Self {
        MeridianError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for MeridianError {
    fn from(err: toml::de::Error) -> Self {
        MeridianError::Configuration(format!("TOML parse error: {err}"))
    }
}
