//! Domain identifier types with validation
//!
//! This module provides newtype wrappers for openEHR identifiers.
//! Each type ensures type safety and provides validation for format compliance.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Object version identifier newtype wrapper
///
/// Represents the versioned identifier of a composition.
/// Format: `{root}::{system_id}::{version}`
///
/// # Examples
///
/// ```
/// use meridian::domain::ids::ObjectVersionId;
/// use std::str::FromStr;
///
/// let uid = ObjectVersionId::from_str(
///     "84d7c3f5-1f6a-4f87-aa95-5d9c6b8f3a29::local.ehrbase.org::2"
/// ).unwrap();
/// assert_eq!(uid.version(), Some("2"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectVersionId(String);

impl ObjectVersionId {
    /// Creates a new ObjectVersionId from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(ObjectVersionId)` if the UID is valid, `Err` otherwise
    pub fn new(uid: impl Into<String>) -> Result<Self, String> {
        let uid = uid.into();
        if uid.trim().is_empty() {
            return Err("Object version id cannot be empty".to_string());
        }

        let parts: Vec<&str> = uid.split("::").collect();
        if parts.len() != 3 || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(format!(
                "Invalid object version id format. Expected format: {{root}}::{{system_id}}::{{version}}, got: {}",
                uid
            ));
        }

        Ok(Self(uid))
    }

    /// Generates a first version id with a random UUID root
    pub fn generate(system_id: &str) -> Self {
        Self(format!("{}::{}::1", Uuid::new_v4(), system_id))
    }

    /// Returns the version id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the root part (before first ::)
    pub fn root(&self) -> &str {
        self.0.split("::").next().unwrap_or(&self.0)
    }

    /// Whether the root is a UUID (as opposed to an ISO OID or internet id)
    pub fn has_uuid_root(&self) -> bool {
        Uuid::parse_str(self.root()).is_ok()
    }

    /// Extracts the system ID part (between :: separators)
    pub fn system_id(&self) -> Option<&str> {
        self.0.split("::").nth(1)
    }

    /// Extracts the version number
    pub fn version(&self) -> Option<&str> {
        self.0.split("::").nth(2)
    }
}

impl fmt::Display for ObjectVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectVersionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier attached to a LOCATABLE through the `_uid` attribute
///
/// Values in the `{root}::{system}::{version}` form are versioned
/// (`OBJECT_VERSION_ID`), anything else is a plain `HIER_OBJECT_ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatableUid {
    Versioned(ObjectVersionId),
    Hierarchical(String),
}

impl LocatableUid {
    /// Parses a `_uid` value
    pub fn parse(value: &str) -> Result<Self, String> {
        if value.trim().is_empty() {
            return Err("uid cannot be empty".to_string());
        }
        if value.contains("::") {
            ObjectVersionId::new(value).map(LocatableUid::Versioned)
        } else {
            Ok(LocatableUid::Hierarchical(value.to_string()))
        }
    }

    /// Returns the raw string value
    pub fn as_str(&self) -> &str {
        match self {
            LocatableUid::Versioned(id) => id.as_str(),
            LocatableUid::Hierarchical(id) => id,
        }
    }

    /// Canonical JSON representation
    pub fn to_rm(&self) -> Value {
        let rm_type = match self {
            LocatableUid::Versioned(_) => "OBJECT_VERSION_ID",
            LocatableUid::Hierarchical(_) => "HIER_OBJECT_ID",
        };
        json!({ "_type": rm_type, "value": self.as_str() })
    }
}

/// Template ID newtype wrapper
///
/// Represents an openEHR operational template identifier.
///
/// # Examples
///
/// ```
/// use meridian::domain::ids::TemplateId;
/// use std::str::FromStr;
///
/// let template_id = TemplateId::from_str("IDCR - Lab Report.v1").unwrap();
/// assert_eq!(template_id.as_str(), "IDCR - Lab Report.v1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(String);

impl TemplateId {
    /// Creates a new TemplateId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Template ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the template ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TemplateId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for TemplateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
