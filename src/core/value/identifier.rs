//! Identifying values: DV_IDENTIFIER, PARTY_PROXY, DV_URI and DV_EHR_URI

use super::rm::{opt_str_field, party_ref, party_self, read_object_ref, str_field, type_of};
use super::{attributes, get_string, scalar_string, Attributes};
use crate::domain::{ConversionError, ConversionResult};
use serde_json::{json, Value};
use url::Url;

/// Reference type written into the external ref of an identified party
pub const PARTY_REF_TYPE: &str = "PERSON";

/// DV_IDENTIFIER
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierValue {
    pub id: String,
    pub issuer: Option<String>,
    pub assigner: Option<String>,
    pub id_type: Option<String>,
}

impl IdentifierValue {
    pub fn from_attributes(attrs: &Attributes) -> ConversionResult<Self> {
        Ok(Self {
            id: get_string(attrs, "id")?
                .ok_or_else(|| ConversionError::invalid_attribute("id", "required"))?,
            issuer: get_string(attrs, "issuer")?,
            assigner: get_string(attrs, "assigner")?,
            id_type: get_string(attrs, "type")?,
        })
    }

    pub fn attributes(&self) -> Attributes {
        attributes([
            ("id", Some(json!(self.id))),
            ("issuer", self.issuer.as_ref().map(|v| json!(v))),
            ("assigner", self.assigner.as_ref().map(|v| json!(v))),
            ("type", self.id_type.as_ref().map(|v| json!(v))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        let mut raw = json!({"_type": "DV_IDENTIFIER", "id": self.id});
        for (field, value) in [
            ("issuer", &self.issuer),
            ("assigner", &self.assigner),
            ("type", &self.id_type),
        ] {
            if let Some(value) = value {
                raw[field] = json!(value);
            }
        }
        raw
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        Ok(Self {
            id: str_field(raw, "id")?.to_string(),
            issuer: opt_str_field(raw, "issuer").map(str::to_string),
            assigner: opt_str_field(raw, "assigner").map(str::to_string),
            id_type: opt_str_field(raw, "type").map(str::to_string),
        })
    }
}

/// External identifier of a party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyId {
    pub id: String,
    pub scheme: String,
    pub namespace: String,
}

/// PARTY_SELF or PARTY_IDENTIFIED
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyValue {
    /// The subject of the record
    Myself,
    Identified {
        name: Option<String>,
        id: Option<PartyId>,
    },
}

impl PartyValue {
    /// Builds a party from `|name`, `|id`, `|id_scheme` and `|id_namespace`
    ///
    /// Nothing supplied means PARTY_SELF. An id is only accepted together with
    /// its scheme and namespace.
    pub fn from_attributes(attrs: &Attributes) -> ConversionResult<Self> {
        let name = get_string(attrs, "name")?;
        let id = get_string(attrs, "id")?;
        let scheme = get_string(attrs, "id_scheme")?;
        let namespace = get_string(attrs, "id_namespace")?;

        let id = match (id, scheme, namespace) {
            (None, None, None) => None,
            (Some(id), Some(scheme), Some(namespace)) => Some(PartyId {
                id,
                scheme,
                namespace,
            }),
            (None, _, _) => {
                return Err(ConversionError::invalid_attribute(
                    "id",
                    "required when an id scheme or namespace is supplied",
                ))
            }
            (Some(_), None, _) => {
                return Err(ConversionError::invalid_attribute(
                    "id_scheme",
                    "required to identify a party",
                ))
            }
            (Some(_), _, None) => {
                return Err(ConversionError::invalid_attribute(
                    "id_namespace",
                    "required to identify a party",
                ))
            }
        };

        if name.is_none() && id.is_none() {
            return Ok(PartyValue::Myself);
        }
        Ok(PartyValue::Identified { name, id })
    }

    pub fn attributes(&self) -> Attributes {
        match self {
            PartyValue::Myself => Attributes::new(),
            PartyValue::Identified { name, id } => attributes([
                ("name", name.as_ref().map(|v| json!(v))),
                ("id", id.as_ref().map(|id| json!(id.id))),
                ("id_scheme", id.as_ref().map(|id| json!(id.scheme))),
                ("id_namespace", id.as_ref().map(|id| json!(id.namespace))),
            ]),
        }
    }

    pub fn to_rm(&self) -> Value {
        match self {
            PartyValue::Myself => party_self(),
            PartyValue::Identified { name, id } => {
                let mut raw = json!({"_type": "PARTY_IDENTIFIED"});
                if let Some(name) = name {
                    raw["name"] = json!(name);
                }
                if let Some(id) = id {
                    raw["external_ref"] = party_ref(&id.id, &id.scheme, &id.namespace, PARTY_REF_TYPE);
                }
                raw
            }
        }
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        match type_of(raw) {
            Some("PARTY_SELF") => Ok(PartyValue::Myself),
            Some("PARTY_IDENTIFIED" | "PARTY_RELATED") => {
                let id = match raw.get("external_ref") {
                    Some(reference) => {
                        let (id, scheme, namespace, _) = read_object_ref(reference)?;
                        Some(PartyId {
                            id,
                            scheme: scheme.unwrap_or_default(),
                            namespace,
                        })
                    }
                    None => None,
                };
                Ok(PartyValue::Identified {
                    name: opt_str_field(raw, "name").map(str::to_string),
                    id,
                })
            }
            other => Err(ConversionError::invalid_attribute(
                "_type",
                format!("{} is not a party", other.unwrap_or("untyped value")),
            )),
        }
    }
}

/// Validates a DV_URI value
pub fn parse_uri(value: &Value) -> ConversionResult<String> {
    let text = scalar_string("", value)?;
    Url::parse(&text)
        .map_err(|e| ConversionError::invalid_attribute("value", format!("'{text}' is not a URI: {e}")))?;
    Ok(text)
}

/// Validates a DV_EHR_URI value, whose scheme must be `ehr`
pub fn parse_ehr_uri(value: &Value) -> ConversionResult<String> {
    let text = parse_uri(value)?;
    match Url::parse(&text) {
        Ok(url) if url.scheme() == "ehr" => Ok(text),
        _ => Err(ConversionError::invalid_attribute(
            "value",
            format!("'{text}' is not an ehr:// URI"),
        )),
    }
}
