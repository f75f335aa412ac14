//! Reference model type tags
//!
//! The closed set of openEHR RM types a Web Template node can carry. Every
//! dispatch on node type in the converter is an exhaustive `match` on
//! [`RmType`], so supporting a new type is a compile-checked change here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// RM type tag of a Web Template node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RmType {
    Composition,
    Section,
    Observation,
    Evaluation,
    Instruction,
    Action,
    AdminEntry,
    Activity,
    History,
    Event,
    PointEvent,
    IntervalEvent,
    ItemTree,
    ItemStructure,
    Cluster,
    Element,
    EventContext,
    IsmTransition,
    CodePhrase,
    PartyProxy,
    PartyIdentified,
    PartySelf,
    DvText,
    DvCodedText,
    DvQuantity,
    DvCount,
    DvProportion,
    DvDuration,
    DvInterval(Box<RmType>),
    DvOrdinal,
    DvDateTime,
    DvDate,
    DvTime,
    DvBoolean,
    DvIdentifier,
    DvMultimedia,
    DvUri,
    DvEhrUri,
    DvParsable,
}

impl RmType {
    /// Type name without generic parameters (`DV_INTERVAL` for intervals)
    pub fn base_name(&self) -> &'static str {
        match self {
            RmType::Composition => "COMPOSITION",
            RmType::Section => "SECTION",
            RmType::Observation => "OBSERVATION",
            RmType::Evaluation => "EVALUATION",
            RmType::Instruction => "INSTRUCTION",
            RmType::Action => "ACTION",
            RmType::AdminEntry => "ADMIN_ENTRY",
            RmType::Activity => "ACTIVITY",
            RmType::History => "HISTORY",
            RmType::Event => "EVENT",
            RmType::PointEvent => "POINT_EVENT",
            RmType::IntervalEvent => "INTERVAL_EVENT",
            RmType::ItemTree => "ITEM_TREE",
            RmType::ItemStructure => "ITEM_STRUCTURE",
            RmType::Cluster => "CLUSTER",
            RmType::Element => "ELEMENT",
            RmType::EventContext => "EVENT_CONTEXT",
            RmType::IsmTransition => "ISM_TRANSITION",
            RmType::CodePhrase => "CODE_PHRASE",
            RmType::PartyProxy => "PARTY_PROXY",
            RmType::PartyIdentified => "PARTY_IDENTIFIED",
            RmType::PartySelf => "PARTY_SELF",
            RmType::DvText => "DV_TEXT",
            RmType::DvCodedText => "DV_CODED_TEXT",
            RmType::DvQuantity => "DV_QUANTITY",
            RmType::DvCount => "DV_COUNT",
            RmType::DvProportion => "DV_PROPORTION",
            RmType::DvDuration => "DV_DURATION",
            RmType::DvInterval(_) => "DV_INTERVAL",
            RmType::DvOrdinal => "DV_ORDINAL",
            RmType::DvDateTime => "DV_DATE_TIME",
            RmType::DvDate => "DV_DATE",
            RmType::DvTime => "DV_TIME",
            RmType::DvBoolean => "DV_BOOLEAN",
            RmType::DvIdentifier => "DV_IDENTIFIER",
            RmType::DvMultimedia => "DV_MULTIMEDIA",
            RmType::DvUri => "DV_URI",
            RmType::DvEhrUri => "DV_EHR_URI",
            RmType::DvParsable => "DV_PARSABLE",
        }
    }

    /// Concrete type written into a new raw object
    pub fn instance_name(&self) -> &'static str {
        match self {
            RmType::Event => "POINT_EVENT",
            RmType::ItemStructure => "ITEM_TREE",
            RmType::PartyProxy => "PARTY_IDENTIFIED",
            other => other.base_name(),
        }
    }

    /// Whether the type is a data value (`DV_*`)
    pub fn is_data_value(&self) -> bool {
        matches!(
            self,
            RmType::DvText
                | RmType::DvCodedText
                | RmType::DvQuantity
                | RmType::DvCount
                | RmType::DvProportion
                | RmType::DvDuration
                | RmType::DvInterval(_)
                | RmType::DvOrdinal
                | RmType::DvDateTime
                | RmType::DvDate
                | RmType::DvTime
                | RmType::DvBoolean
                | RmType::DvIdentifier
                | RmType::DvMultimedia
                | RmType::DvUri
                | RmType::DvEhrUri
                | RmType::DvParsable
        )
    }

    /// Whether the type is a leaf value (data value, code phrase or party)
    pub fn is_leaf(&self) -> bool {
        self.is_data_value() || self.is_party() || *self == RmType::CodePhrase
    }

    /// Whether the type is a PARTY_PROXY descendant
    pub fn is_party(&self) -> bool {
        matches!(
            self,
            RmType::PartyProxy | RmType::PartyIdentified | RmType::PartySelf
        )
    }

    /// Whether the type is a care entry or admin entry
    pub fn is_entry(&self) -> bool {
        matches!(
            self,
            RmType::Observation
                | RmType::Evaluation
                | RmType::Instruction
                | RmType::Action
                | RmType::AdminEntry
        )
    }

    /// Whether the type is an EVENT descendant
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            RmType::Event | RmType::PointEvent | RmType::IntervalEvent
        )
    }

    /// Whether raw objects of this type carry `name` and `archetype_node_id`
    pub fn is_locatable(&self) -> bool {
        matches!(
            self,
            RmType::Composition
                | RmType::Section
                | RmType::Activity
                | RmType::History
                | RmType::ItemTree
                | RmType::ItemStructure
                | RmType::Cluster
                | RmType::Element
        ) || self.is_entry()
            || self.is_event()
    }

    /// Whether a raw object of type `raw` may sit in a slot declared as `self`
    ///
    /// ```
    /// use meridian::domain::RmType;
    ///
    /// assert!(RmType::DvText.accepts("DV_CODED_TEXT"));
    /// assert!(RmType::Event.accepts("POINT_EVENT"));
    /// assert!(!RmType::DvQuantity.accepts("DV_COUNT"));
    /// ```
    pub fn accepts(&self, raw: &str) -> bool {
        if raw == self.base_name() || raw == self.to_string() {
            return true;
        }
        match self {
            RmType::DvText => raw == "DV_CODED_TEXT",
            RmType::Event => raw == "POINT_EVENT" || raw == "INTERVAL_EVENT",
            RmType::ItemStructure => matches!(
                raw,
                "ITEM_TREE" | "ITEM_LIST" | "ITEM_SINGLE" | "ITEM_TABLE"
            ),
            RmType::PartyProxy => matches!(
                raw,
                "PARTY_IDENTIFIED" | "PARTY_SELF" | "PARTY_RELATED"
            ),
            RmType::PartyIdentified => raw == "PARTY_RELATED",
            RmType::DvInterval(_) => raw.starts_with("DV_INTERVAL"),
            _ => false,
        }
    }
}

impl fmt::Display for RmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RmType::DvInterval(inner) => write!(f, "DV_INTERVAL<{inner}>"),
            other => write!(f, "{}", other.base_name()),
        }
    }
}

impl FromStr for RmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s
            .strip_prefix("DV_INTERVAL<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            let inner: RmType = inner.parse()?;
            if !inner.is_data_value() {
                return Err(format!("Interval of non data value type: {inner}"));
            }
            return Ok(RmType::DvInterval(Box::new(inner)));
        }

        let rm_type = match s {
            "COMPOSITION" => RmType::Composition,
            "SECTION" => RmType::Section,
            "OBSERVATION" => RmType::Observation,
            "EVALUATION" => RmType::Evaluation,
            "INSTRUCTION" => RmType::Instruction,
            "ACTION" => RmType::Action,
            "ADMIN_ENTRY" => RmType::AdminEntry,
            "ACTIVITY" => RmType::Activity,
            "HISTORY" => RmType::History,
            "EVENT" => RmType::Event,
            "POINT_EVENT" => RmType::PointEvent,
            "INTERVAL_EVENT" => RmType::IntervalEvent,
            "ITEM_TREE" => RmType::ItemTree,
            "ITEM_STRUCTURE" => RmType::ItemStructure,
            "CLUSTER" => RmType::Cluster,
            "ELEMENT" => RmType::Element,
            "EVENT_CONTEXT" => RmType::EventContext,
            "ISM_TRANSITION" => RmType::IsmTransition,
            "CODE_PHRASE" => RmType::CodePhrase,
            "PARTY_PROXY" => RmType::PartyProxy,
            "PARTY_IDENTIFIED" => RmType::PartyIdentified,
            "PARTY_SELF" => RmType::PartySelf,
            "DV_TEXT" => RmType::DvText,
            "DV_CODED_TEXT" => RmType::DvCodedText,
            "DV_QUANTITY" => RmType::DvQuantity,
            "DV_COUNT" => RmType::DvCount,
            "DV_PROPORTION" => RmType::DvProportion,
            "DV_DURATION" => RmType::DvDuration,
            "DV_ORDINAL" => RmType::DvOrdinal,
            "DV_DATE_TIME" => RmType::DvDateTime,
            "DV_DATE" => RmType::DvDate,
            "DV_TIME" => RmType::DvTime,
            "DV_BOOLEAN" => RmType::DvBoolean,
            "DV_IDENTIFIER" => RmType::DvIdentifier,
            "DV_MULTIMEDIA" => RmType::DvMultimedia,
            "DV_URI" => RmType::DvUri,
            "DV_EHR_URI" => RmType::DvEhrUri,
            "DV_PARSABLE" => RmType::DvParsable,
            other => return Err(format!("Unsupported RM type: {other}")),
        };
        Ok(rm_type)
    }
}

impl TryFrom<String> for RmType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RmType> for String {
    fn from(value: RmType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("COMPOSITION", RmType::Composition)]
    #[test_case("DV_QUANTITY", RmType::DvQuantity)]
    #[test_case("ISM_TRANSITION", RmType::IsmTransition)]
    #[test_case(" DV_CODED_TEXT ", RmType::DvCodedText)]
    fn test_parse_simple(input: &str, expected: RmType) {
        assert_eq!(input.parse::<RmType>().unwrap(), expected);
    }

    #[test]
    fn test_parse_interval() {
        let rm_type: RmType = "DV_INTERVAL<DV_QUANTITY>".parse().unwrap();
        assert_eq!(rm_type, RmType::DvInterval(Box::new(RmType::DvQuantity)));
        assert_eq!(rm_type.to_string(), "DV_INTERVAL<DV_QUANTITY>");
        assert_eq!(rm_type.base_name(), "DV_INTERVAL");
    }

    #[test]
    fn test_parse_unknown_fails() {
        assert!("FEEDER_AUDIT".parse::<RmType>().is_err());
        assert!("DV_INTERVAL<CLUSTER>".parse::<RmType>().is_err());
    }

    #[test]
    fn test_instance_names() {
        assert_eq!(RmType::Event.instance_name(), "POINT_EVENT");
        assert_eq!(RmType::ItemStructure.instance_name(), "ITEM_TREE");
        assert_eq!(RmType::Cluster.instance_name(), "CLUSTER");
    }

    #[test]
    fn test_classification() {
        assert!(RmType::DvOrdinal.is_data_value());
        assert!(RmType::CodePhrase.is_leaf());
        assert!(RmType::PartyProxy.is_leaf());
        assert!(!RmType::Cluster.is_leaf());
        assert!(RmType::AdminEntry.is_entry());
        assert!(RmType::IntervalEvent.is_event());
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&RmType::DvInterval(Box::new(RmType::DvCount))).unwrap();
        assert_eq!(json, "\"DV_INTERVAL<DV_COUNT>\"");
        let back: RmType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RmType::DvInterval(Box::new(RmType::DvCount)));
    }
}
