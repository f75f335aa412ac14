//! Numeric values: DV_QUANTITY, DV_COUNT and DV_PROPORTION
//!
//! Numbers travel as [`serde_json::Number`] end to end so integral tokens
//! never pass through `f64` unless the RM attribute is a real.

use super::{attributes, get_string, scalar_string, Attributes};
use crate::core::schema::IndexedNode;
use crate::domain::template::ValidationRange;
use crate::domain::{ConversionError, ConversionResult};
use serde_json::{json, Number, Value};

/// Largest integer an `f64` represents exactly (2^53)
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_992;

/// Parses a JSON number or numeric string
pub fn parse_number(attribute: &str, value: &Value) -> ConversionResult<Number> {
    let invalid = || {
        ConversionError::invalid_attribute(attribute, format!("'{value}' is not a number"))
    };
    match value {
        Value::Number(number) => Ok(number.clone()),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(integer) = text.parse::<i64>() {
                return Ok(Number::from(integer));
            }
            if let Ok(integer) = text.parse::<u64>() {
                return Ok(Number::from(integer));
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

/// Converts a number to the representation of an RM real
///
/// Integral values within ±2^53 become floats (`300` → `300.0`); larger
/// integers stay integral so no digit is lost.
pub fn real(number: Number) -> Number {
    let exact = number
        .as_i64()
        .filter(|i| i.unsigned_abs() <= MAX_SAFE_INTEGER)
        .map(|i| i as f64)
        .or_else(|| {
            number
                .as_u64()
                .filter(|u| *u <= MAX_SAFE_INTEGER)
                .map(|u| u as f64)
        });
    match exact.and_then(Number::from_f64) {
        Some(float) => float,
        None => number,
    }
}

/// Requires an integral number, accepting integral floats within ±2^53
pub fn integer(attribute: &str, number: Number) -> ConversionResult<Number> {
    if number.is_i64() || number.is_u64() {
        return Ok(number);
    }
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float.abs() <= MAX_SAFE_INTEGER as f64 => {
            Ok(Number::from(float as i64))
        }
        _ => Err(ConversionError::invalid_attribute(
            attribute,
            format!("{number} is not an integer"),
        )),
    }
}

/// Lossy view of a number for range checks
pub fn as_f64(number: &Number) -> f64 {
    number.as_f64().unwrap_or(f64::NAN)
}

fn check_range(node: &IndexedNode, suffix: Option<&str>, attribute: &str, number: &Number) -> ConversionResult<()> {
    let range = node
        .input(suffix)
        .and_then(|input| input.validation.as_ref())
        .and_then(|validation| validation.range.as_ref());
    match range {
        Some(range) if !range.contains(as_f64(number)) => Err(ConversionError::ConstraintViolation(
            format!("{attribute} {number} is outside {}", range.describe()),
        )),
        _ => Ok(()),
    }
}

/// Checks a supplied `|precision` against a declared precision range
fn check_precision(declared: Option<&ValidationRange>, precision: Option<i64>) -> ConversionResult<()> {
    match (declared, precision) {
        (Some(range), Some(precision)) if !range.contains(precision as f64) => {
            Err(ConversionError::ConstraintViolation(format!(
                "precision {precision} is outside {}",
                range.describe()
            )))
        }
        _ => Ok(()),
    }
}

fn declared_precision<'a>(node: &'a IndexedNode, suffix: &str) -> Option<&'a ValidationRange> {
    node.input(Some(suffix))
        .and_then(|input| input.validation.as_ref())
        .and_then(|validation| validation.precision.as_ref())
}

fn parse_precision(attrs: &Attributes) -> ConversionResult<Option<i64>> {
    attrs
        .get("precision")
        .filter(|value| !value.is_null())
        .map(|value| {
            integer("precision", parse_number("precision", value)?)?
                .as_i64()
                .ok_or_else(|| ConversionError::invalid_attribute("precision", "out of range"))
        })
        .transpose()
}

fn required_number(attrs: &Attributes, key: &str) -> ConversionResult<Number> {
    let value = attrs
        .get(key)
        .ok_or_else(|| ConversionError::invalid_attribute(key, "required"))?;
    parse_number(key, value)
}

fn raw_number(raw: &Value, field: &str) -> ConversionResult<Number> {
    match raw.get(field) {
        Some(Value::Number(number)) => Ok(number.clone()),
        Some(other) => parse_number(field, other),
        None => Err(ConversionError::invalid_attribute(field, "missing in raw value")),
    }
}

/// DV_QUANTITY
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityValue {
    pub magnitude: Number,
    pub unit: String,
    pub precision: Option<i64>,
}

impl QuantityValue {
    /// Builds a quantity from `|magnitude`, `|unit` and `|precision`
    ///
    /// The unit must be one of the schema's units when any are listed; a
    /// single listed unit is used when none is supplied. Both the magnitude
    /// input range and the chosen unit's range apply.
    pub fn from_attributes(node: &IndexedNode, attrs: &Attributes) -> ConversionResult<Self> {
        let magnitude = real(required_number(attrs, "magnitude")?);
        let unit_input = node.input(Some("unit"));
        let units = unit_input.map(|input| input.list.as_slice()).unwrap_or_default();

        let unit = match get_string(attrs, "unit")? {
            Some(unit) => unit,
            None if units.len() == 1 => units[0].value.clone(),
            None => return Err(ConversionError::invalid_attribute("unit", "required")),
        };

        let precision = parse_precision(attrs)?;

        if !units.is_empty() {
            let item = units.iter().find(|item| item.value == unit).ok_or_else(|| {
                ConversionError::InvalidUnit {
                    unit: unit.clone(),
                    allowed: units
                        .iter()
                        .map(|item| item.value.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                }
            })?;
            if let Some(range) = item.validation.as_ref().and_then(|v| v.range.as_ref()) {
                if !range.contains(as_f64(&magnitude)) {
                    return Err(ConversionError::ConstraintViolation(format!(
                        "magnitude {magnitude} {unit} is outside {}",
                        range.describe()
                    )));
                }
            }
            check_precision(item.validation.as_ref().and_then(|v| v.precision.as_ref()), precision)?;
        }
        check_range(node, Some("magnitude"), "magnitude", &magnitude)?;
        check_precision(declared_precision(node, "magnitude"), precision)?;

        Ok(Self {
            magnitude,
            unit,
            precision,
        })
    }

    pub fn attributes(&self) -> Attributes {
        attributes([
            ("magnitude", Some(Value::Number(self.magnitude.clone()))),
            ("unit", Some(json!(self.unit))),
            ("precision", self.precision.map(|p| json!(p))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        let mut raw = json!({
            "_type": "DV_QUANTITY",
            "magnitude": Value::Number(self.magnitude.clone()),
            "units": self.unit
        });
        if let Some(precision) = self.precision {
            raw["precision"] = json!(precision);
        }
        raw
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        Ok(Self {
            magnitude: raw_number(raw, "magnitude")?,
            unit: super::rm::str_field(raw, "units")?.to_string(),
            precision: raw.get("precision").and_then(Value::as_i64),
        })
    }
}

/// DV_COUNT
#[derive(Debug, Clone, PartialEq)]
pub struct CountValue {
    pub magnitude: Number,
}

impl CountValue {
    pub fn from_attributes(node: &IndexedNode, attrs: &Attributes) -> ConversionResult<Self> {
        let magnitude = integer("magnitude", required_number(attrs, "")?)?;
        check_range(node, None, "magnitude", &magnitude)?;
        Ok(Self { magnitude })
    }

    pub fn attributes(&self) -> Attributes {
        attributes([("", Some(Value::Number(self.magnitude.clone())))])
    }

    pub fn to_rm(&self) -> Value {
        json!({"_type": "DV_COUNT", "magnitude": Value::Number(self.magnitude.clone())})
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        Ok(Self {
            magnitude: integer("magnitude", raw_number(raw, "magnitude")?)?,
        })
    }
}

/// Kind of a DV_PROPORTION
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProportionKind {
    Ratio,
    Unitary,
    Percent,
    Fraction,
    IntegerFraction,
}

impl ProportionKind {
    const ALL: [ProportionKind; 5] = [
        ProportionKind::Ratio,
        ProportionKind::Unitary,
        ProportionKind::Percent,
        ProportionKind::Fraction,
        ProportionKind::IntegerFraction,
    ];

    /// RM code (0..=4)
    pub fn code(self) -> i64 {
        match self {
            ProportionKind::Ratio => 0,
            ProportionKind::Unitary => 1,
            ProportionKind::Percent => 2,
            ProportionKind::Fraction => 3,
            ProportionKind::IntegerFraction => 4,
        }
    }

    /// Web Template name
    pub fn name(self) -> &'static str {
        match self {
            ProportionKind::Ratio => "ratio",
            ProportionKind::Unitary => "unitary",
            ProportionKind::Percent => "percent",
            ProportionKind::Fraction => "fraction",
            ProportionKind::IntegerFraction => "integer_fraction",
        }
    }

    /// Parses a kind from its code or name
    pub fn parse(value: &Value) -> ConversionResult<Self> {
        let text = scalar_string("type", value)?;
        let text = text.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code().to_string() == text || kind.name().eq_ignore_ascii_case(text))
            .ok_or_else(|| {
                ConversionError::invalid_attribute("type", format!("unknown proportion kind '{text}'"))
            })
    }
}

/// DV_PROPORTION
#[derive(Debug, Clone, PartialEq)]
pub struct ProportionValue {
    pub numerator: Number,
    pub denominator: Number,
    pub kind: ProportionKind,
    pub precision: Option<i64>,
}

impl ProportionValue {
    /// Builds a proportion from `|numerator`, `|denominator` and `|type`
    ///
    /// The kind must be one of the node's proportion types; a single declared
    /// type is used when none is supplied. Each kind constrains its operands.
    pub fn from_attributes(node: &IndexedNode, attrs: &Attributes) -> ConversionResult<Self> {
        let allowed: Vec<ProportionKind> = node
            .proportion_types
            .iter()
            .filter_map(|name| ProportionKind::parse(&json!(name)).ok())
            .collect();

        let kind = match attrs.get("type") {
            Some(value) => ProportionKind::parse(value)?,
            None if allowed.len() == 1 => allowed[0],
            None if allowed.is_empty() => ProportionKind::Ratio,
            None => return Err(ConversionError::invalid_attribute("type", "required")),
        };
        if !allowed.is_empty() && !allowed.contains(&kind) {
            return Err(ConversionError::invalid_attribute(
                "type",
                format!(
                    "{} is not allowed, expected one of [{}]",
                    kind.name(),
                    allowed.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        let numerator = required_number(attrs, "numerator")?;
        let denominator = match (attrs.get("denominator"), kind) {
            (Some(value), _) => parse_number("denominator", value)?,
            (None, ProportionKind::Unitary) => Number::from(1),
            (None, ProportionKind::Percent) => Number::from(100),
            (None, _) => return Err(ConversionError::invalid_attribute("denominator", "required")),
        };
        Self::check_kind(kind, &numerator, &denominator)?;

        let precision = parse_precision(attrs)?;
        check_precision(declared_precision(node, "numerator"), precision)?;

        Ok(Self {
            numerator: real(numerator),
            denominator: real(denominator),
            kind,
            precision,
        })
    }

    fn check_kind(kind: ProportionKind, numerator: &Number, denominator: &Number) -> ConversionResult<()> {
        let denominator_value = as_f64(denominator);
        match kind {
            ProportionKind::Unitary if denominator_value != 1.0 => Err(ConversionError::invalid_attribute(
                "denominator",
                "a unitary proportion has denominator 1",
            )),
            ProportionKind::Percent if denominator_value != 100.0 => Err(ConversionError::invalid_attribute(
                "denominator",
                "a percent proportion has denominator 100",
            )),
            ProportionKind::Fraction | ProportionKind::IntegerFraction => {
                for (attribute, number) in [("numerator", numerator), ("denominator", denominator)] {
                    if as_f64(number).fract() != 0.0 {
                        return Err(ConversionError::invalid_attribute(
                            attribute,
                            format!("a {} needs integral operands", kind.name()),
                        ));
                    }
                }
                if denominator_value == 0.0 {
                    return Err(ConversionError::invalid_attribute("denominator", "must not be zero"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn attributes(&self) -> Attributes {
        attributes([
            ("numerator", Some(Value::Number(self.numerator.clone()))),
            ("denominator", Some(Value::Number(self.denominator.clone()))),
            ("type", Some(json!(self.kind.code()))),
            ("precision", self.precision.map(|p| json!(p))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        let mut raw = json!({
            "_type": "DV_PROPORTION",
            "numerator": Value::Number(self.numerator.clone()),
            "denominator": Value::Number(self.denominator.clone()),
            "type": self.kind.code()
        });
        if let Some(precision) = self.precision {
            raw["precision"] = json!(precision);
        }
        raw
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        let kind = raw
            .get("type")
            .ok_or_else(|| ConversionError::invalid_attribute("type", "missing in raw value"))
            .and_then(ProportionKind::parse)?;
        Ok(Self {
            numerator: raw_number(raw, "numerator")?,
            denominator: raw_number(raw, "denominator")?,
            kind,
            precision: raw.get("precision").and_then(Value::as_i64),
        })
    }
}
