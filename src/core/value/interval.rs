//! DV_INTERVAL
//!
//! Bounds are ordinary data values coerced by the interval's element type;
//! this module only adds the inclusion flags and the bound ordering check.

use super::temporal::parse_boolean;
use super::{attributes, DataValue};
use crate::domain::{ConversionError, ConversionResult, RmType};
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Flag attributes of an interval
pub const INTERVAL_FLAGS: [&str; 4] = [
    "lower_included",
    "upper_included",
    "lower_unbounded",
    "upper_unbounded",
];

/// An interval of ordered data values
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalValue {
    pub lower: Option<Box<DataValue>>,
    pub upper: Option<Box<DataValue>>,
    pub lower_included: bool,
    pub upper_included: bool,
}

impl IntervalValue {
    /// Assembles an interval from coerced bounds and flag attributes
    ///
    /// Included flags default to true for a present bound. A lower bound
    /// above the upper one fails with [`ConversionError::ConstraintViolation`].
    pub fn new(
        flags: &super::Attributes,
        lower: Option<DataValue>,
        upper: Option<DataValue>,
    ) -> ConversionResult<Self> {
        if lower.is_none() && upper.is_none() {
            return Err(ConversionError::invalid_attribute("lower", "an interval needs at least one bound"));
        }
        let flag = |name: &str, default: bool| -> ConversionResult<bool> {
            flags
                .get(name)
                .map(|value| parse_boolean(name, value))
                .unwrap_or(Ok(default))
        };
        let lower_included = flag("lower_included", lower.is_some())?;
        let upper_included = flag("upper_included", upper.is_some())?;
        if flag("lower_unbounded", lower.is_none())? != lower.is_none()
            || flag("upper_unbounded", upper.is_none())? != upper.is_none()
        {
            return Err(ConversionError::invalid_attribute(
                "lower_unbounded",
                "unbounded flags must match the supplied bounds",
            ));
        }

        if let (Some(low), Some(high)) = (&lower, &upper) {
            if compare(low, high) == Some(Ordering::Greater) {
                return Err(ConversionError::ConstraintViolation(
                    "interval lower bound is above its upper bound".to_string(),
                ));
            }
        }

        Ok(Self {
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
            lower_included,
            upper_included,
        })
    }

    /// Flag attributes emitted next to the bounds
    pub fn attributes(&self) -> super::Attributes {
        attributes([
            ("lower_included", self.lower.as_ref().map(|_| json!(self.lower_included))),
            ("upper_included", self.upper.as_ref().map(|_| json!(self.upper_included))),
        ])
    }

    pub fn to_rm(&self) -> Value {
        let mut raw = json!({
            "_type": "DV_INTERVAL",
            "lower_included": self.lower_included,
            "upper_included": self.upper_included,
            "lower_unbounded": self.lower.is_none(),
            "upper_unbounded": self.upper.is_none()
        });
        if let Some(lower) = &self.lower {
            raw["lower"] = lower.to_rm();
        }
        if let Some(upper) = &self.upper {
            raw["upper"] = upper.to_rm();
        }
        raw
    }

    pub fn from_rm(element: &RmType, raw: &Value) -> ConversionResult<Self> {
        let bound = |name: &str| -> ConversionResult<Option<DataValue>> {
            match raw.get(name) {
                Some(Value::Null) | None => Ok(None),
                Some(bound) => DataValue::from_rm(element, bound).map(Some),
            }
        };
        let lower = bound("lower")?;
        let upper = bound("upper")?;
        let included = |name: &str, present: bool| raw.get(name).and_then(Value::as_bool).unwrap_or(present);
        Ok(Self {
            lower_included: included("lower_included", lower.is_some()),
            upper_included: included("upper_included", upper.is_some()),
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
        })
    }
}

/// Orders two values of the same ordered type
///
/// Quantities only compare within one unit; values of different types or
/// unordered types yield `None`.
pub fn compare(left: &DataValue, right: &DataValue) -> Option<Ordering> {
    use super::quantity::as_f64;
    match (left, right) {
        (DataValue::Quantity(a), DataValue::Quantity(b)) if a.unit == b.unit => {
            as_f64(&a.magnitude).partial_cmp(&as_f64(&b.magnitude))
        }
        (DataValue::Count(a), DataValue::Count(b)) => match (a.magnitude.as_i64(), b.magnitude.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => as_f64(&a.magnitude).partial_cmp(&as_f64(&b.magnitude)),
        },
        (DataValue::Ordinal(a), DataValue::Ordinal(b)) => Some(a.ordinal.cmp(&b.ordinal)),
        (DataValue::Proportion(a), DataValue::Proportion(b)) => {
            let ratio = |p: &super::ProportionValue| as_f64(&p.numerator) / as_f64(&p.denominator);
            ratio(a).partial_cmp(&ratio(b))
        }
        (DataValue::Temporal(a), DataValue::Temporal(b)) if a.kind == b.kind && a.value.len() == b.value.len() => {
            Some(a.value.cmp(&b.value))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{CountValue, QuantityValue};
    use serde_json::Number;

    fn count(n: i64) -> DataValue {
        DataValue::Count(CountValue {
            magnitude: Number::from(n),
        })
    }

    #[test]
    fn test_flags_default_to_included() {
        let interval = IntervalValue::new(&super::super::Attributes::new(), Some(count(1)), Some(count(5))).unwrap();
        assert!(interval.lower_included && interval.upper_included);
        let raw = interval.to_rm();
        assert_eq!(raw["lower_unbounded"], false);
        assert_eq!(raw["upper"]["magnitude"], 5);
    }

    #[test]
    fn test_open_upper_bound() {
        let interval = IntervalValue::new(&super::super::Attributes::new(), Some(count(1)), None).unwrap();
        let raw = interval.to_rm();
        assert_eq!(raw["upper_unbounded"], true);
        assert!(raw.get("upper").is_none());
        let back = IntervalValue::from_rm(&RmType::DvCount, &raw).unwrap();
        assert_eq!(back, interval);
    }

    #[test]
    fn test_inverted_bounds() {
        let err = IntervalValue::new(&super::super::Attributes::new(), Some(count(9)), Some(count(2))).unwrap_err();
        assert!(matches!(err, ConversionError::ConstraintViolation(_)));
    }

    #[test]
    fn test_quantities_compare_within_unit() {
        let quantity = |m: f64, unit: &str| {
            DataValue::Quantity(QuantityValue {
                magnitude: Number::from_f64(m).unwrap(),
                unit: unit.to_string(),
                precision: None,
            })
        };
        assert_eq!(compare(&quantity(1.0, "mm"), &quantity(2.0, "mm")), Some(Ordering::Less));
        assert_eq!(compare(&quantity(1.0, "mm"), &quantity(2.0, "cm")), None);
    }
}
