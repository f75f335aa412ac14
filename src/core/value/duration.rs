//! DV_DURATION

use super::quantity::{as_f64, integer, parse_number};
use super::{attributes, get_string, Attributes};
use crate::core::schema::IndexedNode;
use crate::domain::{ConversionError, ConversionResult};
use regex::Regex;
use serde_json::{json, Number, Value};
use std::fmt;
use std::sync::OnceLock;

/// Component attributes, largest unit first
pub const COMPONENTS: [&str; 7] = ["year", "month", "week", "day", "hour", "minute", "second"];

fn duration_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
        )
        .expect("duration pattern is valid")
    })
}

/// An ISO 8601 duration broken into components
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DurationValue {
    pub negative: bool,
    pub years: u64,
    pub months: u64,
    pub weeks: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: f64,
}

impl DurationValue {
    /// Parses `PnYnMnWnDTnHnMnS`
    ///
    /// ```
    /// use meridian::core::value::DurationValue;
    ///
    /// let duration = DurationValue::parse("P1Y2M3DT4H30M").unwrap();
    /// assert_eq!((duration.years, duration.months, duration.days), (1, 2, 3));
    /// assert_eq!(duration.to_string(), "P1Y2M3DT4H30M");
    /// ```
    pub fn parse(text: &str) -> ConversionResult<Self> {
        let text = text.trim();
        let invalid =
            || ConversionError::invalid_attribute("value", format!("'{text}' is not an ISO 8601 duration"));
        let captures = duration_regex().captures(text).ok_or_else(invalid)?;
        if text.ends_with('T') || text == "P" || text == "-P" {
            return Err(invalid());
        }

        let component = |group: usize| -> ConversionResult<u64> {
            match captures.get(group) {
                Some(m) => m.as_str().parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };
        let seconds = match captures.get(8) {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => 0.0,
        };

        Ok(Self {
            negative: captures.get(1).is_some(),
            years: component(2)?,
            months: component(3)?,
            weeks: component(4)?,
            days: component(5)?,
            hours: component(6)?,
            minutes: component(7)?,
            seconds,
        })
    }

    /// Builds a duration from the bare ISO value or from component attributes
    ///
    /// When the node declares component inputs, only those components may be
    /// non-zero; a non-zero excluded component fails with
    /// [`ConversionError::ConstraintViolation`] and a zero one is dropped.
    pub fn from_attributes(node: &IndexedNode, attrs: &Attributes) -> ConversionResult<Self> {
        let supplied: Vec<&str> = COMPONENTS
            .into_iter()
            .filter(|component| attrs.contains_key(*component))
            .collect();

        let duration = match get_string(attrs, "")? {
            Some(_) if !supplied.is_empty() => {
                return Err(ConversionError::invalid_attribute(
                    supplied[0],
                    "cannot be combined with a bare duration value",
                ))
            }
            Some(text) => Self::parse(&text)?,
            None if supplied.is_empty() => {
                return Err(ConversionError::invalid_attribute("", "duration value required"))
            }
            None => {
                let mut duration = Self::default();
                for component in supplied {
                    let number = parse_number(component, &attrs[component])?;
                    if as_f64(&number) < 0.0 {
                        return Err(ConversionError::invalid_attribute(component, "must not be negative"));
                    }
                    duration.set(component, number)?;
                }
                duration
            }
        };

        duration.check_components(&allowed_components(node))?;
        for (component, amount) in duration.components() {
            let range = node
                .input(Some(component))
                .and_then(|input| input.validation.as_ref())
                .and_then(|validation| validation.range.as_ref());
            if let Some(range) = range {
                if !range.contains(amount) {
                    return Err(ConversionError::ConstraintViolation(format!(
                        "duration {component} {amount} is outside {}",
                        range.describe()
                    )));
                }
            }
        }
        Ok(duration)
    }

    fn set(&mut self, component: &str, number: Number) -> ConversionResult<()> {
        if component == "second" {
            self.seconds = as_f64(&number);
            return Ok(());
        }
        let whole = integer(component, number)?
            .as_u64()
            .ok_or_else(|| ConversionError::invalid_attribute(component, "out of range"))?;
        match component {
            "year" => self.years = whole,
            "month" => self.months = whole,
            "week" => self.weeks = whole,
            "day" => self.days = whole,
            "hour" => self.hours = whole,
            "minute" => self.minutes = whole,
            other => return Err(ConversionError::invalid_attribute(other, "not a duration component")),
        }
        Ok(())
    }

    /// Components with their amounts, largest unit first
    pub fn components(&self) -> [(&'static str, f64); 7] {
        [
            ("year", self.years as f64),
            ("month", self.months as f64),
            ("week", self.weeks as f64),
            ("day", self.days as f64),
            ("hour", self.hours as f64),
            ("minute", self.minutes as f64),
            ("second", self.seconds),
        ]
    }

    /// Fails when a non-zero component is outside `allowed`
    ///
    /// An empty `allowed` list places no restriction.
    pub fn check_components(&self, allowed: &[&str]) -> ConversionResult<()> {
        if allowed.is_empty() {
            return Ok(());
        }
        match self
            .components()
            .into_iter()
            .find(|(component, amount)| *amount != 0.0 && !allowed.contains(component))
        {
            Some((component, amount)) => Err(ConversionError::ConstraintViolation(format!(
                "duration component '{component}' ({amount}) is not one of {}",
                allowed.join(", ")
            ))),
            None => Ok(()),
        }
    }

    /// Flat attributes; component form when the node declares components
    ///
    /// Components carry no sign, so a negative duration keeps the bare
    /// ISO 8601 form.
    pub fn attributes(&self, allowed: &[&str]) -> ConversionResult<Attributes> {
        self.check_components(allowed)?;
        if allowed.is_empty() || self.negative {
            return Ok(attributes([("", Some(json!(self.to_string())))]));
        }
        Ok(self
            .components()
            .into_iter()
            .filter(|(component, _)| allowed.contains(component))
            .map(|(component, amount)| {
                let value = if component == "second" && amount.fract() != 0.0 {
                    json!(amount)
                } else {
                    json!(amount as u64)
                };
                (component.to_string(), value)
            })
            .collect())
    }

    pub fn to_rm(&self) -> Value {
        json!({"_type": "DV_DURATION", "value": self.to_string()})
    }

    pub fn from_rm(raw: &Value) -> ConversionResult<Self> {
        Self::parse(super::rm::str_field(raw, "value")?)
    }
}

/// Components a node declares inputs for
pub fn allowed_components(node: &IndexedNode) -> Vec<&'static str> {
    COMPONENTS
        .into_iter()
        .filter(|component| node.input(Some(component)).is_some())
        .collect()
}

impl fmt::Display for DurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        for (amount, designator) in [(self.years, 'Y'), (self.months, 'M'), (self.weeks, 'W'), (self.days, 'D')] {
            if amount > 0 {
                write!(f, "{amount}{designator}")?;
            }
        }
        let has_time = self.hours > 0 || self.minutes > 0 || self.seconds > 0.0;
        let non_zero = has_time || self.years > 0 || self.months > 0 || self.weeks > 0 || self.days > 0;
        if !non_zero {
            return write!(f, "T0S");
        }
        if has_time {
            write!(f, "T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0.0 {
                write!(f, "{}S", self.seconds)?;
            }
        }
        Ok(())
    }
}
