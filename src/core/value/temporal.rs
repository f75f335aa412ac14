//! Temporal and boolean values
//!
//! Dates and times are validated with chrono but kept as the caller wrote
//! them, so offsets and partial precision survive a round trip untouched.

use super::scalar_string;
use crate::domain::{ConversionError, ConversionResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Value};

/// Which temporal RM type a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    DateTime,
    Date,
    Time,
}

impl TemporalKind {
    pub fn rm_type(self) -> &'static str {
        match self {
            TemporalKind::DateTime => "DV_DATE_TIME",
            TemporalKind::Date => "DV_DATE",
            TemporalKind::Time => "DV_TIME",
        }
    }
}

/// DV_DATE_TIME, DV_DATE or DV_TIME
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalValue {
    pub kind: TemporalKind,
    pub value: String,
}

impl TemporalValue {
    /// Validates a temporal value without normalising it
    ///
    /// ```
    /// use meridian::core::value::temporal::{TemporalKind, TemporalValue};
    ///
    /// let value = TemporalValue::parse(TemporalKind::DateTime, "2024-03-01T10:15:00+02:00").unwrap();
    /// assert_eq!(value.value, "2024-03-01T10:15:00+02:00");
    /// assert!(TemporalValue::parse(TemporalKind::Date, "2024-02-30").is_err());
    /// ```
    pub fn parse(kind: TemporalKind, text: &str) -> ConversionResult<Self> {
        let text = text.trim();
        let valid = match kind {
            TemporalKind::DateTime => is_date_time(text),
            TemporalKind::Date => is_date(text),
            TemporalKind::Time => is_time(text),
        };
        if !valid {
            return Err(ConversionError::invalid_attribute(
                "value",
                format!("'{text}' is not a valid {}", kind.rm_type()),
            ));
        }
        Ok(Self {
            kind,
            value: text.to_string(),
        })
    }

    pub fn from_scalar(kind: TemporalKind, value: &Value) -> ConversionResult<Self> {
        Self::parse(kind, &scalar_string("", value)?)
    }

    pub fn to_rm(&self) -> Value {
        json!({"_type": self.kind.rm_type(), "value": self.value})
    }

    pub fn from_rm(kind: TemporalKind, raw: &Value) -> ConversionResult<Self> {
        Self::parse(kind, super::rm::str_field(raw, "value")?)
    }
}

/// Splits a trailing `Z` or `±hh:mm` offset off a time of day
fn split_offset(text: &str) -> (&str, Option<&str>) {
    if let Some(local) = text.strip_suffix('Z') {
        return (local, Some("Z"));
    }
    match text.find(['+', '-']) {
        Some(position) => (&text[..position], Some(&text[position..])),
        None => (text, None),
    }
}

fn is_offset(offset: &str) -> bool {
    if offset == "Z" {
        return true;
    }
    let digits = &offset[1..];
    let digits = digits.replace(':', "");
    digits.len() == 4
        && digits.bytes().all(|b| b.is_ascii_digit())
        && digits[..2].parse::<u32>().is_ok_and(|h| h < 24)
        && digits[2..].parse::<u32>().is_ok_and(|m| m < 60)
}

fn is_date(text: &str) -> bool {
    match text.len() {
        4 => text.bytes().all(|b| b.is_ascii_digit()),
        7 => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").is_ok(),
        _ => NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
    }
}

fn is_time(text: &str) -> bool {
    let (local, offset) = split_offset(text);
    if offset.is_some_and(|offset| !is_offset(offset)) {
        return false;
    }
    match local.len() {
        2 => local.parse::<u32>().is_ok_and(|h| h < 24),
        5 => NaiveTime::parse_from_str(local, "%H:%M").is_ok(),
        _ => NaiveTime::parse_from_str(local, "%H:%M:%S%.f").is_ok(),
    }
}

fn is_date_time(text: &str) -> bool {
    if DateTime::parse_from_rfc3339(text).is_ok() {
        return true;
    }
    if NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok() {
        return true;
    }
    match text.split_once('T') {
        Some((date, time)) => is_date(date) && date.len() == 10 && is_time(time),
        None => false,
    }
}

/// DV_BOOLEAN from a JSON boolean or `"true"`/`"false"`
pub fn parse_boolean(attribute: &str, value: &Value) -> ConversionResult<bool> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) if text.trim().eq_ignore_ascii_case("true") => Ok(true),
        Value::String(text) if text.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(ConversionError::invalid_attribute(
            attribute,
            format!("'{other}' is not a boolean"),
        )),
    }
}
