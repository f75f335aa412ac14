//! Validation report structures
//!
//! This module defines the violations the validator collects and the report
//! the CLI prints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reason codes carried by violations
pub mod reason {
    pub const CARDINALITY: &str = "CARDINALITY";
    pub const UNKNOWN_CODE: &str = "UNKNOWN_CODE";
    pub const INVALID_UNIT: &str = "INVALID_UNIT";
    pub const INVALID_ATTRIBUTE: &str = "INVALID_ATTRIBUTE";
    pub const CONSTRAINT_VIOLATION: &str = "CONSTRAINT_VIOLATION";
    pub const INVALID_VALUE: &str = "INVALID_VALUE";
    pub const CHOICE_TYPE: &str = "CHOICE_TYPE";
    pub const MISSING_PARTICIPATION: &str = "MISSING_PARTICIPATION";
    pub const ORDERING: &str = "ORDERING";
    pub const UNKNOWN_TRANSITION: &str = "UNKNOWN_TRANSITION";
    pub const UNEXPECTED_NODE: &str = "UNEXPECTED_NODE";
}

/// One schema violation found in a raw composition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Flat path of the offending node
    pub path: String,

    /// Stable reason code, see [`reason`]
    pub reason_code: String,

    /// Human readable detail
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, reason_code: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason_code: reason_code.to_string(),
            message: message.into(),
        }
    }
}

/// Validation report for one composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// When the validation was performed
    pub validated_at: DateTime<Utc>,

    /// Template the composition was checked against
    pub template_id: String,

    /// Violations in discovery order
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Wraps the violations of one validation run
    pub fn from_violations(template_id: impl Into<String>, violations: Vec<Violation>) -> Self {
        Self {
            validated_at: Utc::now(),
            template_id: template_id.into(),
            violations,
        }
    }

    /// Check if the composition is compliant
    pub fn is_success(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of violations per reason code
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for violation in &self.violations {
            *counts.entry(violation.reason_code.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("📊 Validation Report\n");
        summary.push_str(&format!("  Template: {}\n", self.template_id));
        summary.push_str(&format!("  Validated at: {}\n", self.validated_at));
        summary.push_str(&format!("  Violations: {}\n", self.violations.len()));

        if self.is_success() {
            summary.push_str("  ✅ Composition is compliant\n");
            return summary;
        }

        for (reason_code, count) in self.counts() {
            summary.push_str(&format!("  {reason_code}: {count}\n"));
        }
        summary.push_str("\n❌ Violations:\n");
        for (i, violation) in self.violations.iter().enumerate() {
            summary.push_str(&format!(
                "  {}. [{}] {}\n",
                i + 1,
                violation.reason_code,
                violation.path
            ));
            summary.push_str(&format!("     {}\n", violation.message));
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_success() {
        let report = ValidationReport::from_violations("vital_signs.v1", Vec::new());
        assert!(report.is_success());
        assert!(report.counts().is_empty());
        assert!(report.format_summary().contains("compliant"));
    }

    #[test]
    fn test_counts_by_reason() {
        let report = ValidationReport::from_violations(
            "vital_signs.v1",
            vec![
                Violation::new("vitals/composer", reason::MISSING_PARTICIPATION, "composer is required"),
                Violation::new("vitals/pulse:0", reason::CARDINALITY, "2 occurrences, at most 1 allowed"),
                Violation::new("vitals/pulse:1", reason::CARDINALITY, "2 occurrences, at most 1 allowed"),
            ],
        );

        assert!(!report.is_success());
        assert_eq!(report.counts()["CARDINALITY"], 2);
        assert_eq!(report.counts()["MISSING_PARTICIPATION"], 1);

        let summary = report.format_summary();
        assert!(summary.contains("Violations: 3"));
        assert!(summary.contains("[MISSING_PARTICIPATION] vitals/composer"));
    }

    #[test]
    fn test_violation_serializes_reason_code() {
        let violation = Violation::new("a/b", reason::ORDERING, "out of order");
        let json = serde_json::to_value(&violation).unwrap();
        assert_eq!(json["reasonCode"], "ORDERING");
        assert_eq!(json["path"], "a/b");
    }
}
