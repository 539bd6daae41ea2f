//! Structural validation of an extracted table set.
//!
//! Three scores in [0, 1]: completeness (expected roles present),
//! consistency (tables agree with each other and with their declared
//! layout) and integrity (tables sit inside the address space and hold
//! data). Every defect found is also reported as a [`ValidationIssue`].

use crate::types::{ranges_overlap, ExtractedTable, MemoryImage, TableRole, ADDRESS_SPACE_END};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The table set cannot be trusted as a whole
    Critical,
    /// A table is malformed
    Error,
    /// Suspicious but usable
    Warning,
    /// Informational
    Info,
}

impl Severity {
    /// Score deducted from the issue's category.
    pub fn penalty(self) -> f64 {
        match self {
            Severity::Critical => 0.5,
            Severity::Error => 0.25,
            Severity::Warning => 0.1,
            Severity::Info => 0.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        f.write_str(s)
    }
}

/// Which quality score an issue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    /// Expected tables missing
    Completeness,
    /// Tables disagree with each other or their layout
    Consistency,
    /// Tables fall outside memory or hold no data
    Integrity,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Severity
    pub severity: Severity,
    /// Category
    pub category: IssueCategory,
    /// Tables involved, as `role@$addr`
    pub tables: Vec<String>,
    /// Description
    pub message: String,
}

impl ValidationIssue {
    fn new(
        severity: Severity,
        category: IssueCategory,
        tables: &[&ExtractedTable],
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            tables: tables.iter().map(|t| label(t)).collect(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if !self.tables.is_empty() {
            write!(f, " ({})", self.tables.join(", "))?;
        }
        Ok(())
    }
}

fn label(table: &ExtractedTable) -> String {
    format!("{}@${:04X}", table.role, table.address)
}

/// Quality scores of one table set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionQualityMetrics {
    /// Share of expected roles found
    pub completeness: f64,
    /// 1.0 minus consistency penalties
    pub consistency: f64,
    /// 1.0 minus integrity penalties
    pub integrity: f64,
    /// `0.4 * completeness + 0.3 * consistency + 0.3 * integrity`
    pub overall_quality: f64,
    /// `overall_quality` scaled by average table confidence
    pub accuracy_estimate: f64,
}

/// Validates a table set against a memory image.
#[derive(Debug, Clone)]
pub struct ExtractionValidator {
    expected: Vec<TableRole>,
}

impl Default for ExtractionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionValidator {
    /// Expect every table role.
    pub fn new() -> Self {
        Self {
            expected: TableRole::ALL.to_vec(),
        }
    }

    /// Expect only `roles`.
    pub fn with_expected(mut self, roles: impl IntoIterator<Item = TableRole>) -> Self {
        self.expected = roles.into_iter().collect();
        self
    }

    /// Validate `tables` extracted from `image`.
    pub fn validate(
        &self,
        tables: &[ExtractedTable],
        image: &MemoryImage,
    ) -> (ExtractionQualityMetrics, Vec<ValidationIssue>) {
        let mut issues = Vec::new();

        let mut found = 0u32;
        for role in &self.expected {
            if tables.iter().any(|t| t.role == *role) {
                found += 1;
            } else {
                issues.push(ValidationIssue::new(
                    Severity::Warning,
                    IssueCategory::Completeness,
                    &[],
                    format!("expected {role} table not found"),
                ));
            }
        }
        let completeness = if self.expected.is_empty() {
            1.0
        } else {
            f64::from(found) / self.expected.len() as f64
        };

        for (i, a) in tables.iter().enumerate() {
            for b in &tables[i + 1..] {
                if ranges_overlap(u32::from(a.address), a.end(), u32::from(b.address), b.end()) {
                    issues.push(ValidationIssue::new(
                        Severity::Critical,
                        IssueCategory::Consistency,
                        &[a, b],
                        "tables overlap",
                    ));
                }
            }
        }

        for t in tables {
            check_layout(t, &mut issues);
            check_integrity(t, image, &mut issues);
        }

        let consistency = category_score(&issues, IssueCategory::Consistency);
        let integrity = category_score(&issues, IssueCategory::Integrity);
        let overall_quality = 0.4 * completeness + 0.3 * consistency + 0.3 * integrity;
        let average_confidence = if tables.is_empty() {
            0.0
        } else {
            tables.iter().map(|t| t.confidence).sum::<f64>() / tables.len() as f64
        };

        let metrics = ExtractionQualityMetrics {
            completeness,
            consistency,
            integrity,
            overall_quality,
            accuracy_estimate: overall_quality * average_confidence,
        };
        (metrics, issues)
    }
}

fn check_layout(t: &ExtractedTable, issues: &mut Vec<ValidationIssue>) {
    if t.entry_count.checked_mul(t.entry_size) != Some(t.size) {
        issues.push(ValidationIssue::new(
            Severity::Warning,
            IssueCategory::Consistency,
            &[t],
            format!(
                "size {} does not match {} x {} entries",
                t.size, t.entry_count, t.entry_size
            ),
        ));
    }
    if t.data.len() != t.size {
        issues.push(ValidationIssue::new(
            Severity::Error,
            IssueCategory::Consistency,
            &[t],
            format!("payload holds {} bytes, size says {}", t.data.len(), t.size),
        ));
    }
}

fn check_integrity(t: &ExtractedTable, image: &MemoryImage, issues: &mut Vec<ValidationIssue>) {
    if t.size == 0 {
        issues.push(ValidationIssue::new(
            Severity::Error,
            IssueCategory::Integrity,
            &[t],
            "table is empty",
        ));
        return;
    }
    let last = t.end() - 1;
    if last > ADDRESS_SPACE_END {
        issues.push(ValidationIssue::new(
            Severity::Error,
            IssueCategory::Integrity,
            &[t],
            format!("table runs past ${ADDRESS_SPACE_END:04X}"),
        ));
    } else if !image.contains(t.address) || !image.contains(last as u16) {
        issues.push(ValidationIssue::new(
            Severity::Error,
            IssueCategory::Integrity,
            &[t],
            format!(
                "table lies outside the image ${:04X}-${:04X}",
                image.load_address(),
                image.end_address()
            ),
        ));
    }
    if t.data.iter().all(|&b| b == 0) {
        issues.push(ValidationIssue::new(
            Severity::Warning,
            IssueCategory::Integrity,
            &[t],
            "table holds only zero bytes",
        ));
    }
}

fn category_score(issues: &[ValidationIssue], category: IssueCategory) -> f64 {
    let penalty: f64 = issues
        .iter()
        .filter(|i| i.category == category)
        .map(|i| i.severity.penalty())
        .sum();
    (1.0 - penalty).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn image() -> MemoryImage {
        MemoryImage::new(0x1000, vec![0x11; 0x200]).unwrap()
    }

    fn table(role: TableRole, address: u16, size: usize) -> ExtractedTable {
        ExtractedTable::carve(&image(), role, address, size, 1, 0.8, "test").unwrap()
    }

    #[test]
    fn test_exactly_one_critical_overlap() {
        let tables = vec![
            table(TableRole::Sequence, 0x1000, 256),
            table(TableRole::Instrument, 0x1100, 128),
            table(TableRole::Wave, 0x1150, 64),
        ];
        let (metrics, issues) = ExtractionValidator::new().validate(&tables, &image());
        let critical: Vec<&ValidationIssue> = issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(
            critical[0].tables,
            vec!["instrument@$1100".to_string(), "wave@$1150".to_string()]
        );
        assert_eq!(metrics.consistency, 0.5);
        assert_eq!(metrics.integrity, 1.0);
        assert_eq!(metrics.completeness, 0.5);
    }

    #[test]
    fn test_quality_formula() {
        let tables = vec![table(TableRole::Sequence, 0x1000, 16)];
        let validator = ExtractionValidator::new().with_expected([TableRole::Sequence]);
        let (metrics, issues) = validator.validate(&tables, &image());
        assert!(issues.is_empty());
        assert_eq!(metrics.overall_quality, 1.0);
        assert!((metrics.accuracy_estimate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_integrity_checks() {
        let mut outside = table(TableRole::Wave, 0x1000, 16);
        outside.address = 0x3000;
        let mut zeros = table(TableRole::Pulse, 0x1100, 16);
        zeros.data = vec![0; 16];
        let mut wrapped = table(TableRole::Filter, 0x1000, 16);
        wrapped.address = 0xFFF8;

        let validator = ExtractionValidator::new().with_expected([]);
        let (metrics, issues) = validator.validate(&[outside, zeros, wrapped], &image());
        let integrity: Vec<&ValidationIssue> = issues
            .iter()
            .filter(|i| i.category == IssueCategory::Integrity)
            .collect();
        assert_eq!(integrity.len(), 3);
        assert!(integrity.iter().any(|i| i.message.contains("$FFFF")));
        assert!(integrity.iter().any(|i| i.message.contains("zero")));
        assert!((metrics.integrity - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_layout_mismatch() {
        let mut t = table(TableRole::Instrument, 0x1000, 16);
        t.entry_size = 8;
        t.entry_count = 4;
        t.data.truncate(8);
        let validator = ExtractionValidator::new().with_expected([]);
        let (metrics, issues) = validator.validate(&[t], &image());
        assert_eq!(issues.len(), 2);
        assert!((metrics.consistency - 0.65).abs() < 1e-9);
    }
}
