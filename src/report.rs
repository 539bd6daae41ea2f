//! Output formatters for conversion reports.
//!
//! Trait-based renderers for a [`ConversionReport`] in human-readable and
//! JSON form. Writing the result anywhere is left to the caller.

use crate::confidence::{ExtractionConfidence, ExtractionQualityMetrics, Severity, ValidationIssue};
use crate::convert::Converted;
use crate::extract::ExtractionResult;
use crate::inject::InjectionSummary;
use crate::pipeline::ConversionReport;
use crate::types::{Note, NoteLevel};

/// Trait for formatting conversion reports.
///
/// Implementors render each section of a report, plus the whole report.
pub trait ReportFormatter {
    /// Format the file header line.
    fn format_header(&self, report: &ConversionReport) -> String;

    /// Format the extraction outcome.
    fn format_extraction(&self, extraction: &ExtractionResult) -> Option<String>;

    /// Format the converted tables.
    fn format_conversions(&self, conversions: &[Converted]) -> Option<String>;

    /// Format the injection outcome.
    fn format_injection(&self, injection: &InjectionSummary) -> Option<String>;

    /// Format the component confidence and quality metrics.
    fn format_confidence(
        &self,
        confidence: &ExtractionConfidence,
        quality: Option<&ExtractionQualityMetrics>,
    ) -> Option<String>;

    /// Format validation issues.
    fn format_issues(&self, issues: &[ValidationIssue]) -> Option<String>;

    /// Format analysis notes.
    fn format_notes(&self, notes: &[Note]) -> Option<String>;

    /// Concatenate every section output in report order.
    fn format_sections(&self, report: &ConversionReport) -> String {
        let mut parts = vec![self.format_header(report)];

        if let Some(extraction) = &report.extraction {
            parts.extend(self.format_extraction(extraction));
        }
        parts.extend(self.format_conversions(&report.conversions));
        parts.extend(self.format_injection(&report.injection));
        if let Some(confidence) = &report.confidence {
            parts.extend(self.format_confidence(confidence, report.quality.as_ref()));
        }
        parts.extend(self.format_issues(&report.issues));
        if let Some(extraction) = &report.extraction {
            parts.extend(self.format_notes(&extraction.notes));
        }

        parts.join("")
    }

    /// Format the complete report.
    ///
    /// Default implementation is [`ReportFormatter::format_sections`].
    fn format_report(&self, report: &ConversionReport) -> String {
        self.format_sections(report)
    }
}

/// Human-readable output formatter.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    /// Show verbose output (factors, info notes)
    pub verbose: bool,
    /// Quiet mode (one line per file)
    pub quiet: bool,
}

impl HumanFormatter {
    /// Create a new human formatter with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a verbose formatter.
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            quiet: false,
        }
    }

    /// Create a quiet formatter.
    pub fn quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
        }
    }
}

impl ReportFormatter for HumanFormatter {
    fn format_header(&self, report: &ConversionReport) -> String {
        let mut s = format!(
            "File: {}\n  Engine:     {}\n  Confidence: {:.1}%\n",
            report.label,
            report.engine,
            report.overall_confidence * 100.0
        );
        if !report.players.is_empty() {
            s.push_str(&format!("  Player:     {}\n", report.players.join(", ")));
        }
        if report.degraded {
            s.push_str(&format!(
                "  Degraded:   template passed through (stage: {})\n",
                report.failed_stage.as_deref().unwrap_or("unknown")
            ));
        }
        s
    }

    fn format_extraction(&self, extraction: &ExtractionResult) -> Option<String> {
        if self.quiet {
            return None;
        }
        let mut s = String::from("  Tables:\n");
        for table in extraction.tables.values() {
            s.push_str(&format!("    {table}\n"));
            if self.verbose {
                s.push_str(&format!("      {}\n", table.reasoning));
            }
        }
        if !extraction.tables_missing.is_empty() {
            s.push_str(&format!(
                "  Missing:    {}\n",
                extraction.tables_missing.join(", ")
            ));
        }
        if let Some(tempo) = &extraction.tempo {
            s.push_str(&format!(
                "  Tempo:      {} at ${:04X}\n",
                tempo.value, tempo.address
            ));
        }
        Some(s)
    }

    fn format_conversions(&self, conversions: &[Converted]) -> Option<String> {
        if conversions.is_empty() || self.quiet {
            return None;
        }
        let mut s = String::from("  Converted:\n");
        for c in conversions {
            s.push_str(&format!(
                "    {:<10} {:>4} bytes  {:.0}%{}\n",
                c.role,
                c.bytes.len(),
                c.confidence * 100.0,
                if c.defaulted { "  (default)" } else { "" }
            ));
        }
        Some(s)
    }

    fn format_injection(&self, injection: &InjectionSummary) -> Option<String> {
        if injection.attempted() == 0 || self.quiet {
            return None;
        }
        let mut s = format!(
            "  Injected:   {}/{}\n",
            injection.succeeded,
            injection.attempted()
        );
        for failure in &injection.failures {
            s.push_str(&format!("    [fail] {failure}\n"));
        }
        Some(s)
    }

    fn format_confidence(
        &self,
        confidence: &ExtractionConfidence,
        quality: Option<&ExtractionQualityMetrics>,
    ) -> Option<String> {
        if !self.verbose {
            return None;
        }
        let mut s: String = confidence
            .format_report()
            .lines()
            .map(|line| format!("  {line}\n"))
            .collect();
        if let Some(q) = quality {
            s.push_str(&format!(
                "  Quality:    {:.2} (completeness {:.2}, consistency {:.2}, integrity {:.2})\n",
                q.overall_quality, q.completeness, q.consistency, q.integrity
            ));
            s.push_str(&format!("  Accuracy:   ~{:.0}%\n", q.accuracy_estimate * 100.0));
        }
        Some(s)
    }

    fn format_issues(&self, issues: &[ValidationIssue]) -> Option<String> {
        if self.quiet {
            return None;
        }
        let to_show: Vec<_> = if self.verbose {
            issues.iter().collect()
        } else {
            issues
                .iter()
                .filter(|i| i.severity <= Severity::Error)
                .collect()
        };
        if to_show.is_empty() {
            return None;
        }
        let mut s = String::new();
        for issue in to_show {
            s.push_str(&format!("  {issue}\n"));
        }
        Some(s)
    }

    fn format_notes(&self, notes: &[Note]) -> Option<String> {
        if notes.is_empty() || self.quiet {
            return None;
        }

        // Only show warnings/errors unless verbose
        let to_show: Vec<_> = if self.verbose {
            notes.iter().collect()
        } else {
            notes
                .iter()
                .filter(|n| n.level != NoteLevel::Info)
                .collect()
        };
        if to_show.is_empty() {
            return None;
        }

        let mut s = String::new();
        for note in to_show {
            let prefix = match note.level {
                NoteLevel::Info => "  [info]",
                NoteLevel::Warning => "  [warn]",
                NoteLevel::Error => "  [error]",
            };
            s.push_str(&format!("{prefix} {}\n", note.message));
        }
        Some(s)
    }

    fn format_report(&self, report: &ConversionReport) -> String {
        if self.quiet {
            return format!(
                "{}: {:.1}%{}\n",
                report.label,
                report.overall_confidence * 100.0,
                if report.degraded { " (degraded)" } else { "" }
            );
        }

        self.format_sections(report) + "\n"
    }
}

/// JSON output formatter.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    /// Pretty-print JSON
    pub pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonFormatter {
    /// Create a new JSON formatter with pretty printing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact JSON formatter.
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl ReportFormatter for JsonFormatter {
    fn format_header(&self, _report: &ConversionReport) -> String {
        String::new()
    }

    fn format_extraction(&self, _extraction: &ExtractionResult) -> Option<String> {
        None
    }

    fn format_conversions(&self, _conversions: &[Converted]) -> Option<String> {
        None
    }

    fn format_injection(&self, _injection: &InjectionSummary) -> Option<String> {
        None
    }

    fn format_confidence(
        &self,
        _confidence: &ExtractionConfidence,
        _quality: Option<&ExtractionQualityMetrics>,
    ) -> Option<String> {
        None
    }

    fn format_issues(&self, _issues: &[ValidationIssue]) -> Option<String> {
        None
    }

    fn format_notes(&self, _notes: &[Note]) -> Option<String> {
        None
    }

    fn format_report(&self, report: &ConversionReport) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        };
        match rendered {
            Ok(json) => json + "\n",
            Err(e) => error_json(&e),
        }
    }
}

/// Fallback document when a report cannot be serialized.
fn error_json(error: &dyn std::fmt::Display) -> String {
    serde_json::json!({ "error": error.to_string() }).to_string() + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    fn report() -> ConversionReport {
        Pipeline::new().run("empty.bin", &[0x60; 0x40], 0x1000, &[0u8; 0x1400])
    }

    #[test]
    fn test_human_formatter() {
        let out = HumanFormatter::new().format_report(&report());
        assert!(out.contains("File: empty.bin"));
        assert!(out.contains("30.0%"));
        assert!(out.contains("Missing:"));
    }

    #[test]
    fn test_quiet_formatter() {
        let out = HumanFormatter::quiet().format_report(&report());
        assert_eq!(out, "empty.bin: 30.0%\n");
    }

    #[test]
    fn test_verbose_shows_confidence() {
        let out = HumanFormatter::verbose().format_report(&report());
        assert!(out.contains("Extraction confidence"));
        assert!(out.contains("Quality:"));
    }

    #[test]
    fn test_json_formatter() {
        let out = JsonFormatter::compact().format_report(&report());
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["label"], "empty.bin");
        assert_eq!(value["overall_confidence"], 0.3);
        assert!(value.get("output").is_none());
    }

    #[test]
    fn test_human_report_is_sections_plus_blank_line() {
        let report = report();
        let formatter = HumanFormatter::new();
        assert_eq!(
            formatter.format_report(&report),
            formatter.format_sections(&report) + "\n"
        );
    }

    #[test]
    fn test_error_json_escapes_message() {
        let out = error_json(&"bad \"key\" at line 1\\n");
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["error"], "bad \"key\" at line 1\\n");
    }
}
