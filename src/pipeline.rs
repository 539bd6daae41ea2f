//! End-to-end conversion: analyze, extract, convert, inject, score.
//!
//! [`Pipeline::run`] never fails. A run that finds nothing passes the
//! template through at confidence 0.3; a run that hits an internal fault
//! passes it through at 0.1 and logs the file and stage.

use crate::confidence::{
    ExtractionConfidence, ExtractionQualityMetrics, ExtractionValidator, ValidationIssue,
};
use crate::convert::{ConversionThresholds, Converted, FormatConverter};
use crate::engines::EngineVariant;
use crate::error::{ConvertError, Result, ResultExt};
use crate::extract::{self, ExtractionResult, LayoutRegistry};
use crate::inject::{InjectionSummary, TableInjector};
use crate::signature::SignatureDatabase;
use crate::types::{ConverterOptions, ExtractedTable, MemoryImage, TableRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};

/// Confidence of a run that found no tables.
pub const NOTHING_FOUND_CONFIDENCE: f64 = 0.3;
/// Confidence of a run that hit an internal fault.
pub const FAULT_CONFIDENCE: f64 = 0.1;

/// Weight of the average extraction confidence.
const EXTRACTION_WEIGHT: f64 = 0.4;
/// Weight of the average conversion confidence.
const CONVERSION_WEIGHT: f64 = 0.3;
/// Weight of the injected/attempted ratio.
const INJECTION_WEIGHT: f64 = 0.3;

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    /// File identity supplied by the caller
    pub label: String,
    /// Destination engine
    pub engine: EngineVariant,
    /// Destination bytes
    #[serde(skip)]
    pub output: Vec<u8>,
    /// Overall confidence (0.0 - 1.0)
    pub overall_confidence: f64,
    /// Players identified by signature
    pub players: Vec<String>,
    /// Extraction outcome
    pub extraction: Option<ExtractionResult>,
    /// Converted tables, in injection order
    pub conversions: Vec<Converted>,
    /// Roles whose conversion was rejected, with the reason
    pub conversion_errors: Vec<String>,
    /// Injection outcome
    pub injection: InjectionSummary,
    /// Component confidence
    pub confidence: Option<ExtractionConfidence>,
    /// Structural quality
    pub quality: Option<ExtractionQualityMetrics>,
    /// Validation findings
    pub issues: Vec<ValidationIssue>,
    /// The template was passed through because of a fault
    pub degraded: bool,
    /// Stage that faulted
    pub failed_stage: Option<String>,
}

impl ConversionReport {
    fn passthrough(label: &str, engine: EngineVariant, template: &[u8], confidence: f64) -> Self {
        Self {
            label: label.to_string(),
            engine,
            output: template.to_vec(),
            overall_confidence: confidence,
            players: Vec::new(),
            extraction: None,
            conversions: Vec::new(),
            conversion_errors: Vec::new(),
            injection: InjectionSummary::default(),
            confidence: None,
            quality: None,
            issues: Vec::new(),
            degraded: false,
            failed_stage: None,
        }
    }

    /// Tables written into the output.
    pub fn tables_injected(&self) -> usize {
        self.injection.succeeded
    }
}

/// Configured conversion pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline<'a> {
    signatures: Option<&'a SignatureDatabase>,
    layouts: Option<&'a LayoutRegistry>,
    options: ConverterOptions,
    converter: FormatConverter,
}

impl<'a> Pipeline<'a> {
    /// Pipeline with default options, no signatures and no layouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identify players with `signatures`.
    pub fn with_signatures(mut self, signatures: &'a SignatureDatabase) -> Self {
        self.signatures = Some(signatures);
        self
    }

    /// Use known layouts for identified players.
    pub fn with_layouts(mut self, layouts: &'a LayoutRegistry) -> Self {
        self.layouts = Some(layouts);
        self
    }

    /// Select the destination engine.
    pub fn with_engine(mut self, engine: EngineVariant) -> Self {
        self.options.engine = engine;
        self
    }

    /// Replace the analysis options (engine included).
    pub fn with_options(mut self, options: ConverterOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the conversion thresholds.
    pub fn with_thresholds(mut self, thresholds: ConversionThresholds) -> Self {
        self.converter = self.converter.with_thresholds(thresholds);
        self
    }

    /// Active options.
    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Convert one memory image into `template`.
    pub fn run(
        &self,
        label: &str,
        image: &[u8],
        load_address: u16,
        template: &[u8],
    ) -> ConversionReport {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.try_run(label, image, load_address, template)
        }));
        let (stage, message) = match outcome {
            Ok(Ok(report)) => return report,
            Ok(Err(ConvertError::Pipeline { stage, message })) => (stage, message),
            Ok(Err(other)) => ("unknown".to_string(), other.to_string()),
            Err(payload) => ("panic".to_string(), panic_message(payload.as_ref())),
        };
        error!(file = label, stage = %stage, error = %message, "conversion degraded to passthrough");
        let mut report =
            ConversionReport::passthrough(label, self.options.engine, template, FAULT_CONFIDENCE);
        report.degraded = true;
        report.failed_stage = Some(stage);
        report
    }

    fn try_run(
        &self,
        label: &str,
        bytes: &[u8],
        load_address: u16,
        template: &[u8],
    ) -> Result<ConversionReport> {
        let engine = self.options.engine;
        let image = MemoryImage::new(load_address, bytes.to_vec()).stage("load")?;

        let players = self
            .signatures
            .map(|db| db.identify(image.bytes()))
            .unwrap_or_default();
        let layout = self.layouts.and_then(|r| r.layout_for(players.as_slice()));
        let extraction = extract::extract_with_layout(&image, &self.options, layout);

        let tables: Vec<ExtractedTable> = extraction.tables.values().cloned().collect();
        let confidence = ExtractionConfidence::from_extraction(&extraction);
        let (quality, issues) = ExtractionValidator::new()
            .with_expected(engine.roles())
            .validate(&tables, &image);

        let mut report =
            ConversionReport::passthrough(label, engine, template, NOTHING_FOUND_CONFIDENCE);
        report.players = players;
        report.confidence = Some(confidence);
        report.quality = Some(quality);
        report.issues = issues;

        if !extraction.success {
            info!(file = label, "no tables found, template passed through");
            report.extraction = Some(extraction);
            return Ok(report);
        }

        let mut conversions = Vec::new();
        for table in extraction.tables.values() {
            match self.converter.convert(table) {
                Ok(converted) => conversions.push(converted),
                Err(err) => {
                    warn!(file = label, role = %table.role, error = %err, "conversion rejected");
                    report.conversion_errors.push(format!("{}: {err}", table.role));
                }
            }
        }
        for role in [TableRole::Wave, TableRole::Pulse, TableRole::Filter] {
            if !extraction.tables.contains_key(&role) && engine.offset(role).is_some() {
                conversions.extend(self.converter.default_for(role));
            }
        }

        let payloads: BTreeMap<TableRole, Vec<u8>> = conversions
            .iter()
            .map(|c| (c.role, c.bytes.clone()))
            .collect();
        let mut injector = TableInjector::new(template.to_vec(), engine);
        let injection = injector.inject_multiple(&payloads);

        let attempted = injection.attempted() + report.conversion_errors.len();
        let injected_ratio = if attempted == 0 {
            0.0
        } else {
            injection.succeeded as f64 / attempted as f64
        };
        let conversion_avg = if conversions.is_empty() {
            0.0
        } else {
            conversions.iter().map(|c| c.confidence).sum::<f64>() / conversions.len() as f64
        };
        let overall = EXTRACTION_WEIGHT * extraction.average_confidence
            + CONVERSION_WEIGHT * conversion_avg
            + INJECTION_WEIGHT * injected_ratio;

        info!(
            file = label,
            injected = injection.succeeded,
            attempted,
            overall,
            "conversion finished"
        );

        report.output = injector.into_bytes();
        report.overall_confidence = overall.clamp(0.0, 1.0);
        report.extraction = Some(extraction);
        report.conversions = conversions;
        report.injection = injection;
        Ok(report)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Convert `image` into `template` with default settings.
///
/// Returns the destination bytes and the overall confidence.
pub fn integrate(image: &[u8], load_address: u16, template: &[u8]) -> (Vec<u8>, f64) {
    let report = Pipeline::new().run("<memory>", image, load_address, template);
    (report.output, report.overall_confidence)
}

/// One input of a batch run.
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// File identity used in logs and reports
    pub label: String,
    /// Memory image bytes
    pub image: Vec<u8>,
    /// Load address of the image
    pub load_address: u16,
}

#[cfg(feature = "batch")]
impl Pipeline<'_> {
    /// Run independent jobs on the rayon pool, preserving input order.
    pub fn run_batch(&self, jobs: &[BatchJob], template: &[u8]) -> Vec<ConversionReport> {
        use rayon::prelude::*;

        jobs.par_iter()
            .map(|job| self.run(&job.label, &job.image, job.load_address, template))
            .collect()
    }
}

/// Batch form of [`integrate`].
#[cfg(feature = "batch")]
pub fn integrate_batch(jobs: &[BatchJob], template: &[u8]) -> Vec<(Vec<u8>, f64)> {
    Pipeline::new()
        .run_batch(jobs, template)
        .into_iter()
        .map(|r| (r.output, r.overall_confidence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::markers;
    use crate::extract::{PlayerLayout, TableLayout};

    const TEMPLATE_LEN: usize = 0x1400;

    fn template() -> Vec<u8> {
        vec![0xEE; TEMPLATE_LEN]
    }

    fn sample_image() -> Vec<u8> {
        let mut data: Vec<u8> = (0..0x800usize)
            .map(|i| (i as u8).wrapping_mul(37).wrapping_add(1) | 0x80)
            .collect();
        data[0x10..0x15].copy_from_slice(&[0xA9, 0x06, 0x8D, 0x00, 0x14]);
        for s in 0..6 {
            let base = 0x200 + s * 12;
            data[base] = 0x00;
            for j in 1..11 {
                data[base + j] = (s * 10 + j) as u8;
            }
            data[base + 11] = markers::END;
        }
        for i in 0..32 {
            let e = [0x09, 0xA0, 0x01, 0x02, 0x03, 0x11, 0x05, 0x41];
            data[0x400 + i * 8..0x400 + i * 8 + 8].copy_from_slice(&e);
        }
        data
    }

    #[test]
    fn test_nothing_found_passes_template_through() {
        let (out, confidence) = integrate(&[0x60; 0x40], 0x1000, &template());
        assert_eq!(out, template());
        assert_eq!(confidence, NOTHING_FOUND_CONFIDENCE);
    }

    #[test]
    fn test_fault_degrades_to_passthrough() {
        let report = Pipeline::new().run("bad.bin", &[0x01; 0x200], 0xFF00, &template());
        assert!(report.degraded);
        assert_eq!(report.failed_stage.as_deref(), Some("load"));
        assert_eq!(report.overall_confidence, FAULT_CONFIDENCE);
        assert_eq!(report.output, template());
    }

    #[test]
    fn test_full_run_injects_tables() {
        let report = Pipeline::new().run("tune.bin", &sample_image(), 0x1000, &template());
        assert!(!report.degraded);
        let extraction = report.extraction.as_ref().unwrap();
        assert!(extraction.success);
        // sequence + instruments + default wave/pulse/filter
        assert_eq!(report.conversions.len(), 5);
        assert_eq!(report.injection.succeeded, 5);
        assert_ne!(report.output, template());
        assert_eq!(report.output.len(), TEMPLATE_LEN);
        assert!(report.overall_confidence > 0.5 && report.overall_confidence <= 1.0);

        let expected = 0.4 * extraction.average_confidence
            + 0.3 * report.conversions.iter().map(|c| c.confidence).sum::<f64>() / 5.0
            + 0.3;
        assert!((report.overall_confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_small_template_counts_failed_injections() {
        let report = Pipeline::new().run("tune.bin", &sample_image(), 0x1000, &[0u8; 0x0C00]);
        assert!(!report.degraded);
        assert!(report.injection.failed > 0);
        assert!(report.overall_confidence < 0.9);
    }

    #[test]
    fn test_signature_and_layout_drive_extraction() {
        let db = SignatureDatabase::parse("Alpha A9 06 8D end").unwrap();
        let layouts = LayoutRegistry {
            players: vec![PlayerLayout {
                player: "Alpha".to_string(),
                tables: vec![TableLayout {
                    role: TableRole::Pulse,
                    offset: 0x600,
                    entry_count: 4,
                    entry_size: 4,
                }],
            }],
        };
        let mut image = sample_image();
        image[0x600..0x610].copy_from_slice(&[
            0x08, 0x00, 0x10, 0x01, 0x09, 0x00, 0x10, 0x02, 0x0A, 0x00, 0x10, 0x03, 0x0B, 0x00,
            0x10, 0x7F,
        ]);
        let report = Pipeline::new()
            .with_signatures(&db)
            .with_layouts(&layouts)
            .run("tune.bin", &image, 0x1000, &template());
        assert_eq!(report.players, vec!["Alpha".to_string()]);
        let pulse = report
            .conversions
            .iter()
            .find(|c| c.role == TableRole::Pulse)
            .unwrap();
        assert!(!pulse.defaulted);
    }

    #[test]
    fn test_driver12_rejects_command_table() {
        let layouts = LayoutRegistry {
            players: vec![PlayerLayout {
                player: "Alpha".to_string(),
                tables: vec![TableLayout {
                    role: TableRole::Command,
                    offset: 0x700,
                    entry_count: 4,
                    entry_size: 3,
                }],
            }],
        };
        let db = SignatureDatabase::parse("Alpha A9 06 8D end").unwrap();
        let report = Pipeline::new()
            .with_signatures(&db)
            .with_layouts(&layouts)
            .with_engine(EngineVariant::Driver12)
            .run("tune.bin", &sample_image(), 0x1000, &template());
        assert_eq!(report.injection.failed, 1);
        assert_eq!(report.injection.failures[0].role, TableRole::Command);
    }

    #[cfg(feature = "batch")]
    #[test]
    fn test_batch_preserves_order() {
        let jobs = vec![
            BatchJob {
                label: "a".to_string(),
                image: sample_image(),
                load_address: 0x1000,
            },
            BatchJob {
                label: "b".to_string(),
                image: vec![0x60; 0x40],
                load_address: 0x1000,
            },
        ];
        let results = integrate_batch(&jobs, &template());
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].1, NOTHING_FOUND_CONFIDENCE);
    }
}
