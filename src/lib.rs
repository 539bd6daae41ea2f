//! Chiptable - Music Player Table Conversion
//!
//! This library converts the data tables of one 8-bit sound-chip player
//! engine into the layout expected by another. It works on raw memory
//! images without symbols: tables are located heuristically, reshaped into
//! the destination format, injected into a stock player template and the
//! result is scored for trustworthiness.
//!
//! # Features
//!
//! - **Player Identification**: byte signatures with wildcards and AND
//!   separators, compatible with existing signature databases
//! - **Memory Analysis**: zero runs, byte-frequency windows, end-marker
//!   bounded blocks and pointer-table patterns
//! - **Table Extraction**: sequence and instrument tables by heuristics, any
//!   role by known player layout
//! - **Format Conversion**: packed command decomposition and row-major to
//!   column-major instrument transposition
//! - **Confidence Scoring**: nine weighted components plus structural
//!   validation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chiptable::{integrate, Pipeline, SignatureDatabase};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = std::fs::read("tune.bin")?;
//!     let template = std::fs::read("driver11.bin")?;
//!
//!     // One call, default settings
//!     let (output, confidence) = integrate(&image, 0x1000, &template);
//!     println!("{} bytes at {:.0}% confidence", output.len(), confidence * 100.0);
//!
//!     // Full report, with player identification
//!     let signatures = SignatureDatabase::from_path("players.txt")?;
//!     let report = Pipeline::new()
//!         .with_signatures(&signatures)
//!         .run("tune.bin", &image, 0x1000, &template);
//!     println!("players: {:?}", report.players);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod confidence;
pub mod convert;
pub mod engines;
pub mod error;
pub mod extract;
pub mod heuristics;
pub mod inject;
pub mod pipeline;
pub mod report;
pub mod signature;
pub mod types;

pub use confidence::{
    ComponentScore, ExtractionConfidence, ExtractionQualityMetrics, ExtractionValidator,
    ValidationIssue,
};
pub use convert::{ConversionThresholds, Converted, FormatConverter};
pub use engines::EngineVariant;
pub use error::{ConvertError, Result};
pub use extract::{extract, ExtractionResult, LayoutRegistry};
pub use inject::{InjectionPoint, InjectionSummary, TableInjector};
#[cfg(feature = "batch")]
pub use pipeline::integrate_batch;
pub use pipeline::{integrate, BatchJob, ConversionReport, Pipeline};
pub use signature::{PlayerSignature, SignatureDatabase, SignaturePattern};
pub use types::{
    ConverterOptions, ExtractedTable, MemoryImage, TableCandidate, TableRole, TuneHeader,
};

/// Identify the players in `buffer` using a database loaded from `path`.
///
/// # Example
///
/// ```rust,no_run
/// let image = std::fs::read("tune.bin")?;
/// let players = chiptable::identify_file("players.txt", &image)?;
/// println!("{players:?}");
/// # Ok::<(), chiptable::ConvertError>(())
/// ```
pub fn identify_file<P: AsRef<std::path::Path>>(path: P, buffer: &[u8]) -> Result<Vec<String>> {
    Ok(SignatureDatabase::from_path(path)?.identify(buffer))
}

/// Convert the memory image of a parsed tune header.
pub fn integrate_tune(header: &TuneHeader, template: &[u8]) -> (Vec<u8>, f64) {
    integrate(&header.data, header.load_address, template)
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get the list of supported destination engines.
pub fn supported_engines() -> Vec<EngineVariant> {
    EngineVariant::ALL.to_vec()
}
