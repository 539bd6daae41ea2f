//! Cross-format table conversion.
//!
//! Reshapes extracted source tables into the destination engine's layouts.
//! Every conversion returns a [`Converted`] carrying its own confidence:
//! direct mappings score high, generated defaults score low.

pub mod commands;
pub mod instruments;
pub mod tables;

use crate::error::{ConvertError, Result};
use crate::types::{hex_bytes, ExtractedTable, Note, TableRole};
use serde::{Deserialize, Serialize};

pub use commands::{decompose, DestCommand};
pub use instruments::{extract_instrument, project_instrument, transpose};

/// Tunable cut-over points and confidences for conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionThresholds {
    /// Sequence conversion confidence before penalties
    pub sequence_confidence: f64,
    /// Confidence lost at 100% unrecognized sequence commands
    pub unknown_penalty: f64,
    /// Instrument conversion confidence
    pub instrument_confidence: f64,
    /// Confidence lost when instruments are truncated
    pub truncation_penalty: f64,
    /// Share of playable wave rows needed to copy a wave table
    pub wave_direct_ratio: f64,
    /// Share of linked rows needed to copy a pulse/filter table
    pub effect_direct_ratio: f64,
    /// Confidence of a copied wave/pulse/filter table
    pub direct_confidence: f64,
    /// Confidence of a generated default table
    pub default_confidence: f64,
    /// Confidence of a command table with 3-byte entries
    pub command_confidence: f64,
    /// Confidence of a command table with any other entry size
    pub command_fallback_confidence: f64,
    /// Wave rows kept
    pub max_wave_rows: usize,
    /// Pulse/filter rows stored per column
    pub max_effect_rows: usize,
    /// Command rows stored per column
    pub command_rows: usize,
}

impl Default for ConversionThresholds {
    fn default() -> Self {
        Self {
            sequence_confidence: 0.90,
            unknown_penalty: 0.3,
            instrument_confidence: 0.85,
            truncation_penalty: 0.1,
            wave_direct_ratio: 0.75,
            effect_direct_ratio: 0.75,
            direct_confidence: 0.6,
            default_confidence: 0.4,
            command_confidence: 0.7,
            command_fallback_confidence: 0.5,
            max_wave_rows: 256,
            max_effect_rows: 128,
            command_rows: 64,
        }
    }
}

/// One converted table, ready for injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Converted {
    /// Role the bytes belong to
    pub role: TableRole,
    /// Destination-format bytes
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Generated from defaults rather than source data
    pub defaulted: bool,
    /// Conversion notes
    pub notes: Vec<Note>,
}

impl Converted {
    /// Create a direct conversion result.
    pub fn new(role: TableRole, bytes: Vec<u8>, confidence: f64) -> Self {
        Self {
            role,
            bytes,
            confidence: confidence.clamp(0.0, 1.0),
            defaulted: false,
            notes: Vec::new(),
        }
    }

    /// Mark the bytes as generated defaults.
    pub fn defaulted(mut self) -> Self {
        self.defaulted = true;
        self
    }

    /// Attach a note, tagged with the role.
    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note.with_context(format!("{} conversion", self.role)));
        self
    }
}

/// Spread `rows` over `width` columns of `pad_to` bytes each.
///
/// Column `k` occupies `[k * pad_to, (k + 1) * pad_to)`. Rows beyond
/// `pad_to` are ignored; missing rows and short rows leave zeros.
pub fn rows_to_columns<T: AsRef<[u8]>>(rows: &[T], width: usize, pad_to: usize) -> Vec<u8> {
    let mut out = vec![0u8; width * pad_to];
    for (i, row) in rows.iter().take(pad_to).enumerate() {
        for (k, &byte) in row.as_ref().iter().take(width).enumerate() {
            out[k * pad_to + i] = byte;
        }
    }
    out
}

/// Converts extracted source tables into destination layouts.
#[derive(Debug, Clone, Default)]
pub struct FormatConverter {
    thresholds: ConversionThresholds,
}

impl FormatConverter {
    /// Create a converter with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom thresholds.
    pub fn with_thresholds(mut self, thresholds: ConversionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Active thresholds.
    pub fn thresholds(&self) -> &ConversionThresholds {
        &self.thresholds
    }

    /// Convert any found table according to its role.
    pub fn convert(&self, table: &ExtractedTable) -> Result<Converted> {
        match table.role {
            TableRole::Sequence => self.convert_sequence(table),
            TableRole::Instrument => self.convert_instruments(table),
            TableRole::Wave => Ok(self.convert_wave(Some(table))),
            TableRole::Pulse => Ok(self.convert_pulse(Some(table))),
            TableRole::Filter => Ok(self.convert_filter(Some(table))),
            TableRole::Command => self.convert_commands(table),
        }
    }

    /// Generated stand-in for a role that was not found, if one exists.
    pub fn default_for(&self, role: TableRole) -> Option<Converted> {
        match role {
            TableRole::Wave => Some(self.convert_wave(None)),
            TableRole::Pulse => Some(self.convert_pulse(None)),
            TableRole::Filter => Some(self.convert_filter(None)),
            _ => None,
        }
    }

    /// Transpose an instrument table into 32 column-major slots.
    pub fn convert_instruments(&self, table: &ExtractedTable) -> Result<Converted> {
        if table.entry_size < instruments::SOURCE_WIDTH {
            return Err(ConvertError::InstrumentTooShort {
                index: 0,
                length: table.entry_size,
            });
        }
        let rows: Vec<&[u8]> = table.entries().collect();
        let bytes = transpose(&rows, instruments::PAD_TO)?;
        let th = &self.thresholds;
        let converted = Converted::new(TableRole::Instrument, bytes, th.instrument_confidence);
        if rows.len() > instruments::PAD_TO {
            let mut converted = converted.with_note(Note::warning(format!(
                "{} instruments truncated to {}",
                rows.len(),
                instruments::PAD_TO
            )));
            converted.confidence = (th.instrument_confidence - th.truncation_penalty).max(0.0);
            Ok(converted)
        } else {
            Ok(converted)
        }
    }

    /// Re-encode a sequence table in destination commands.
    pub fn convert_sequence(&self, table: &ExtractedTable) -> Result<Converted> {
        if table.data.is_empty() {
            return Err(ConvertError::InvalidTable {
                role: table.role.to_string(),
                message: "empty payload".to_string(),
            });
        }
        let (bytes, stats) = commands::convert_sequence_bytes(&table.data);
        let th = &self.thresholds;
        let confidence = th.sequence_confidence - th.unknown_penalty * stats.unknown_ratio();
        let mut converted = Converted::new(TableRole::Sequence, bytes, confidence);
        if stats.dropped > 0 {
            converted = converted.with_note(Note::info(format!(
                "{} pattern flow commands have no destination equivalent",
                stats.dropped
            )));
        }
        if stats.unknown > 0 {
            converted = converted.with_note(Note::warning(format!(
                "{} of {} events passed through unrecognized",
                stats.unknown, stats.events
            )));
        }
        Ok(converted)
    }

    /// Convert or generate the wave table.
    pub fn convert_wave(&self, table: Option<&ExtractedTable>) -> Converted {
        tables::convert_wave(table, &self.thresholds)
    }

    /// Convert or generate the pulse table.
    pub fn convert_pulse(&self, table: Option<&ExtractedTable>) -> Converted {
        tables::convert_effect(TableRole::Pulse, table, &self.thresholds)
    }

    /// Convert or generate the filter table.
    pub fn convert_filter(&self, table: Option<&ExtractedTable>) -> Converted {
        tables::convert_effect(TableRole::Filter, table, &self.thresholds)
    }

    /// Convert the command/arpeggio table.
    pub fn convert_commands(&self, table: &ExtractedTable) -> Result<Converted> {
        tables::convert_commands(table, &self.thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryImage;
    use pretty_assertions::assert_eq;

    fn table(role: TableRole, data: Vec<u8>, entry_size: usize) -> ExtractedTable {
        let count = data.len() / entry_size;
        let image = MemoryImage::new(0x1000, data).unwrap();
        ExtractedTable::carve(&image, role, 0x1000, count, entry_size, 0.9, "test").unwrap()
    }

    #[test]
    fn test_rows_to_columns() {
        let rows = [[1u8, 2], [3, 4], [5, 6]];
        assert_eq!(rows_to_columns(&rows, 2, 4), vec![1, 3, 5, 0, 2, 4, 6, 0]);
        assert_eq!(rows_to_columns(&rows, 2, 2), vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_convert_instruments() {
        let converter = FormatConverter::new();
        let data: Vec<u8> = (0..16).collect();
        let converted = converter
            .convert(&table(TableRole::Instrument, data, 8))
            .unwrap();
        assert_eq!(converted.bytes.len(), 6 * 32);
        assert_eq!(converted.confidence, 0.85);
        assert_eq!(extract_instrument(&converted.bytes, 1, 32), Some([8, 9, 15, 12, 11, 10]));
    }

    #[test]
    fn test_narrow_instruments_are_rejected() {
        let converter = FormatConverter::new();
        let result = converter.convert_instruments(&table(TableRole::Instrument, vec![1; 16], 4));
        assert!(matches!(
            result,
            Err(ConvertError::InstrumentTooShort { length: 4, .. })
        ));
    }

    #[test]
    fn test_sequence_confidence_penalizes_unknown() {
        let converter = FormatConverter::new();
        let clean = converter
            .convert_sequence(&table(TableRole::Sequence, vec![0x30, 0x31, 0x7F, 0x32], 1))
            .unwrap();
        assert_eq!(clean.confidence, 0.9);

        let noisy = converter
            .convert_sequence(&table(TableRole::Sequence, vec![0x30, 0x90, 0x91, 0x7F], 1))
            .unwrap();
        assert!((noisy.confidence - 0.75).abs() < 1e-9);
        assert!(!noisy.notes.is_empty());
    }

    #[test]
    fn test_defaults_only_for_effect_roles() {
        let converter = FormatConverter::new();
        assert!(converter.default_for(TableRole::Wave).is_some());
        assert!(converter.default_for(TableRole::Filter).is_some());
        assert!(converter.default_for(TableRole::Instrument).is_none());
        assert!(converter.default_for(TableRole::Sequence).is_none());
    }
}
