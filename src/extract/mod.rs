//! Table extraction.
//!
//! Turns a memory image into a set of [`ExtractedTable`]s keyed by role.
//! A known player layout is used first when one is supplied; roles it does
//! not cover fall back to the heuristic locators. Not finding a role is
//! recorded in [`ExtractionResult::tables_missing`], never raised as an
//! error.

pub mod instruments;
pub mod layout;
pub mod sequences;

use crate::engines::mos6502;
use crate::heuristics;
use crate::types::{ConverterOptions, ExtractedTable, MemoryImage, Note, TableRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub use layout::{LayoutRegistry, PlayerLayout, TableLayout};

/// Bytes at the start of the image searched for the tempo store.
pub const TEMPO_SCAN_LEN: usize = 256;
/// Accepted tempo values (frames per row).
pub const TEMPO_RANGE: std::ops::RangeInclusive<u8> = 1..=31;

/// Tempo seeded by the player's init code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoSetting {
    /// Address of the `LDA #imm` instruction
    pub address: u16,
    /// Frames per row
    pub value: u8,
    /// Address the value is stored to
    pub target: u16,
}

/// Outcome of one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// True iff at least one table was found
    pub success: bool,
    /// Tables found, keyed by role
    pub tables: BTreeMap<TableRole, ExtractedTable>,
    /// Names of expected roles that were not found
    pub tables_missing: Vec<String>,
    /// Mean confidence over found tables (0.0 when none)
    pub average_confidence: f64,
    /// Tempo detected in the init code
    pub tempo: Option<TempoSetting>,
    /// Player whose layout drove the extraction
    pub player: Option<String>,
    /// Analysis notes
    pub notes: Vec<Note>,
    /// Non-fatal errors met along the way
    pub errors: Vec<String>,
}

impl ExtractionResult {
    /// Table for `role`, if found.
    pub fn table(&self, role: TableRole) -> Option<&ExtractedTable> {
        self.tables.get(&role)
    }

    /// Number of tables found.
    pub fn found(&self) -> usize {
        self.tables.len()
    }

    fn finish(mut self, expected: impl Iterator<Item = TableRole>) -> Self {
        self.tables_missing = expected
            .filter(|role| !self.tables.contains_key(role))
            .map(|role| role.name().to_string())
            .collect();
        self.success = !self.tables.is_empty();
        self.average_confidence = if self.tables.is_empty() {
            0.0
        } else {
            self.tables.values().map(|t| t.confidence).sum::<f64>() / self.tables.len() as f64
        };
        self
    }
}

/// Extract tables using heuristics only.
pub fn extract(image: &MemoryImage, options: &ConverterOptions) -> ExtractionResult {
    extract_with_layout(image, options, None)
}

/// Extract tables, carving the roles listed in `layout` at fixed offsets.
pub fn extract_with_layout(
    image: &MemoryImage,
    options: &ConverterOptions,
    layout: Option<&PlayerLayout>,
) -> ExtractionResult {
    let mut result = ExtractionResult::default();

    if let Some(layout) = layout {
        result.player = Some(layout.player.clone());
        for table in layout.carve(image) {
            debug!(role = %table.role, address = table.address, "carved from layout");
            result.tables.insert(table.role, table);
        }
        let listed = layout.tables.len();
        if result.tables.len() < listed {
            result.errors.push(format!(
                "{} of {} layout tables fall outside the image",
                listed - result.tables.len(),
                listed
            ));
        }
    }

    let analysis = heuristics::analyze(image, options);
    if let Some(boundary) = analysis.boundary {
        result.notes.push(
            Note::info(format!(
                "likely code/data boundary at ${:04X} ({} zero bytes)",
                boundary.address, boundary.run_length
            ))
            .with_context("memory analysis"),
        );
    }
    result.notes.push(Note::info(format!(
        "{} table candidates after dedupe",
        analysis.candidates.len()
    )));

    if !result.tables.contains_key(&TableRole::Sequence) {
        match sequences::find_sequences(image, options.sequence_lookback, options.sequence_group_gap)
        {
            Some(table) => {
                result.tables.insert(TableRole::Sequence, table);
            }
            None => result
                .notes
                .push(Note::warning("no end-marker bounded sequences found").with_context("sequence")),
        }
    }

    if !result.tables.contains_key(&TableRole::Instrument) {
        let exclude: Vec<(usize, usize)> = result
            .tables
            .values()
            .filter_map(|t| {
                let start = image.offset_of(t.address)?;
                Some((start, start + t.size))
            })
            .collect();
        match instruments::find_instruments(
            image,
            options.instrument_threshold,
            options.deep_scan,
            &exclude,
        ) {
            Some(table) => {
                result.tables.insert(TableRole::Instrument, table);
            }
            None => result
                .notes
                .push(Note::warning("no window passed the instrument score").with_context("instrument")),
        }
    }

    result.tempo = detect_tempo(image);
    if result.tempo.is_none() {
        result.notes.push(Note::info("no tempo store in init code"));
    }

    let result = result.finish(options.engine.roles());
    info!(
        found = result.found(),
        missing = result.tables_missing.len(),
        average = result.average_confidence,
        "extraction finished"
    );
    result
}

/// First `LDA #imm; STA abs` in the opening bytes with a tempo-sized value.
pub fn detect_tempo(image: &MemoryImage) -> Option<TempoSetting> {
    let head = &image.bytes()[..image.len().min(TEMPO_SCAN_LEN)];
    mos6502::immediate_stores(head)
        .find(|s| TEMPO_RANGE.contains(&s.value))
        .map(|s| TempoSetting {
            address: image.address_of(s.offset),
            value: s.value,
            target: s.target,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::markers;

    /// Init code with a tempo store, a sequence cluster and an instrument table.
    fn sample_image() -> MemoryImage {
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
        MemoryImage::new(0x1000, data).unwrap()
    }

    #[test]
    fn test_detect_tempo() {
        let tempo = detect_tempo(&sample_image()).unwrap();
        assert_eq!(tempo.address, 0x1010);
        assert_eq!(tempo.value, 6);
        assert_eq!(tempo.target, 0x1400);
    }

    #[test]
    fn test_tempo_out_of_range_is_ignored() {
        let mut data = vec![0xEAu8; 64];
        data[0..5].copy_from_slice(&[0xA9, 0x40, 0x8D, 0x00, 0x14]);
        let image = MemoryImage::new(0x1000, data).unwrap();
        assert!(detect_tempo(&image).is_none());
    }

    #[test]
    fn test_extract_finds_sequences_and_instruments() {
        let result = extract(&sample_image(), &ConverterOptions::new());
        assert!(result.success);
        assert!(result.table(TableRole::Sequence).is_some());
        let instruments = result.table(TableRole::Instrument).unwrap();
        assert_eq!(instruments.entry_size, 8);
        assert!(result.tables_missing.contains(&"wave".to_string()));
        assert!(!result.tables_missing.contains(&"sequence".to_string()));
        assert!(result.average_confidence > 0.7);
    }

    #[test]
    fn test_nothing_found_is_not_an_error() {
        let image = MemoryImage::new(0x1000, vec![0x60; 0x40]).unwrap();
        let result = extract(&image, &ConverterOptions::new());
        assert!(!result.success);
        assert_eq!(result.average_confidence, 0.0);
        assert_eq!(result.tables_missing.len(), 6);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_layout_takes_precedence() {
        let layout = PlayerLayout {
            player: "Alpha".to_string(),
            tables: vec![TableLayout {
                role: TableRole::Wave,
                offset: 0x600,
                entry_count: 16,
                entry_size: 2,
            }],
        };
        let result = extract_with_layout(&sample_image(), &ConverterOptions::new(), Some(&layout));
        assert_eq!(result.player.as_deref(), Some("Alpha"));
        let wave = result.table(TableRole::Wave).unwrap();
        assert_eq!(wave.address, 0x1600);
        assert_eq!(wave.confidence, layout::LAYOUT_CONFIDENCE);
    }
}
