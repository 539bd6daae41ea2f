//! Effect and command table conversion.
//!
//! Wave, pulse and filter programs are copied across when enough of their
//! rows look well formed, and replaced by generated defaults otherwise. The
//! cut-over points live in [`ConversionThresholds`].

use super::instruments::default_wave_table;
use super::{rows_to_columns, ConversionThresholds, Converted};
use crate::engines::markers;
use crate::engines::sid::Waveform;
use crate::error::{ConvertError, Result};
use crate::types::{ExtractedTable, Note, TableRole};

/// Bytes per wave program row.
pub const WAVE_ROW: usize = 2;
/// Bytes per pulse/filter program row.
pub const EFFECT_ROW: usize = 4;
/// Bytes per command table row.
pub const COMMAND_ROW: usize = 3;

/// Default pulse program: hold a 50% duty cycle.
pub const DEFAULT_PULSE: [[u8; EFFECT_ROW]; 1] = [[0x08, 0x00, 0x00, 0x00]];
/// Default filter program: filter off.
pub const DEFAULT_FILTER: [[u8; EFFECT_ROW]; 1] = [[0x00, 0x00, 0x00, 0x00]];

/// Whether a wave row starts with a playable control byte or a jump.
pub fn wave_row_valid(row: &[u8]) -> bool {
    match row.first() {
        Some(&b) => markers::is_block_marker(b) || Waveform::is_plausible(b),
        None => false,
    }
}

/// Whether a pulse/filter row links to a row inside the program.
pub fn effect_link_valid(row: &[u8], rows: usize) -> bool {
    row.len() == EFFECT_ROW && (row[3] == markers::END || usize::from(row[3]) < rows)
}

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn default_wave(th: &ConversionThresholds, note: Note) -> Converted {
    Converted::new(TableRole::Wave, default_wave_table(), th.default_confidence)
        .defaulted()
        .with_note(note)
}

/// Convert a wave table, or generate the default programs.
pub fn convert_wave(table: Option<&ExtractedTable>, th: &ConversionThresholds) -> Converted {
    let Some(table) = table else {
        return default_wave(th, Note::info("no wave table found, default programs generated"));
    };
    if table.entry_size != WAVE_ROW {
        return default_wave(
            th,
            Note::warning(format!("wave rows are {} bytes, expected {WAVE_ROW}", table.entry_size)),
        );
    }

    let rows: Vec<&[u8]> = table.data.chunks(WAVE_ROW).take(th.max_wave_rows).collect();
    let valid = rows.iter().filter(|r| wave_row_valid(r)).count();
    let share = ratio(valid, rows.len());
    if share < th.wave_direct_ratio {
        return default_wave(
            th,
            Note::warning(format!("only {:.0}% of wave rows are playable", share * 100.0)),
        );
    }

    let mut converted = Converted::new(TableRole::Wave, rows.concat(), th.direct_confidence);
    if table.entry_count > th.max_wave_rows {
        converted = converted.with_note(Note::warning(format!(
            "wave table truncated to {} rows",
            th.max_wave_rows
        )));
    }
    converted
}

fn default_effect(role: TableRole, th: &ConversionThresholds, note: Note) -> Converted {
    let rows: &[[u8; EFFECT_ROW]] = match role {
        TableRole::Filter => &DEFAULT_FILTER,
        _ => &DEFAULT_PULSE,
    };
    Converted::new(
        role,
        rows_to_columns(rows, EFFECT_ROW, th.max_effect_rows),
        th.default_confidence,
    )
    .defaulted()
    .with_note(note)
}

/// Convert a pulse or filter program into column-major rows.
pub fn convert_effect(
    role: TableRole,
    table: Option<&ExtractedTable>,
    th: &ConversionThresholds,
) -> Converted {
    let Some(table) = table else {
        return default_effect(
            role,
            th,
            Note::info(format!("no {role} table found, default program generated")),
        );
    };
    if table.entry_size != EFFECT_ROW {
        return default_effect(
            role,
            th,
            Note::warning(format!(
                "{role} rows are {} bytes, expected {EFFECT_ROW}",
                table.entry_size
            )),
        );
    }

    let rows: Vec<&[u8]> = table.data.chunks(EFFECT_ROW).take(th.max_effect_rows).collect();
    let linked = rows.iter().filter(|r| effect_link_valid(r, rows.len())).count();
    let share = ratio(linked, rows.len());
    if share < th.effect_direct_ratio {
        return default_effect(
            role,
            th,
            Note::warning(format!("only {:.0}% of {role} rows link inside the table", share * 100.0)),
        );
    }
    Converted::new(
        role,
        rows_to_columns(&rows, EFFECT_ROW, th.max_effect_rows),
        th.direct_confidence,
    )
}

/// Convert a command/arpeggio table into column-major rows.
pub fn convert_commands(table: &ExtractedTable, th: &ConversionThresholds) -> Result<Converted> {
    if table.data.is_empty() {
        return Err(ConvertError::InvalidTable {
            role: table.role.to_string(),
            message: "empty payload".to_string(),
        });
    }
    let rows: Vec<&[u8]> = table.data.chunks(COMMAND_ROW).take(th.command_rows).collect();
    let bytes = rows_to_columns(&rows, COMMAND_ROW, th.command_rows);
    if table.entry_size == COMMAND_ROW {
        Ok(Converted::new(TableRole::Command, bytes, th.command_confidence))
    } else {
        Ok(
            Converted::new(TableRole::Command, bytes, th.command_fallback_confidence).with_note(
                Note::warning(format!(
                    "{}-byte command entries regrouped as {COMMAND_ROW}-byte rows",
                    table.entry_size
                )),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryImage;

    fn table(role: TableRole, data: Vec<u8>, entry_size: usize) -> ExtractedTable {
        let count = data.len() / entry_size;
        let image = MemoryImage::new(0x1000, data).unwrap();
        ExtractedTable::carve(&image, role, 0x1000, count, entry_size, 0.9, "test").unwrap()
    }

    #[test]
    fn test_missing_wave_uses_defaults() {
        let th = ConversionThresholds::default();
        let converted = convert_wave(None, &th);
        assert!(converted.defaulted);
        assert_eq!(converted.confidence, th.default_confidence);
        assert_eq!(converted.bytes, default_wave_table());
    }

    #[test]
    fn test_playable_wave_is_copied() {
        let th = ConversionThresholds::default();
        let data = vec![0x41, 0x00, 0x41, 0x0C, 0x40, 0x00, 0x7F, 0x02];
        let converted = convert_wave(Some(&table(TableRole::Wave, data.clone(), 2)), &th);
        assert!(!converted.defaulted);
        assert_eq!(converted.confidence, th.direct_confidence);
        assert_eq!(converted.bytes, data);
    }

    #[test]
    fn test_noisy_wave_falls_back() {
        let th = ConversionThresholds::default();
        let data = vec![0xC1, 0x00, 0xE1, 0x00, 0x41, 0x00, 0xA0, 0x00];
        let converted = convert_wave(Some(&table(TableRole::Wave, data, 2)), &th);
        assert!(converted.defaulted);
    }

    #[test]
    fn test_linked_pulse_is_reshaped() {
        let th = ConversionThresholds::default();
        let data = vec![0x08, 0x00, 0x10, 0x01, 0x0A, 0x00, 0x10, 0x00];
        let converted = convert_effect(TableRole::Pulse, Some(&table(TableRole::Pulse, data, 4)), &th);
        assert!(!converted.defaulted);
        assert_eq!(converted.bytes.len(), EFFECT_ROW * th.max_effect_rows);
        assert_eq!(converted.bytes[0], 0x08);
        assert_eq!(converted.bytes[1], 0x0A);
        assert_eq!(converted.bytes[3 * th.max_effect_rows], 0x01);
    }

    #[test]
    fn test_broken_filter_links_fall_back() {
        let th = ConversionThresholds::default();
        let data = vec![0x10, 0x00, 0x00, 0x40, 0x20, 0x00, 0x00, 0x50];
        let converted =
            convert_effect(TableRole::Filter, Some(&table(TableRole::Filter, data, 4)), &th);
        assert!(converted.defaulted);
        assert_eq!(converted.role, TableRole::Filter);
        assert!(converted.bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_command_table() {
        let th = ConversionThresholds::default();
        let converted =
            convert_commands(&table(TableRole::Command, vec![1, 2, 3, 4, 5, 6], 3), &th).unwrap();
        assert_eq!(converted.confidence, th.command_confidence);
        assert_eq!(converted.bytes[0], 1);
        assert_eq!(converted.bytes[1], 4);
        assert_eq!(converted.bytes[th.command_rows], 2);

        let odd = convert_commands(&table(TableRole::Command, vec![1, 2, 3, 4], 2), &th).unwrap();
        assert_eq!(odd.confidence, th.command_fallback_confidence);
    }
}
