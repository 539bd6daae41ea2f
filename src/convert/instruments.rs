//! Instrument transposition.
//!
//! Source instruments are 8-byte row-major records. The destination keeps
//! six of the eight fields, stored column-major: column `k` holds field `k`
//! of every slot contiguously, padded to a fixed slot count.

use super::rows_to_columns;
use crate::engines::sid::Waveform;
use crate::error::{ConvertError, Result};
use tracing::warn;

/// Bytes per source instrument.
pub const SOURCE_WIDTH: usize = 8;
/// Fields per destination instrument.
pub const DEST_COLUMNS: usize = 6;
/// Destination instrument slots.
pub const PAD_TO: usize = 32;

/// Source byte feeding each destination column.
///
/// Attack/decay, sustain/release, flags, filter pointer, pulse pointer,
/// waveform pointer. Source bytes 5 (filter waveform) and 6 (arpeggio
/// pointer) have no destination field and are dropped.
pub const COLUMN_SOURCE: [usize; DEST_COLUMNS] = [0, 1, 7, 4, 3, 2];

/// Destination column holding the wave-table pointer.
pub const WAVE_COLUMN: usize = 5;

/// Attack/decay of a padding instrument.
pub const DEFAULT_AD: u8 = 0x00;
/// Sustain/release of a padding instrument.
pub const DEFAULT_SR: u8 = 0xF0;

/// Default wave table: one looping two-row program per waveform in
/// [`Waveform::DEFAULT_CYCLE`], stored as `(control, argument)` rows.
pub fn default_wave_table() -> Vec<u8> {
    Waveform::DEFAULT_CYCLE
        .iter()
        .enumerate()
        .flat_map(|(k, wf)| {
            let start = (k * 2) as u8;
            [(*wf | Waveform::GATE).bits(), 0x00, 0x7F, start]
        })
        .collect()
}

/// Default instrument for padding slot `k` (cycles every four slots).
pub fn default_instrument(k: usize) -> [u8; DEST_COLUMNS] {
    let mut fields = [0u8; DEST_COLUMNS];
    fields[0] = DEFAULT_AD;
    fields[1] = DEFAULT_SR;
    fields[WAVE_COLUMN] = ((k % Waveform::DEFAULT_CYCLE.len()) * 2) as u8;
    fields
}

/// The six destination fields of one source instrument.
pub fn project_instrument(source: &[u8; SOURCE_WIDTH]) -> [u8; DEST_COLUMNS] {
    COLUMN_SOURCE.map(|i| source[i])
}

/// Reshape source instruments into a column-major destination table.
///
/// Slots past the supplied instruments receive [`default_instrument`]
/// values; instruments beyond `pad_to` are truncated with a warning.
pub fn transpose<T: AsRef<[u8]>>(instruments: &[T], pad_to: usize) -> Result<Vec<u8>> {
    let mut rows: Vec<[u8; DEST_COLUMNS]> = Vec::with_capacity(pad_to);
    for (index, raw) in instruments.iter().enumerate() {
        let raw = raw.as_ref();
        let record: &[u8; SOURCE_WIDTH] = raw
            .get(..SOURCE_WIDTH)
            .and_then(|r| r.try_into().ok())
            .ok_or(ConvertError::InstrumentTooShort {
                index,
                length: raw.len(),
            })?;
        if index < pad_to {
            rows.push(project_instrument(record));
        }
    }
    if instruments.len() > pad_to {
        warn!(
            supplied = instruments.len(),
            slots = pad_to,
            "truncating instrument list"
        );
    }
    let supplied = rows.len();
    rows.extend((supplied..pad_to).map(|i| default_instrument(i - supplied)));

    Ok(rows_to_columns(&rows, DEST_COLUMNS, pad_to))
}

/// Read slot `slot` back out of a column-major table of `pad_to` slots.
pub fn extract_instrument(table: &[u8], slot: usize, pad_to: usize) -> Option<[u8; DEST_COLUMNS]> {
    if slot >= pad_to || table.len() < DEST_COLUMNS * pad_to {
        return None;
    }
    let mut fields = [0u8; DEST_COLUMNS];
    for (k, field) in fields.iter_mut().enumerate() {
        *field = table[k * pad_to + slot];
    }
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn source(i: u8) -> [u8; 8] {
        [0x10 + i, 0x20 + i, 0x30 + i, 0x40 + i, 0x50 + i, 0x60 + i, 0x70 + i, 0x80 + i]
    }

    #[test]
    fn test_projection_drops_fields_five_and_six() {
        let p = project_instrument(&source(1));
        assert_eq!(p, [0x11, 0x21, 0x81, 0x51, 0x41, 0x31]);
        assert!(!p.contains(&0x61));
        assert!(!p.contains(&0x71));
    }

    #[test]
    fn test_transpose_round_trip() {
        let xs: Vec<[u8; 8]> = (0..5).map(source).collect();
        let table = transpose(&xs, PAD_TO).unwrap();
        assert_eq!(table.len(), DEST_COLUMNS * PAD_TO);
        for (i, x) in xs.iter().enumerate() {
            assert_eq!(extract_instrument(&table, i, PAD_TO), Some(project_instrument(x)));
        }
        for i in xs.len()..PAD_TO {
            assert_eq!(
                extract_instrument(&table, i, PAD_TO),
                Some(default_instrument((i - xs.len()) % 4))
            );
        }
    }

    #[test]
    fn test_column_major_layout() {
        let table = transpose(&[source(0), source(1)], PAD_TO).unwrap();
        assert_eq!(table[0], 0x10);
        assert_eq!(table[1], 0x11);
        assert_eq!(table[PAD_TO], 0x20);
        assert_eq!(table[2 * PAD_TO], 0x80);
    }

    #[test]
    fn test_default_instruments_cycle() {
        assert_eq!(default_instrument(0), [0x00, 0xF0, 0, 0, 0, 0]);
        assert_eq!(default_instrument(3)[WAVE_COLUMN], 6);
        assert_eq!(default_instrument(4), default_instrument(0));
    }

    #[test]
    fn test_default_wave_programs() {
        let waves = default_wave_table();
        assert_eq!(waves.len(), 16);
        assert_eq!(&waves[0..4], &[0x11, 0x00, 0x7F, 0x00]);
        assert_eq!(&waves[12..16], &[0x81, 0x00, 0x7F, 0x06]);
    }

    #[test]
    fn test_short_instrument_is_error() {
        let xs = vec![source(0).to_vec(), vec![1, 2, 3]];
        match transpose(&xs, PAD_TO) {
            Err(ConvertError::InstrumentTooShort { index, length }) => {
                assert_eq!(index, 1);
                assert_eq!(length, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_too_many_instruments_truncates() {
        let xs: Vec<[u8; 8]> = (0..40).map(source).collect();
        let table = transpose(&xs, PAD_TO).unwrap();
        assert_eq!(table.len(), DEST_COLUMNS * PAD_TO);
        assert_eq!(extract_instrument(&table, 31, PAD_TO), Some(project_instrument(&xs[31])));
    }
}
