//! Per-component scorers.
//!
//! Each scorer records factor values in [0, 1] and finishes with its own
//! weight table. A missing input yields an uncomputed score.

use super::{Component, ComponentScore, FactorWeights};
use crate::convert::commands::{convert_sequence_bytes, source, tokenize};
use crate::convert::tables::{effect_link_valid, wave_row_valid, EFFECT_ROW};
use crate::engines::{markers, mos6502};
use crate::extract::TempoSetting;
use crate::types::ExtractedTable;
use std::collections::BTreeSet;

/// Instrument factor weights.
pub const INSTRUMENT_WEIGHTS: FactorWeights = &[
    ("presence", 20.0),
    ("occupancy", 20.0),
    ("envelope", 25.0),
    ("pointer_range", 20.0),
    ("code_free", 15.0),
];
/// Wave factor weights.
pub const WAVE_WEIGHTS: FactorWeights = &[
    ("presence", 30.0),
    ("waveform_validity", 50.0),
    ("terminated", 20.0),
];
/// Pulse and filter factor weights.
pub const EFFECT_WEIGHTS: FactorWeights = &[
    ("presence", 30.0),
    ("row_alignment", 30.0),
    ("link_validity", 40.0),
];
/// Orderlist factor weights.
pub const ORDERLIST_WEIGHTS: FactorWeights = &[
    ("presence", 30.0),
    ("sequence_count", 30.0),
    ("marker_confidence", 40.0),
];
/// Command factor weights.
pub const COMMAND_WEIGHTS: FactorWeights = &[("recognized", 70.0), ("not_dropped", 30.0)];
/// Tempo factor weights.
pub const TEMPO_WEIGHTS: FactorWeights = &[("in_range", 50.0), ("typical", 50.0)];
/// Arpeggio factor weights.
pub const ARPEGGIO_WEIGHTS: FactorWeights = &[
    ("presence", 40.0),
    ("terminated", 30.0),
    ("values_in_range", 30.0),
];
/// Note factor weights.
pub const NOTE_WEIGHTS: FactorWeights = &[("note_ratio", 60.0), ("note_spread", 40.0)];

/// Sequences needed for full orderlist credit.
const FULL_SEQUENCE_COUNT: f64 = 4.0;
/// Distinct notes needed for full spread credit.
const FULL_NOTE_SPREAD: f64 = 12.0;
/// Tempo values most players use.
const TYPICAL_TEMPO: std::ops::RangeInclusive<u8> = 2..=8;

fn share(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn missing(component: Component, what: &str) -> ComponentScore {
    ComponentScore::new(component.name()).with_note(format!("no {what} found"))
}

/// Score the instrument table.
pub fn instruments(table: Option<&ExtractedTable>) -> ComponentScore {
    let Some(table) = table else {
        return missing(Component::Instruments, "instrument table");
    };
    let entries: Vec<&[u8]> = table.entries().collect();
    let used = entries.iter().filter(|e| e.iter().any(|&b| b != 0)).count();
    let envelope = entries
        .iter()
        .filter(|e| e.iter().take(2).any(|&b| b != 0))
        .count();
    let pointers_ok = entries
        .iter()
        .filter(|e| e.iter().skip(2).take(3).all(|&b| b < 0x80))
        .count();

    let mut score = ComponentScore::new(Component::Instruments.name());
    score
        .add_factor("presence", 1.0)
        .add_factor("occupancy", share(used, entries.len()))
        .add_factor("envelope", share(envelope, entries.len()))
        .add_factor("pointer_range", share(pointers_ok, entries.len()))
        .add_factor(
            "code_free",
            1.0 - (mos6502::code_opcode_ratio(&table.data) / 0.10).min(1.0),
        );
    score.finish(INSTRUMENT_WEIGHTS)
}

/// Score the wave table.
pub fn wave(table: Option<&ExtractedTable>) -> ComponentScore {
    let Some(table) = table else {
        return missing(Component::Wave, "wave table");
    };
    let rows: Vec<&[u8]> = table.data.chunks(2).collect();
    let valid = rows.iter().filter(|r| wave_row_valid(r)).count();
    let terminated = rows.iter().any(|r| markers::is_block_marker(r[0]));

    let mut score = ComponentScore::new(Component::Wave.name());
    score
        .add_factor("presence", 1.0)
        .add_factor("waveform_validity", share(valid, rows.len()))
        .add_factor("terminated", if terminated { 1.0 } else { 0.0 });
    score.finish(WAVE_WEIGHTS)
}

/// Score a pulse or filter table.
pub fn effect(component: Component, table: Option<&ExtractedTable>) -> ComponentScore {
    let Some(table) = table else {
        return missing(component, &format!("{component} table"));
    };
    let rows: Vec<&[u8]> = table.data.chunks(EFFECT_ROW).collect();
    let linked = rows
        .iter()
        .filter(|r| effect_link_valid(r, rows.len()))
        .count();

    let mut score = ComponentScore::new(component.name());
    score
        .add_factor("presence", 1.0)
        .add_factor(
            "row_alignment",
            if table.entry_size == EFFECT_ROW { 1.0 } else { 0.0 },
        )
        .add_factor("link_validity", share(linked, rows.len()));
    score.finish(EFFECT_WEIGHTS)
}

/// Score the sequence table as an orderlist.
pub fn orderlist(table: Option<&ExtractedTable>) -> ComponentScore {
    let Some(table) = table else {
        return missing(Component::Orderlist, "sequence table");
    };
    let sequences = memchr::memchr_iter(markers::END, &table.data).count();

    let mut score = ComponentScore::new(Component::Orderlist.name());
    score
        .add_factor("presence", 1.0)
        .add_factor("sequence_count", sequences as f64 / FULL_SEQUENCE_COUNT)
        .add_factor("marker_confidence", table.confidence);
    score
        .finish(ORDERLIST_WEIGHTS)
        .with_note(format!("{sequences} terminated sequences"))
}

/// Score how well sequence commands map to the destination.
pub fn commands(table: Option<&ExtractedTable>) -> ComponentScore {
    let Some(table) = table else {
        return missing(Component::Commands, "sequence table");
    };
    let (_, stats) = convert_sequence_bytes(&table.data);

    let mut score = ComponentScore::new(Component::Commands.name());
    score
        .add_factor("recognized", 1.0 - stats.unknown_ratio())
        .add_factor("not_dropped", 1.0 - share(stats.dropped, stats.events));
    let mut score = score.finish(COMMAND_WEIGHTS);
    if stats.dropped > 0 {
        score = score.with_note(format!("{} commands dropped", stats.dropped));
    }
    score
}

/// Score the detected tempo.
pub fn tempo(tempo: Option<&TempoSetting>) -> ComponentScore {
    let Some(tempo) = tempo else {
        return missing(Component::Tempo, "tempo store");
    };
    let mut score = ComponentScore::new(Component::Tempo.name());
    score
        .add_factor(
            "in_range",
            if crate::extract::TEMPO_RANGE.contains(&tempo.value) {
                1.0
            } else {
                0.0
            },
        )
        .add_factor(
            "typical",
            if TYPICAL_TEMPO.contains(&tempo.value) {
                1.0
            } else {
                0.5
            },
        );
    score
        .finish(TEMPO_WEIGHTS)
        .with_note(format!("speed {} at ${:04X}", tempo.value, tempo.address))
}

/// Score the command/arpeggio table.
pub fn arpeggio(table: Option<&ExtractedTable>) -> ComponentScore {
    let Some(table) = table else {
        return missing(Component::Arpeggio, "command table");
    };
    let terminated = memchr::memchr(markers::END, &table.data).is_some();
    let in_range = table
        .data
        .iter()
        .filter(|&&b| b <= source::NOTE_MAX || markers::is_block_marker(b))
        .count();

    let mut score = ComponentScore::new(Component::Arpeggio.name());
    score
        .add_factor("presence", 1.0)
        .add_factor("terminated", if terminated { 1.0 } else { 0.0 })
        .add_factor("values_in_range", share(in_range, table.data.len()));
    score.finish(ARPEGGIO_WEIGHTS)
}

/// Score the note content of the sequence table.
pub fn notes(table: Option<&ExtractedTable>) -> ComponentScore {
    let Some(table) = table else {
        return missing(Component::Notes, "sequence table");
    };
    let events = tokenize(&table.data);
    let notes: Vec<u8> = events
        .iter()
        .map(|e| e.cmd)
        .filter(|&c| c <= source::NOTE_MAX)
        .collect();
    let distinct: BTreeSet<u8> = notes.iter().copied().collect();

    let mut score = ComponentScore::new(Component::Notes.name());
    score
        .add_factor("note_ratio", share(notes.len(), events.len()))
        .add_factor("note_spread", distinct.len() as f64 / FULL_NOTE_SPREAD);
    score.finish(NOTE_WEIGHTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryImage, TableRole};

    fn table(role: TableRole, data: Vec<u8>, entry_size: usize, confidence: f64) -> ExtractedTable {
        let count = data.len() / entry_size;
        let image = MemoryImage::new(0x1000, data).unwrap();
        ExtractedTable::carve(&image, role, 0x1000, count, entry_size, confidence, "test").unwrap()
    }

    fn weights_sum(weights: FactorWeights) -> f64 {
        weights.iter().map(|(_, w)| w).sum()
    }

    #[test]
    fn test_weight_tables_sum_to_100() {
        for weights in [
            INSTRUMENT_WEIGHTS,
            WAVE_WEIGHTS,
            EFFECT_WEIGHTS,
            ORDERLIST_WEIGHTS,
            COMMAND_WEIGHTS,
            TEMPO_WEIGHTS,
            ARPEGGIO_WEIGHTS,
            NOTE_WEIGHTS,
        ] {
            assert_eq!(weights_sum(weights), 100.0);
        }
    }

    #[test]
    fn test_missing_inputs_are_uncomputed() {
        assert!(!instruments(None).is_computed());
        assert!(!wave(None).is_computed());
        assert!(!effect(Component::Pulse, None).is_computed());
        assert!(!tempo(None).is_computed());
        assert!(!notes(None).is_computed());
    }

    #[test]
    fn test_clean_instruments_score_full() {
        let entry = [0x09, 0xA0, 0x01, 0x02, 0x03, 0x11, 0x05, 0x41];
        let data: Vec<u8> = entry.iter().copied().cycle().take(32 * 8).collect();
        let score = instruments(Some(&table(TableRole::Instrument, data, 8, 0.8)));
        assert_eq!(score.score, Some(100.0));
    }

    #[test]
    fn test_wave_score() {
        let score = wave(Some(&table(TableRole::Wave, vec![0x41, 0, 0x21, 0, 0x7F, 0, 0xC1, 0], 2, 0.9)));
        // presence 30 + 3/4 * 50 + terminated 20
        assert_eq!(score.score, Some(87.5));
    }

    #[test]
    fn test_sequence_components() {
        let data = vec![0x30, 0x32, 0x34, 0x7F, 0x30, 0x64, 0x00, 0x7F];
        let seq = table(TableRole::Sequence, data, 1, 0.8);

        let order = orderlist(Some(&seq));
        // presence 30 + 2/4 * 30 + 0.8 * 40
        assert!((order.score.unwrap() - 77.0).abs() < 1e-9);

        let cmds = commands(Some(&seq));
        // 7 events, none unknown, one dropped
        assert!((cmds.score.unwrap() - (70.0 + 30.0 * 6.0 / 7.0)).abs() < 1e-9);
        assert_eq!(cmds.notes.len(), 1);

        let n = notes(Some(&seq));
        // 4 of 7 events are notes, 3 distinct
        assert!((n.score.unwrap() - (60.0 * 4.0 / 7.0 + 40.0 * 3.0 / 12.0)).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_score() {
        let typical = TempoSetting { address: 0x1000, value: 6, target: 0x1400 };
        assert_eq!(tempo(Some(&typical)).score, Some(100.0));
        let slow = TempoSetting { value: 20, ..typical };
        assert_eq!(tempo(Some(&slow)).score, Some(75.0));
    }

    #[test]
    fn test_arpeggio_score() {
        let score = arpeggio(Some(&table(TableRole::Command, vec![0x00, 0x04, 0x07, 0x7F], 1, 0.9)));
        assert_eq!(score.score, Some(100.0));
    }
}
