//! Sequence command decomposition.
//!
//! Source sequences interleave note bytes with command bytes, some of which
//! carry a parameter. Packed commands hold two independent values in the
//! parameter's nibbles; the destination engine wants one simple command per
//! value, applied in emission order.

use tracing::debug;

/// Source engine command bytes.
#[allow(missing_docs)]
pub mod source {
    /// Highest note value.
    pub const NOTE_MAX: u8 = 0x5F;
    pub const SET_INSTRUMENT: u8 = 0x60;
    pub const VIBRATO: u8 = 0x61;
    pub const SLIDE_UP: u8 = 0x62;
    pub const SLIDE_DOWN: u8 = 0x63;
    pub const PATTERN_JUMP: u8 = 0x64;
    pub const PATTERN_BREAK: u8 = 0x65;
    pub const SET_VOLUME: u8 = 0x66;
    pub const FINE_VOLUME: u8 = 0x67;
    pub const PORTAMENTO: u8 = 0x68;
    pub const TREMOLO: u8 = 0x69;
    pub const CUT_NOTE: u8 = 0x6A;
    pub const ARPEGGIO: u8 = 0x70;
    pub const END: u8 = 0x7F;

    /// Whether `cmd` is followed by a parameter byte.
    pub fn takes_param(cmd: u8) -> bool {
        matches!(
            cmd,
            SET_INSTRUMENT
                | VIBRATO
                | SLIDE_UP
                | SLIDE_DOWN
                | PATTERN_JUMP
                | PATTERN_BREAK
                | SET_VOLUME
                | FINE_VOLUME
                | PORTAMENTO
                | TREMOLO
                | ARPEGGIO
        )
    }
}

/// A destination engine sequence command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestCommand {
    /// Note value, unchanged
    Note(u8),
    /// Select instrument
    SetInstrument,
    /// Vibrato depth
    VibratoDepth,
    /// Vibrato speed
    VibratoSpeed,
    /// Pitch slide up
    SlideUp,
    /// Pitch slide down
    SlideDown,
    /// Master volume
    Volume,
    /// First arpeggio note offset
    ArpNote1,
    /// Second arpeggio note offset
    ArpNote2,
    /// Portamento toward the next note
    Portamento,
    /// Tremolo depth
    TremoloDepth,
    /// Tremolo speed
    TremoloSpeed,
    /// Release the gate without a new note
    GateOff,
    /// End of sequence
    End,
    /// Unrecognized byte passed through as-is
    Raw(u8),
}

impl DestCommand {
    /// Encoded command byte.
    pub fn byte(self) -> u8 {
        match self {
            DestCommand::Note(n) | DestCommand::Raw(n) => n,
            DestCommand::SetInstrument => 0xA0,
            DestCommand::SlideUp => 0xC1,
            DestCommand::SlideDown => 0xC2,
            DestCommand::VibratoDepth => 0xC3,
            DestCommand::VibratoSpeed => 0xC4,
            DestCommand::Portamento => 0xC5,
            DestCommand::ArpNote1 => 0xC6,
            DestCommand::ArpNote2 => 0xC7,
            DestCommand::TremoloDepth => 0xC8,
            DestCommand::TremoloSpeed => 0xC9,
            DestCommand::Volume => 0xCA,
            DestCommand::GateOff => 0x7E,
            DestCommand::End => 0x7F,
        }
    }
}

/// One decomposed destination command with its optional parameter.
pub type DestEvent = (DestCommand, Option<u8>);

fn split(param: u8, first: DestCommand, second: DestCommand) -> Vec<DestEvent> {
    vec![(first, Some(param >> 4)), (second, Some(param & 0x0F))]
}

/// Decompose one source command into destination commands.
///
/// The output order is the order the destination engine applies them.
/// Commands without a destination equivalent yield an empty list.
pub fn decompose(cmd: u8, param: u8) -> Vec<DestEvent> {
    match cmd {
        0x00..=source::NOTE_MAX => vec![(DestCommand::Note(cmd), None)],
        source::SET_INSTRUMENT => vec![(DestCommand::SetInstrument, Some(param))],
        source::VIBRATO => split(param, DestCommand::VibratoDepth, DestCommand::VibratoSpeed),
        source::SLIDE_UP => vec![(DestCommand::SlideUp, Some(param))],
        source::SLIDE_DOWN => vec![(DestCommand::SlideDown, Some(param))],
        source::PATTERN_JUMP | source::PATTERN_BREAK => {
            debug!(cmd, param, "dropping pattern flow command");
            Vec::new()
        }
        // Fine volume loses its high nibble here.
        source::SET_VOLUME | source::FINE_VOLUME => vec![(DestCommand::Volume, Some(param & 0x0F))],
        source::ARPEGGIO => split(param, DestCommand::ArpNote1, DestCommand::ArpNote2),
        source::PORTAMENTO => vec![(DestCommand::Portamento, Some(param))],
        source::TREMOLO => split(param, DestCommand::TremoloDepth, DestCommand::TremoloSpeed),
        source::CUT_NOTE => vec![(DestCommand::GateOff, None)],
        source::END => vec![(DestCommand::End, None)],
        other => vec![(DestCommand::Raw(other), None)],
    }
}

/// A source event: command byte plus parameter when it takes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEvent {
    /// Command or note byte
    pub cmd: u8,
    /// Parameter byte
    pub param: Option<u8>,
}

/// Split a source sequence into events.
///
/// A parameterized command at the very end of the data has no parameter and
/// is decomposed with zero.
pub fn tokenize(data: &[u8]) -> Vec<SourceEvent> {
    let mut events = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let cmd = data[i];
        i += 1;
        let param = if source::takes_param(cmd) {
            let p = data.get(i).copied();
            i += 1;
            p
        } else {
            None
        };
        events.push(SourceEvent { cmd, param });
    }
    events
}

/// Counters collected while re-encoding a sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceStats {
    /// Source events read
    pub events: usize,
    /// Events passed through as raw bytes
    pub unknown: usize,
    /// Events with no destination equivalent
    pub dropped: usize,
}

impl SequenceStats {
    /// Share of events that were not recognized.
    pub fn unknown_ratio(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.unknown as f64 / self.events as f64
        }
    }
}

/// Re-encode a whole source sequence in destination commands.
pub fn convert_sequence_bytes(data: &[u8]) -> (Vec<u8>, SequenceStats) {
    let mut out = Vec::with_capacity(data.len());
    let mut stats = SequenceStats::default();
    for event in tokenize(data) {
        stats.events += 1;
        let decomposed = decompose(event.cmd, event.param.unwrap_or(0));
        if decomposed.is_empty() {
            stats.dropped += 1;
        }
        for (dest, param) in decomposed {
            if matches!(dest, DestCommand::Raw(_)) {
                stats.unknown += 1;
            }
            out.push(dest.byte());
            out.extend(param);
        }
    }
    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vibrato_splits_depth_then_speed() {
        assert_eq!(
            decompose(0x61, 0x35),
            vec![
                (DestCommand::VibratoDepth, Some(3)),
                (DestCommand::VibratoSpeed, Some(5))
            ]
        );
    }

    #[test]
    fn test_arpeggio_splits_note_offsets() {
        assert_eq!(
            decompose(0x70, 0x47),
            vec![(DestCommand::ArpNote1, Some(4)), (DestCommand::ArpNote2, Some(7))]
        );
    }

    #[test]
    fn test_tremolo_splits_depth_then_speed() {
        assert_eq!(
            decompose(0x69, 0xA2),
            vec![
                (DestCommand::TremoloDepth, Some(0x0A)),
                (DestCommand::TremoloSpeed, Some(0x02))
            ]
        );
    }

    #[test]
    fn test_end_marker() {
        assert_eq!(decompose(0x7F, 0x12), vec![(DestCommand::End, None)]);
    }

    #[test]
    fn test_notes_pass_through() {
        for n in 0x00..=0x5F {
            assert_eq!(decompose(n, 0xAA), vec![(DestCommand::Note(n), None)]);
        }
    }

    #[test]
    fn test_pattern_flow_is_dropped() {
        assert!(decompose(0x64, 0x02).is_empty());
        assert!(decompose(0x65, 0x00).is_empty());
    }

    #[test]
    fn test_fine_volume_drops_high_nibble() {
        assert_eq!(decompose(0x67, 0x9C), vec![(DestCommand::Volume, Some(0x0C))]);
        assert_eq!(decompose(0x66, 0xF3), vec![(DestCommand::Volume, Some(0x03))]);
    }

    #[test]
    fn test_cut_note_and_unknown() {
        assert_eq!(decompose(0x6A, 0x00), vec![(DestCommand::GateOff, None)]);
        assert_eq!(decompose(0x90, 0x00), vec![(DestCommand::Raw(0x90), None)]);
    }

    #[test]
    fn test_tokenize_consumes_parameters() {
        let events = tokenize(&[0x30, 0x61, 0x35, 0x6A, 0x60]);
        assert_eq!(events.len(), 4);
        assert_eq!(events[1], SourceEvent { cmd: 0x61, param: Some(0x35) });
        assert_eq!(events[3], SourceEvent { cmd: 0x60, param: None });
    }

    #[test]
    fn test_convert_sequence_bytes() {
        let (bytes, stats) =
            convert_sequence_bytes(&[0x60, 0x02, 0x30, 0x61, 0x35, 0x64, 0x01, 0x90, 0x7F]);
        assert_eq!(
            bytes,
            vec![0xA0, 0x02, 0x30, 0xC3, 0x03, 0xC4, 0x05, 0x90, 0x7F]
        );
        assert_eq!(stats.events, 6);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.unknown, 1);
    }
}
