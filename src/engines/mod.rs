//! Source and destination player-engine definitions.
//!
//! This module holds the byte-level vocabulary shared by every stage:
//! 6502 opcodes used to tell code from data, SID waveform bits used to
//! validate modulation programs, the source engine's sequence markers, and
//! the static role-to-offset maps of each destination engine.

pub mod mos6502;
pub mod sid;

use crate::types::TableRole;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source engine sequence markers.
pub mod markers {
    /// Terminates a sequence.
    pub const END: u8 = 0x7F;
    /// Loops a sequence back to its start.
    pub const LOOP: u8 = 0x7E;
    /// Highest note value.
    pub const NOTE_MAX: u8 = 0x5F;

    /// Whether `byte` closes a block (end or loop marker).
    pub fn is_block_marker(byte: u8) -> bool {
        byte == END || byte == LOOP
    }
}

/// Destination player engine layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineVariant {
    /// Driver 11: the full table set, including the command table
    #[default]
    Driver11,
    /// Driver 12: compact layout without a separate command table
    Driver12,
}

/// Static role -> template offset map for one engine.
type OffsetTable = &'static [(TableRole, usize)];

const DRIVER11_OFFSETS: OffsetTable = &[
    (TableRole::Instrument, 0x0A03),
    (TableRole::Command, 0x0AC3),
    (TableRole::Wave, 0x0B83),
    (TableRole::Pulse, 0x0D83),
    (TableRole::Filter, 0x0F83),
    (TableRole::Sequence, 0x1183),
];

const DRIVER12_OFFSETS: OffsetTable = &[
    (TableRole::Instrument, 0x0903),
    (TableRole::Wave, 0x09C3),
    (TableRole::Pulse, 0x0BC3),
    (TableRole::Filter, 0x0DC3),
    (TableRole::Sequence, 0x0FC3),
];

impl EngineVariant {
    /// Every known engine.
    pub const ALL: [EngineVariant; 2] = [EngineVariant::Driver11, EngineVariant::Driver12];

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            EngineVariant::Driver11 => "Driver 11",
            EngineVariant::Driver12 => "Driver 12",
        }
    }

    /// Role -> byte offset table.
    pub fn offsets(self) -> OffsetTable {
        match self {
            EngineVariant::Driver11 => DRIVER11_OFFSETS,
            EngineVariant::Driver12 => DRIVER12_OFFSETS,
        }
    }

    /// Template offset for `role`, if the engine stores that table.
    pub fn offset(self, role: TableRole) -> Option<usize> {
        self.offsets()
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, offset)| *offset)
    }

    /// Roles the engine can receive.
    pub fn roles(self) -> impl Iterator<Item = TableRole> {
        self.offsets().iter().map(|(role, _)| *role)
    }

    /// Parse a CLI-style engine name (`driver11`, `11`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().trim_start_matches("driver") {
            "11" => Some(EngineVariant::Driver11),
            "12" => Some(EngineVariant::Driver12),
            _ => None,
        }
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
