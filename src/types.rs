//! Core types for the table converter.
//!
//! This module defines the data model shared by every stage: the memory
//! image under analysis, table roles, heuristic candidates, extracted
//! tables, analysis notes and the tunable options.

use crate::engines::EngineVariant;
use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest addressable byte on the target machine.
pub const ADDRESS_SPACE_END: u32 = 0xFFFF;

/// Parsed container header handed over by the file-format reader.
///
/// The core never parses the outer container itself; it only consumes
/// these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneHeader {
    /// Address the data is loaded at
    pub load_address: u16,
    /// Init routine address
    pub init_address: u16,
    /// Play routine address
    pub play_address: u16,
    /// Number of subtunes
    pub subtunes: u16,
    /// Memory image bytes beginning at `load_address`
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl TuneHeader {
    /// Build a validated memory image from the header payload.
    pub fn image(&self) -> Result<MemoryImage> {
        MemoryImage::new(self.load_address, self.data.clone())
    }
}

/// An addressable byte array representing the target machine's RAM.
///
/// Invariant: `load_address + len - 1 <= 0xFFFF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    load_address: u16,
    data: Vec<u8>,
}

impl MemoryImage {
    /// Create an image, rejecting payloads that run past `$FFFF`.
    pub fn new(load_address: u16, data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(ConvertError::EmptyImage);
        }
        if data.len() > 0x10000
            || u32::from(load_address) + data.len() as u32 - 1 > ADDRESS_SPACE_END
        {
            return Err(ConvertError::ImageOutOfRange {
                load_address,
                length: data.len(),
            });
        }
        Ok(Self { load_address, data })
    }

    /// Base load address.
    pub fn load_address(&self) -> u16 {
        self.load_address
    }

    /// Address of the last byte in the image.
    pub fn end_address(&self) -> u16 {
        (u32::from(self.load_address) + self.data.len() as u32 - 1) as u16
    }

    /// Raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes in the image.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a constructed image.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Translate a buffer offset into a machine address.
    pub fn address_of(&self, offset: usize) -> u16 {
        (u32::from(self.load_address) + offset as u32) as u16
    }

    /// Translate a machine address into a buffer offset.
    pub fn offset_of(&self, address: u16) -> Option<usize> {
        if self.contains(address) {
            Some(usize::from(address - self.load_address))
        } else {
            None
        }
    }

    /// Whether `address` falls inside the image.
    pub fn contains(&self, address: u16) -> bool {
        address >= self.load_address && address <= self.end_address()
    }

    /// Borrow `len` bytes starting at machine address `address`.
    pub fn slice(&self, address: u16, len: usize) -> Option<&[u8]> {
        let start = self.offset_of(address)?;
        self.data.get(start..start.checked_add(len)?)
    }
}

/// Semantic role of a player data table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    /// Note/command sequences
    Sequence,
    /// Instrument records
    Instrument,
    /// Waveform programs
    Wave,
    /// Pulse-width programs
    Pulse,
    /// Filter programs
    Filter,
    /// Command / arpeggio table
    Command,
}

impl TableRole {
    /// Every role, in conversion order.
    pub const ALL: [TableRole; 6] = [
        TableRole::Sequence,
        TableRole::Instrument,
        TableRole::Wave,
        TableRole::Pulse,
        TableRole::Filter,
        TableRole::Command,
    ];

    /// Lowercase role name.
    pub fn name(self) -> &'static str {
        match self {
            TableRole::Sequence => "sequence",
            TableRole::Instrument => "instrument",
            TableRole::Wave => "wave",
            TableRole::Pulse => "pulse",
            TableRole::Filter => "filter",
            TableRole::Command => "command",
        }
    }
}

impl fmt::Display for TableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse classification tag attached to a memory-analyzer candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Maximal run of zero bytes
    ZeroRun,
    /// Window dominated by a single byte value
    Repetitive,
    /// Span closed by an end marker
    BoundedBlock,
    /// Possible pointer/index table
    PointerTable,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateKind::ZeroRun => "zero_run",
            CandidateKind::Repetitive => "repetitive",
            CandidateKind::BoundedBlock => "bounded_block",
            CandidateKind::PointerTable => "pointer_table",
        };
        f.write_str(s)
    }
}

/// A proposed table region inside the memory image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCandidate {
    /// Start address
    pub address: u16,
    /// Size in bytes
    pub size: usize,
    /// Classification tag
    pub kind: CandidateKind,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Human-readable justifications
    pub reasons: Vec<String>,
}

impl TableCandidate {
    /// Create a candidate with a single justification.
    pub fn new(
        address: u16,
        size: usize,
        kind: CandidateKind,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            address,
            size,
            kind,
            confidence,
            reasons: vec![reason.into()],
        }
    }

    /// Exclusive end address as a wide integer.
    pub fn end(&self) -> u32 {
        u32::from(self.address) + self.size as u32
    }

    /// Whether two candidates share at least one byte.
    pub fn overlaps(&self, other: &TableCandidate) -> bool {
        ranges_overlap(
            u32::from(self.address),
            self.end(),
            u32::from(other.address),
            other.end(),
        )
    }
}

/// Whether half-open ranges `[a0, a1)` and `[b0, b1)` intersect.
pub fn ranges_overlap(a0: u32, a1: u32, b0: u32, b1: u32) -> bool {
    a0 < b1 && b0 < a1
}

/// A concrete table carved out of the memory image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// Semantic role
    pub role: TableRole,
    /// Start address
    pub address: u16,
    /// Size in bytes
    pub size: usize,
    /// Number of entries
    pub entry_count: usize,
    /// Bytes per entry
    pub entry_size: usize,
    /// Raw payload
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Free-text reasoning
    pub reasoning: String,
}

impl ExtractedTable {
    /// Carve `entry_count * entry_size` bytes at `address` out of `image`.
    ///
    /// Returns `None` when the region does not fit inside the image.
    pub fn carve(
        image: &MemoryImage,
        role: TableRole,
        address: u16,
        entry_count: usize,
        entry_size: usize,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Option<Self> {
        let size = entry_count.checked_mul(entry_size)?;
        let data = image.slice(address, size)?.to_vec();
        Some(Self {
            role,
            address,
            size,
            entry_count,
            entry_size,
            data,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
        })
    }

    /// Exclusive end address as a wide integer.
    pub fn end(&self) -> u32 {
        u32::from(self.address) + self.size as u32
    }

    /// Iterate the payload entry by entry.
    pub fn entries(&self) -> std::slice::Chunks<'_, u8> {
        self.data.chunks(self.entry_size.max(1))
    }
}

impl fmt::Display for ExtractedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ ${:04X} ({} x {} bytes) [{:.0}% confidence]",
            self.role,
            self.address,
            self.entry_count,
            self.entry_size,
            self.confidence * 100.0
        )
    }
}

/// Analysis note or warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Severity level
    pub level: NoteLevel,
    /// Note message
    pub message: String,
    /// Optional context (e.g., "wave conversion")
    pub context: Option<String>,
}

impl Note {
    /// Create an info note.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Info,
            message: message.into(),
            context: None,
        }
    }

    /// Create a warning note.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Warning,
            message: message.into(),
            context: None,
        }
    }

    /// Create an error note.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Error,
            message: message.into(),
            context: None,
        }
    }

    /// Add context to the note.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Note severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteLevel {
    /// Informational
    Info,
    /// Warning (non-fatal issue)
    Warning,
    /// Error (fatal issue handled gracefully)
    Error,
}

/// Options for analysis and extraction behavior.
#[derive(Debug, Clone)]
pub struct ConverterOptions {
    /// Maximum number of candidates surviving dedupe
    pub max_candidates: usize,
    /// Shortest zero run worth reporting
    pub min_zero_run: usize,
    /// Byte-frequency window width
    pub frequency_window: usize,
    /// Occurrences of one value inside the window that flag it
    pub frequency_threshold: usize,
    /// Backward walk limit for the memory analyzer's block detector
    pub analyzer_lookback: usize,
    /// Backward walk limit for sequence extraction
    pub sequence_lookback: usize,
    /// Largest gap between blocks grouped into one sequence table
    pub sequence_group_gap: usize,
    /// Score a window must exceed to be accepted as an instrument table
    pub instrument_threshold: f64,
    /// Scan every instrument shape and keep the best hit instead of the first
    pub deep_scan: bool,
    /// Destination engine layout
    pub engine: EngineVariant,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            max_candidates: 20,
            min_zero_run: 16,
            frequency_window: 32,
            frequency_threshold: 8,
            analyzer_lookback: 64,
            sequence_lookback: 256,
            sequence_group_gap: 16,
            instrument_threshold: 0.7,
            deep_scan: false,
            engine: EngineVariant::Driver11,
        }
    }

    /// Create options for thorough analysis.
    pub fn thorough() -> Self {
        Self {
            max_candidates: 64,
            deep_scan: true,
            ..Self::new()
        }
    }

    /// Create options for fast analysis.
    pub fn fast() -> Self {
        Self {
            max_candidates: 8,
            deep_scan: false,
            ..Self::new()
        }
    }

    /// Select the destination engine.
    pub fn with_engine(mut self, engine: EngineVariant) -> Self {
        self.engine = engine;
        self
    }
}

/// Serialize byte payloads as hex strings.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
