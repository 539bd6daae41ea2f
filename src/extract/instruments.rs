//! Instrument table location.
//!
//! Instrument tables have a fixed record width and a small set of common
//! slot counts, so every canonical shape is tried with a sliding window
//! and each window is scored on how table-like its bytes look.

use crate::engines::mos6502;
use crate::types::{ExtractedTable, MemoryImage, TableRole};

/// Canonical `(entry_count, entry_size)` shapes, in the order they are tried.
pub const SHAPES: [(usize, usize); 4] = [(32, 8), (16, 8), (64, 8), (32, 4)];

/// Score contributions for an instrument window.
pub mod weights {
    /// Entries look like records: pointer fields small, most slots used.
    pub const STRUCTURE: f64 = 0.3;
    /// The window is not entirely zero.
    pub const NON_ZERO: f64 = 0.2;
    /// Fewer than 10% of bytes are common code opcodes.
    pub const NOT_CODE: f64 = 0.2;
    /// No byte sits at the `0xFF` fill value.
    pub const PLAUSIBLE_RANGE: f64 = 0.1;
}

/// Ratio of opcode bytes above which a window is treated as code.
pub const MAX_OPCODE_RATIO: f64 = 0.10;
/// Pointer fields at or above this value are treated as implausible.
pub const POINTER_LIMIT: u8 = 0x80;

/// Score breakdown of one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowScore {
    /// Structural consistency passed
    pub structure: bool,
    /// Window not all zero
    pub non_zero: bool,
    /// Opcode ratio below the limit
    pub not_code: bool,
    /// Maximum byte plausible
    pub plausible_range: bool,
}

impl WindowScore {
    /// Weighted total.
    pub fn total(&self) -> f64 {
        let mut score = 0.0;
        if self.structure {
            score += weights::STRUCTURE;
        }
        if self.non_zero {
            score += weights::NON_ZERO;
        }
        if self.not_code {
            score += weights::NOT_CODE;
        }
        if self.plausible_range {
            score += weights::PLAUSIBLE_RANGE;
        }
        score
    }
}

/// Byte positions inside an entry that hold table pointers.
fn pointer_fields(entry_size: usize) -> std::ops::Range<usize> {
    if entry_size >= 8 {
        2..5
    } else {
        2..entry_size.min(4)
    }
}

/// Score a window laid out as `entry_size`-byte records.
pub fn score_window(window: &[u8], entry_size: usize) -> WindowScore {
    let entries = window.chunks_exact(entry_size.max(1));
    let count = entries.len().max(1);
    let used = window
        .chunks_exact(entry_size.max(1))
        .filter(|e| e.iter().any(|&b| b != 0))
        .count();
    let pointers_ok = entries
        .filter(|e| pointer_fields(entry_size).all(|i| e[i] < POINTER_LIMIT))
        .count();

    WindowScore {
        structure: used * 2 >= count && pointers_ok as f64 >= 0.9 * count as f64,
        non_zero: window.iter().any(|&b| b != 0),
        not_code: mos6502::code_opcode_ratio(window) < MAX_OPCODE_RATIO,
        plausible_range: window.iter().copied().max().unwrap_or(0) < 0xFF,
    }
}

/// First window of one shape scoring above `threshold`, as `(offset, score)`.
///
/// Windows slide byte by byte so a table is found at its real start
/// whatever its alignment relative to the load address.
fn first_passing_window(
    data: &[u8],
    count: usize,
    size: usize,
    threshold: f64,
    exclude: &[(usize, usize)],
) -> Option<(usize, f64)> {
    let len = count * size;
    if data.len() < len {
        return None;
    }
    (0..=data.len() - len)
        .filter(|&offset| {
            !exclude
                .iter()
                .any(|&(start, end)| offset < end && start < offset + len)
        })
        .map(|offset| (offset, score_window(&data[offset..offset + len], size).total()))
        .find(|&(_, total)| total > threshold)
}

/// Locate the instrument table.
///
/// Shapes are tried in [`SHAPES`] order; within a shape windows are tried
/// in address order. By default the first shape with a window scoring above
/// `threshold` wins. With `all_shapes` every shape is scanned and the
/// highest-scoring hit is kept, earlier shapes winning ties.
/// Windows touching any `exclude` range (half-open offsets) are skipped.
pub fn find_instruments(
    image: &MemoryImage,
    threshold: f64,
    all_shapes: bool,
    exclude: &[(usize, usize)],
) -> Option<ExtractedTable> {
    let data = image.bytes();
    let mut best: Option<(usize, usize, usize, f64)> = None;
    for &(count, size) in &SHAPES {
        let Some((offset, total)) = first_passing_window(data, count, size, threshold, exclude)
        else {
            continue;
        };
        if best.map_or(true, |(.., score)| total > score) {
            best = Some((offset, count, size, total));
        }
        if !all_shapes {
            break;
        }
    }
    let (offset, count, size, total) = best?;
    ExtractedTable::carve(
        image,
        TableRole::Instrument,
        image.address_of(offset),
        count,
        size,
        total,
        format!("{count} x {size}-byte records scored {total:.2}"),
    )
}
