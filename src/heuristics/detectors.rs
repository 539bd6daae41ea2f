//! Structural detectors over a raw memory image.
//!
//! Each detector is a pure function of the byte buffer and reports its
//! findings as buffer offsets; [`super::analyze`] translates them into
//! addresses and merges them.

use crate::engines::markers;
use crate::types::{CandidateKind, MemoryImage, TableCandidate};

/// Confidence given to every zero run.
pub const ZERO_RUN_CONFIDENCE: f64 = 0.9;
/// Confidence given to end-marker bounded blocks.
pub const BOUNDED_BLOCK_CONFIDENCE: f64 = 0.8;
/// Confidence given to ascending-pair windows.
pub const ASCENDING_PAIR_CONFIDENCE: f64 = 0.6;
/// Smallest bounded block worth reporting.
pub const MIN_BLOCK_LEN: usize = 4;
/// Largest bounded block worth reporting.
pub const MAX_BLOCK_LEN: usize = 256;

/// A span `[start, end]` closed by an end marker at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Offset of the first byte
    pub start: usize,
    /// Offset of the end marker (inclusive)
    pub end: usize,
}

impl Block {
    /// Length including the end marker.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false; a block holds at least its marker.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A maximal run of zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroRun {
    /// Offset of the first zero
    pub start: usize,
    /// Run length
    pub len: usize,
}

/// Maximal runs of `0x00` at least `min_len` long.
pub fn zero_runs(data: &[u8], min_len: usize) -> Vec<ZeroRun> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < data.len() {
        if data[i] != 0 {
            i += 1;
            continue;
        }
        let start = i;
        while i < data.len() && data[i] == 0 {
            i += 1;
        }
        if i - start >= min_len {
            runs.push(ZeroRun {
                start,
                len: i - start,
            });
        }
    }
    runs
}

/// Windows where one byte value occurs at least `threshold` times.
///
/// Returns `(offset, highest frequency)` for every qualifying window
/// position. Counts are maintained incrementally as the window slides.
pub fn frequency_windows(data: &[u8], window: usize, threshold: usize) -> Vec<(usize, usize)> {
    let mut hits = Vec::new();
    if window == 0 || data.len() < window {
        return hits;
    }

    let mut counts = [0usize; 256];
    let mut hot = 0usize;
    for &b in &data[..window] {
        counts[usize::from(b)] += 1;
        if counts[usize::from(b)] == threshold {
            hot += 1;
        }
    }

    let mut start = 0;
    loop {
        if hot > 0 {
            let freq = counts.iter().copied().max().unwrap_or(0);
            hits.push((start, freq));
        }
        if start + window >= data.len() {
            break;
        }
        let out = usize::from(data[start]);
        if counts[out] == threshold {
            hot -= 1;
        }
        counts[out] -= 1;
        let inc = usize::from(data[start + window]);
        counts[inc] += 1;
        if counts[inc] == threshold {
            hot += 1;
        }
        start += 1;
    }
    hits
}

/// Confidence for a frequency window whose dominant value occurs `freq` times.
pub fn frequency_confidence(freq: usize, window: usize) -> f64 {
    (0.5 + (freq as f64 / window as f64) * 0.4).min(0.9)
}

/// Blocks closed by the end marker, delimited by the previous marker or zero.
///
/// For every end marker the scan walks back at most `lookback` bytes. When
/// no delimiter is found inside the lookback the marker yields no block.
pub fn bounded_blocks(data: &[u8], lookback: usize) -> Vec<Block> {
    let mut blocks = Vec::new();
    for end in memchr::memchr_iter(markers::END, data) {
        let floor = end.saturating_sub(lookback);
        let delimiter = (floor..end)
            .rev()
            .find(|&j| markers::is_block_marker(data[j]) || data[j] == 0);
        if let Some(j) = delimiter {
            blocks.push(Block { start: j + 1, end });
        }
    }
    blocks
}

/// Offsets of 4-byte windows holding exactly two distinct values, rising.
pub fn ascending_pairs(data: &[u8]) -> Vec<usize> {
    data.windows(4)
        .enumerate()
        .filter(|(_, w)| {
            let first = w[0];
            let other = w.iter().copied().find(|&b| b != first);
            match other {
                Some(second) => w.iter().all(|&b| b == first || b == second) && w[0] < w[3],
                None => false,
            }
        })
        .map(|(i, _)| i)
        .collect()
}

/// Zero runs as candidates.
pub fn zero_run_candidates(image: &MemoryImage, min_len: usize) -> Vec<TableCandidate> {
    zero_runs(image.bytes(), min_len)
        .into_iter()
        .map(|run| {
            TableCandidate::new(
                image.address_of(run.start),
                run.len,
                CandidateKind::ZeroRun,
                ZERO_RUN_CONFIDENCE,
                format!("{} consecutive zero bytes", run.len),
            )
        })
        .collect()
}

/// Frequency windows as candidates.
pub fn frequency_candidates(
    image: &MemoryImage,
    window: usize,
    threshold: usize,
) -> Vec<TableCandidate> {
    frequency_windows(image.bytes(), window, threshold)
        .into_iter()
        .map(|(offset, freq)| {
            TableCandidate::new(
                image.address_of(offset),
                window,
                CandidateKind::Repetitive,
                frequency_confidence(freq, window),
                format!("one byte value occurs {freq} times in {window} bytes"),
            )
        })
        .collect()
}

/// Bounded blocks as candidates.
pub fn bounded_block_candidates(image: &MemoryImage, lookback: usize) -> Vec<TableCandidate> {
    bounded_blocks(image.bytes(), lookback)
        .into_iter()
        .filter(|b| (MIN_BLOCK_LEN..=MAX_BLOCK_LEN).contains(&b.len()))
        .map(|b| {
            TableCandidate::new(
                image.address_of(b.start),
                b.len(),
                CandidateKind::BoundedBlock,
                BOUNDED_BLOCK_CONFIDENCE,
                format!(
                    "{} bytes closed by end marker at ${:04X}",
                    b.len(),
                    image.address_of(b.end)
                ),
            )
        })
        .collect()
}

/// Ascending-pair windows as candidates.
pub fn ascending_pair_candidates(image: &MemoryImage) -> Vec<TableCandidate> {
    ascending_pairs(image.bytes())
        .into_iter()
        .map(|offset| {
            TableCandidate::new(
                image.address_of(offset),
                4,
                CandidateKind::PointerTable,
                ASCENDING_PAIR_CONFIDENCE,
                "two distinct rising values, possible pointer/index table",
            )
        })
        .collect()
}
