//! Sequence table location.
//!
//! Sequences are runs of note and command bytes closed by the end marker.
//! Real players store them back to back, so the largest cluster of
//! end-marker bounded blocks is taken as the sequence table.

use crate::heuristics::detectors::{bounded_blocks, Block, MAX_BLOCK_LEN, MIN_BLOCK_LEN};
use crate::types::{ExtractedTable, MemoryImage, TableRole};

/// Confidence floor for a located sequence table.
pub const BASE_CONFIDENCE: f64 = 0.75;
/// Extra confidence granted at full marker density.
pub const DENSITY_BONUS: f64 = 0.05;
/// Marker spacing (bytes) that counts as full density.
pub const DENSE_SPACING: f64 = 16.0;

/// Blocks that sit within `gap` bytes of their predecessor.
pub fn group_blocks(blocks: &[Block], gap: usize) -> Vec<Vec<Block>> {
    let mut groups: Vec<Vec<Block>> = Vec::new();
    for &block in blocks {
        match groups.last_mut() {
            Some(group)
                if group
                    .last()
                    .is_some_and(|prev| block.start.saturating_sub(prev.end + 1) <= gap) =>
            {
                group.push(block);
            }
            _ => groups.push(vec![block]),
        }
    }
    groups
}

/// Confidence for a group of `markers` blocks spanning `size` bytes.
pub fn density_confidence(markers: usize, size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    let density = (markers as f64 * DENSE_SPACING / size as f64).min(1.0);
    BASE_CONFIDENCE + DENSITY_BONUS * density
}

/// Locate the sequence table.
pub fn find_sequences(image: &MemoryImage, lookback: usize, gap: usize) -> Option<ExtractedTable> {
    let blocks: Vec<Block> = bounded_blocks(image.bytes(), lookback)
        .into_iter()
        .filter(|b| (MIN_BLOCK_LEN..=MAX_BLOCK_LEN).contains(&b.len()))
        .collect();

    let groups = group_blocks(&blocks, gap);
    let best = groups.iter().fold(None::<&Vec<Block>>, |best, group| match best {
        Some(b) if b.len() > group.len() => Some(b),
        Some(b) if b.len() == group.len() && span(b) >= span(group) => Some(b),
        _ => Some(group),
    })?;

    let first = best.first()?;
    let size = span(best);
    let confidence = density_confidence(best.len(), size);

    ExtractedTable::carve(
        image,
        TableRole::Sequence,
        image.address_of(first.start),
        size,
        1,
        confidence,
        format!(
            "{} end-marker bounded sequences in {} bytes (group of {} clusters)",
            best.len(),
            size,
            groups.len()
        ),
    )
}

fn span(group: &[Block]) -> usize {
    match (group.first(), group.last()) {
        (Some(first), Some(last)) => last.end - first.start + 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: usize, end: usize) -> Block {
        Block { start, end }
    }

    #[test]
    fn test_group_blocks() {
        let blocks = [block(0, 9), block(12, 20), block(60, 70), block(72, 80)];
        let groups = group_blocks(&blocks, 16);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn test_density_confidence_bounds() {
        assert!((density_confidence(1, 256) - 0.753_125).abs() < 1e-9);
        assert!((density_confidence(10, 100) - 0.8).abs() < 1e-9);
        assert_eq!(density_confidence(0, 0), 0.0);
    }

    #[test]
    fn test_find_sequences_picks_largest_group() {
        let mut data = vec![0xEAu8; 0x300];
        // lone block
        data[0x20] = 0x00;
        data[0x21..0x26].copy_from_slice(&[0x10, 0x11, 0x12, 0x13, 0x7F]);
        // cluster of three
        data[0x100] = 0x00;
        data[0x101..0x106].copy_from_slice(&[0x20, 0x21, 0x22, 0x23, 0x7F]);
        data[0x106..0x10C].copy_from_slice(&[0x24, 0x25, 0x26, 0x27, 0x28, 0x7F]);
        data[0x10C..0x111].copy_from_slice(&[0x29, 0x2A, 0x2B, 0x2C, 0x7F]);
        let image = MemoryImage::new(0x1000, data).unwrap();

        let table = find_sequences(&image, 256, 16).unwrap();
        assert_eq!(table.role, TableRole::Sequence);
        assert_eq!(table.address, 0x1101);
        assert_eq!(table.size, 0x10);
        assert!(table.confidence >= 0.75 && table.confidence <= 0.8);
    }

    #[test]
    fn test_no_markers_no_sequences() {
        let image = MemoryImage::new(0x1000, vec![0u8; 1000]).unwrap();
        assert!(find_sequences(&image, 256, 16).is_none());
    }
}
