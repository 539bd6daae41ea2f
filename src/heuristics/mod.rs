//! Heuristic memory analysis.
//!
//! This module proposes table locations inside an unannotated memory image.
//! Independent detectors each contribute candidates; the merged set is
//! deduplicated so that no two survivors overlap and the most confident
//! proposals win.

pub mod detectors;

use crate::types::{ConverterOptions, MemoryImage, TableCandidate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

pub use detectors::*;

/// Likely split between player code and player data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeDataBoundary {
    /// Address of the longest zero run
    pub address: u16,
    /// Length of that run
    pub run_length: usize,
}

/// Result of analyzing one memory image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryAnalysis {
    /// Deduplicated, non-overlapping table candidates
    pub candidates: Vec<TableCandidate>,
    /// Zero runs (boundary inference only, never table candidates)
    pub zero_runs: Vec<TableCandidate>,
    /// Diagnostic code/data split point
    pub boundary: Option<CodeDataBoundary>,
}

impl MemoryAnalysis {
    /// Highest-confidence candidate, if any.
    pub fn best(&self) -> Option<&TableCandidate> {
        self.candidates.first()
    }
}

/// Analyze a memory image and return deduplicated table candidates.
pub fn analyze(image: &MemoryImage, options: &ConverterOptions) -> MemoryAnalysis {
    let zero_runs = detectors::zero_run_candidates(image, options.min_zero_run);
    let boundary = longest_zero_run(&zero_runs);

    let mut all = Vec::new();
    all.extend(detectors::frequency_candidates(
        image,
        options.frequency_window,
        options.frequency_threshold,
    ));
    all.extend(detectors::bounded_block_candidates(
        image,
        options.analyzer_lookback,
    ));
    all.extend(detectors::ascending_pair_candidates(image));
    let raw = all.len();

    let candidates = dedupe(all, options.max_candidates);
    debug!(
        raw,
        kept = candidates.len(),
        zero_runs = zero_runs.len(),
        "memory analysis complete"
    );

    MemoryAnalysis {
        candidates,
        zero_runs,
        boundary,
    }
}

/// Keep the most confident candidates whose ranges do not intersect.
///
/// Candidates are ranked by confidence (ties broken by address), accepted
/// greedily when they overlap nothing already kept, and capped at `limit`.
pub fn dedupe(mut candidates: Vec<TableCandidate>, limit: usize) -> Vec<TableCandidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then(a.address.cmp(&b.address))
    });

    let mut kept: Vec<TableCandidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= limit {
            break;
        }
        if kept.iter().all(|k| !k.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }
    kept
}

/// The single longest zero run; the earliest wins ties.
pub fn longest_zero_run(runs: &[TableCandidate]) -> Option<CodeDataBoundary> {
    runs.iter()
        .fold(None::<&TableCandidate>, |best, run| match best {
            Some(b) if b.size >= run.size => Some(b),
            _ => Some(run),
        })
        .map(|run| CodeDataBoundary {
            address: run.address,
            run_length: run.size,
        })
}
