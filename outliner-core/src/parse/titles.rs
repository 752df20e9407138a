use ndarray::Array2;

use super::{
    kmeans::{kmeans, standardize, KMEANS_SEED},
    text::normalize_text,
};
use crate::entities::{Block, BlockKind, HeadingLevel, OutlineEntry};

pub const DEFAULT_HEADING_LEVELS: usize = 3;

/// Section headers below this confidence are not outline candidates.
const MIN_HEADING_CONFIDENCE: f32 = 0.3;
const MIN_HEADING_CHARS: usize = 2;

/// Layout features per heading: height, width, center x, top, text length,
/// confidence.
pub const HEADING_FEATURES: usize = 6;

pub(crate) fn is_heading_candidate(block: &Block) -> bool {
    block.kind == BlockKind::SectionHeader
        && block.confidence >= MIN_HEADING_CONFIDENCE
        && block.text.trim().chars().count() >= MIN_HEADING_CHARS
}

fn heading_features(block: &Block) -> [f64; HEADING_FEATURES] {
    let (cx, _) = block.bbox.center();
    [
        block.bbox.height() as f64,
        block.bbox.width() as f64,
        cx as f64,
        block.bbox.y0 as f64,
        block.text.trim().chars().count() as f64,
        block.confidence as f64,
    ]
}

/// Groups section headers into at most `max_levels` levels by clustering
/// their standardized layout features. Clusters are ranked by mean raw
/// height, tallest first: `H1`, `H2`, ...
///
/// Entries keep the order of `blocks`.
pub fn title_levels_kmeans(blocks: &[Block], max_levels: usize) -> Vec<OutlineEntry> {
    let headings: Vec<&Block> = blocks.iter().filter(|b| is_heading_candidate(b)).collect();
    if headings.is_empty() {
        return Vec::new();
    }

    let mut features = Array2::<f64>::zeros((headings.len(), HEADING_FEATURES));
    for (mut row, block) in features.outer_iter_mut().zip(headings.iter()) {
        for (dst, src) in row.iter_mut().zip(heading_features(block)) {
            *dst = src;
        }
    }
    let k = max_levels.max(1).min(headings.len());
    let clusters = kmeans(&standardize(&features), k, KMEANS_SEED);

    // (cluster, height sum, count) in order of first appearance
    let mut cluster_heights: Vec<(usize, f64, usize)> = Vec::new();
    for (block, &cluster) in headings.iter().zip(clusters.assignments.iter()) {
        let height = block.bbox.height() as f64;
        match cluster_heights.iter_mut().find(|(c, _, _)| *c == cluster) {
            Some((_, sum, count)) => {
                *sum += height;
                *count += 1;
            }
            None => cluster_heights.push((cluster, height, 1)),
        }
    }
    let mut ranked: Vec<(usize, f64)> = cluster_heights
        .into_iter()
        .map(|(cluster, sum, count)| (cluster, sum / count as f64))
        .collect();
    // Stable: equal means keep first-appearance order
    ranked.sort_by(|(_, h1), (_, h2)| h2.total_cmp(h1));

    headings
        .iter()
        .zip(clusters.assignments.iter())
        .map(|(block, cluster)| {
            let rank = ranked
                .iter()
                .position(|(c, _)| c == cluster)
                .unwrap_or_default();
            OutlineEntry {
                level: HeadingLevel(rank as u8 + 1),
                text: normalize_text(&block.text),
                page: block.page,
            }
        })
        .collect()
}
