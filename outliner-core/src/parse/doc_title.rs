use itertools::Itertools;

use crate::entities::{Block, BlockKind};

// Vertical window for joining title fragments around the anchor
const MERGE_BELOW_ANCHOR: f32 = 10.0;
const MERGE_MAX_TOP_DELTA: f32 = 100.0;

/// Weighted title likelihood of a block, in roughly `[0, 1]`:
/// relative height, detection confidence, horizontal centering and
/// closeness to the top of the page.
pub fn title_score(block: &Block, page_width: f32, page_height: f32) -> f32 {
    let (page_width, page_height) = (page_width.max(1.0), page_height.max(1.0));
    let (cx, _) = block.bbox.center();
    let size = block.bbox.height() / page_height;
    let centering = 1.0 - (cx - page_width / 2.0).abs() / (page_width / 2.0);
    let top = 1.0 - block.bbox.y0 / page_height;
    0.4 * size + 0.4 * block.confidence + 0.1 * centering + 0.1 * top
}

/// Picks the document title from its sorted blocks.
///
/// Title blocks on the earliest page holding one are scored, the best one
/// anchors a merge of fragments on the same visual band, read left to
/// right. Without any Title block, the topmost page 0 Section-header wins,
/// then the topmost non-empty page 0 block. Returns an empty string when
/// nothing qualifies.
pub fn detect_title(blocks: &[Block]) -> String {
    let Some(first_page) = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Title)
        .map(|b| b.page)
        .min()
    else {
        return fallback_title(blocks);
    };

    let candidates: Vec<&Block> = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Title && b.page == first_page)
        .collect();
    // Page extent estimated from the candidates themselves
    let page_width = candidates.iter().map(|b| b.bbox.x1).fold(0f32, f32::max);
    let page_height = candidates.iter().map(|b| b.bbox.y1).fold(0f32, f32::max);

    let mut anchor = candidates[0];
    let mut best = title_score(anchor, page_width, page_height);
    for candidate in &candidates[1..] {
        let score = title_score(candidate, page_width, page_height);
        // Ties keep the earliest block
        if score > best {
            best = score;
            anchor = *candidate;
        }
    }
    tracing::debug!("title anchor on page {first_page} with score {best:.3}");

    candidates
        .iter()
        .filter(|b| {
            b.bbox.y0 <= anchor.bbox.y1 + MERGE_BELOW_ANCHOR
                && (b.bbox.y0 - anchor.bbox.y0).abs() < MERGE_MAX_TOP_DELTA
        })
        .sorted_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0))
        .map(|b| b.text.trim())
        .filter(|t| !t.is_empty())
        .join(" ")
}

fn fallback_title(blocks: &[Block]) -> String {
    let first_page = || blocks.iter().filter(|b| b.page == 0);

    let header = first_page()
        .filter(|b| b.kind == BlockKind::SectionHeader && !b.text.trim().is_empty())
        .min_by(|a, b| {
            a.bbox
                .y0
                .total_cmp(&b.bbox.y0)
                .then(b.bbox.height().total_cmp(&a.bbox.height()))
        });
    if let Some(header) = header {
        return header.text.trim().to_owned();
    }

    first_page()
        .filter(|b| !b.text.trim().is_empty())
        .min_by(|a, b| a.bbox.y0.total_cmp(&b.bbox.y0))
        .map(|b| b.text.trim().to_owned())
        .unwrap_or_default()
}
