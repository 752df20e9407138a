use crate::{entities::BBox, pdf::NativeTextBlock};

/// Collapses linebreaks, bullet glyphs and whitespace runs into single
/// spaces and trims the result.
pub fn normalize_text(text: &str) -> String {
    text.replace('\n', " ")
        .replace('•', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Concatenates the text of every native block overlapping `region`, in
/// the order the blocks are given, then normalizes it.
///
/// `region` and the blocks must be in the same (document) space.
pub fn associate_text(region: &BBox, blocks: &[NativeTextBlock]) -> String {
    let collected = blocks
        .iter()
        .filter(|block| region.overlaps(&block.bbox))
        .map(|block| block.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&collected)
}
