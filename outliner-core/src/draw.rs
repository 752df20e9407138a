use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::entities::{BBox, Block, BlockKind, Detection, LayoutLabel, PageID};

const TITLE_COLOR: [u8; 4] = [209, 139, 0, 255];
const HEADER_COLOR: [u8; 4] = [255, 0, 0, 255];
const TEXT_COLOR: [u8; 4] = [17, 138, 1, 255];

fn label_color(label: LayoutLabel) -> [u8; 4] {
    match label {
        LayoutLabel::Caption => [255, 128, 0, 255],
        LayoutLabel::Footnote => [128, 0, 128, 255],
        LayoutLabel::Formula => [0, 128, 128, 255],
        LayoutLabel::ListItem => [0, 200, 200, 255],
        LayoutLabel::PageFooter => [128, 128, 128, 255],
        LayoutLabel::PageHeader => [64, 64, 64, 255],
        LayoutLabel::Picture => [255, 0, 255, 255],
        LayoutLabel::SectionHeader => HEADER_COLOR,
        LayoutLabel::Table => [0, 0, 255, 255],
        LayoutLabel::Text => TEXT_COLOR,
        LayoutLabel::Title => TITLE_COLOR,
    }
}

fn draw_bbox(out_img: &mut RgbaImage, bbox: &BBox, color: [u8; 4]) {
    let x0 = bbox.x0 as i32;
    let y0 = bbox.y0 as i32;
    let width = (bbox.x1 as i32 - x0).max(1) as u32;
    let height = (bbox.y1 as i32 - y0).max(1) as u32;

    let rect = Rect::at(x0, y0).of_size(width, height);
    draw_hollow_rect_mut(out_img, rect, Rgba(color));
}

pub(crate) fn draw_detections(detections: &[Detection], page_img: &DynamicImage) -> RgbaImage {
    let mut out_img = page_img.to_rgba8();
    for detection in detections {
        draw_bbox(&mut out_img, &detection.bbox, label_color(detection.label));
    }
    out_img
}

pub(crate) fn draw_blocks(blocks: &[Block], page_img: &DynamicImage) -> RgbaImage {
    let mut out_img = page_img.to_rgba8();
    for block in blocks {
        let color = match block.kind {
            BlockKind::Title => TITLE_COLOR,
            BlockKind::SectionHeader => HEADER_COLOR,
            BlockKind::Text => TEXT_COLOR,
        };
        draw_bbox(&mut out_img, &block.bbox, color);
    }
    out_img
}

/// Writes `<stem>_page_<n>_layout.png` (raw detections) and
/// `<stem>_page_<n>_blocks.png` (kept blocks) to `debug_dir`.
pub(crate) fn debug_page(
    debug_dir: &Path,
    doc_stem: &str,
    page: PageID,
    page_img: &DynamicImage,
    detections: &[Detection],
    blocks: &[Block],
) -> anyhow::Result<()> {
    let layout_file = debug_dir.join(format!("{doc_stem}_page_{page}_layout.png"));
    let blocks_file = debug_dir.join(format!("{doc_stem}_page_{page}_blocks.png"));

    draw_detections(detections, page_img)
        .save(&layout_file)
        .with_context(|| format!("error saving {}", layout_file.display()))?;
    draw_blocks(blocks, page_img)
        .save(&blocks_file)
        .with_context(|| format!("error saving {}", blocks_file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_blocks_outline_only() {
        let page = DynamicImage::new_rgba8(50, 50);
        let block = Block {
            kind: BlockKind::Title,
            bbox: BBox {
                x0: 10.0,
                y0: 10.0,
                x1: 30.0,
                y1: 20.0,
            },
            text: String::new(),
            confidence: 1.0,
            page: 0,
        };
        let img = draw_blocks(&[block], &page);
        assert_eq!(img.get_pixel(10, 10).0, TITLE_COLOR);
        assert_eq!(img.get_pixel(29, 19).0, TITLE_COLOR);
        // Interior untouched
        assert_eq!(img.get_pixel(20, 15).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_detections_colored_by_label() {
        let page = DynamicImage::new_rgba8(60, 60);
        let detection = |label, x0: f32| Detection {
            bbox: BBox {
                x0,
                y0: 5.0,
                x1: x0 + 10.0,
                y1: 15.0,
            },
            label,
            confidence: 0.9,
        };
        let img = draw_detections(
            &[
                detection(LayoutLabel::Table, 5.0),
                detection(LayoutLabel::Picture, 25.0),
                detection(LayoutLabel::Title, 45.0),
            ],
            &page,
        );
        assert_eq!(img.get_pixel(5, 5).0, label_color(LayoutLabel::Table));
        assert_eq!(img.get_pixel(25, 5).0, label_color(LayoutLabel::Picture));
        assert_eq!(img.get_pixel(45, 5).0, TITLE_COLOR);

        let mut colors: Vec<_> = LayoutLabel::ALL.iter().map(|l| label_color(*l)).collect();
        colors.sort();
        colors.dedup();
        assert_eq!(colors.len(), LayoutLabel::ALL.len());
    }

    #[test]
    fn test_debug_page_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let page = DynamicImage::new_rgb8(40, 40);
        let detection = Detection {
            bbox: BBox {
                x0: 1.0,
                y0: 1.0,
                x1: 20.0,
                y1: 20.0,
            },
            label: LayoutLabel::Picture,
            confidence: 0.5,
        };
        debug_page(dir.path(), "report", 3, &page, &[detection], &[]).unwrap();
        assert!(dir.path().join("report_page_3_layout.png").exists());
        assert!(dir.path().join("report_page_3_blocks.png").exists());
    }
}
