use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use image::GenericImageView;
use tracing::instrument;

use super::text::associate_text;
use crate::{
    draw::debug_page,
    entities::{BBox, Block, BlockKind, Detection, PageResult, Task},
    layout::LayoutDetector,
    ocr::TextRecognizer,
    pdf::{NativePage, PdfBackend},
    utils::doc_stem,
};

/// Confidence assigned to OCR'd blocks when the recognizer finds nothing.
pub const EMPTY_OCR_CONFIDENCE: f32 = 0.5;

/// Models one worker owns for its whole lifetime.
pub struct WorkerModels {
    pub detector: Box<dyn LayoutDetector>,
    pub recognizer: Box<dyn TextRecognizer>,
}

/// Everything a worker needs to turn a [`Task`] into a [`PageResult`].
pub struct WorkerContext {
    pub(crate) models: WorkerModels,
    pub(crate) backend: Arc<dyn PdfBackend>,
    pub(crate) padding: f32,
    pub(crate) debug_dir: Option<PathBuf>,
}

/// Processes one page. Never fails: a page-level error is logged and
/// yields an empty result so the document can still complete.
#[instrument(skip_all, fields(doc = %task.doc_id, page = task.page))]
pub fn parse_page(ctx: &WorkerContext, task: Task) -> PageResult {
    let start = Instant::now();
    let Task {
        doc_id,
        page,
        raster,
        fragment,
    } = task;

    match extract_page_blocks(ctx, &doc_id, page, &raster, &fragment) {
        Ok(blocks) => {
            tracing::debug!(
                "page done with {} blocks in {}ms",
                blocks.len(),
                start.elapsed().as_millis()
            );
            PageResult {
                doc_id,
                page,
                blocks,
            }
        }
        Err(e) => {
            tracing::error!("error processing page: {e:#}");
            PageResult::empty(doc_id, page)
        }
    }
}

fn extract_page_blocks(
    ctx: &WorkerContext,
    doc_id: &str,
    page: usize,
    raster: &image::DynamicImage,
    fragment: &[u8],
) -> anyhow::Result<Vec<Block>> {
    let image_size = raster.dimensions();
    anyhow::ensure!(
        image_size.0 > 0 && image_size.1 > 0,
        "empty page raster {image_size:?}"
    );

    let detections = ctx
        .models
        .detector
        .detect(raster)
        .context("layout detection failed")?;
    let native = ctx
        .backend
        .read_fragment(fragment)
        .context("can't read page fragment")?;
    anyhow::ensure!(
        native.width > 0.0 && native.height > 0.0,
        "invalid page size {}x{}",
        native.width,
        native.height
    );

    let mut blocks = Vec::new();
    for detection in &detections {
        let Some(kind) = BlockKind::from_label(detection.label) else {
            continue;
        };
        match build_block(ctx, kind, detection, raster, &native, page) {
            Ok(Some(block)) => blocks.push(block),
            Ok(None) => {
                tracing::trace!("skipping degenerate {} box", detection.label);
            }
            Err(e) => {
                tracing::error!("error processing {} detection: {e:#}", detection.label);
            }
        }
    }

    if let Some(debug_dir) = &ctx.debug_dir {
        let stem = doc_stem(doc_id);
        if let Err(e) = debug_page(debug_dir, &stem, page, raster, &detections, &blocks) {
            tracing::warn!("can't write debug images: {e:#}");
        }
    }

    Ok(blocks)
}

fn build_block(
    ctx: &WorkerContext,
    kind: BlockKind,
    detection: &Detection,
    raster: &image::DynamicImage,
    native: &NativePage,
    page: usize,
) -> anyhow::Result<Option<Block>> {
    let image_size = raster.dimensions();
    let Some(region) = detection.bbox.pad_and_clip(ctx.padding, image_size) else {
        return Ok(None);
    };
    let doc_region = region.to_document_space(image_size, (native.width, native.height));
    let text = associate_text(&doc_region, &native.text_blocks);

    let (text, confidence) = if text.is_empty() {
        ocr_region(ctx, raster, &region)?
    } else {
        (text, detection.confidence)
    };

    Ok(Some(Block {
        kind,
        bbox: region.truncated(),
        text,
        confidence,
        page,
    }))
}

/// Recognizes the text of a region with no native text. The confidence is
/// the mean fragment confidence.
fn ocr_region(
    ctx: &WorkerContext,
    raster: &image::DynamicImage,
    region: &BBox,
) -> anyhow::Result<(String, f32)> {
    let crop_box = region.truncated();
    let (x, y) = (crop_box.x0 as u32, crop_box.y0 as u32);
    let width = (crop_box.width() as u32).max(1);
    let height = (crop_box.height() as u32).max(1);
    let crop = raster.crop_imm(x, y, width, height);

    let fragments = ctx
        .models
        .recognizer
        .recognize(&crop)
        .context("ocr failed")?;
    if fragments.is_empty() {
        return Ok((String::new(), EMPTY_OCR_CONFIDENCE));
    }

    let confidence =
        fragments.iter().map(|f| f.confidence).sum::<f32>() / fragments.len() as f32;
    let text = fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Ok((text.trim().to_owned(), confidence))
}
