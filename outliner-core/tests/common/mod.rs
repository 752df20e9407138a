#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::bail;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use outliner_core::{
    entities::{BBox, Detection, LayoutLabel, PageID},
    layout::LayoutDetector,
    ocr::{RecognizedText, TextRecognizer},
    parse::WorkerModels,
    pdf::{NativePage, NativeTextBlock, PageSplit, PdfBackend, PdfSource},
    ExtractConfig, InputDocument,
};

/// Letter size in points, rendered at 100 DPI.
pub const PAGE_SIZE: (f32, f32) = (612.0, 792.0);
pub const RASTER_SIZE: (u32, u32) = (850, 1100);

/// Raster pixels per document point.
const SCALE: f32 = 100.0 / 72.0;

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub detections: Vec<Detection>,
    pub text_blocks: Vec<NativeTextBlock>,
    pub fail_split: bool,
}

impl FakePage {
    /// Adds a detection with matching native text at the same place. `bbox`
    /// is in document points.
    pub fn with_text(mut self, label: LayoutLabel, bbox: BBox, text: &str, conf: f32) -> Self {
        self.text_blocks.push(NativeTextBlock {
            bbox,
            text: text.to_owned(),
        });
        self.with_region(label, bbox, conf)
    }

    /// Adds a detection with no native text under it.
    pub fn with_region(mut self, label: LayoutLabel, bbox: BBox, conf: f32) -> Self {
        self.detections.push(Detection {
            bbox: bbox.scale(SCALE, SCALE),
            label,
            confidence: conf,
        });
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeDoc {
    pub path: PathBuf,
    pub pages: Vec<FakePage>,
}

/// In-memory documents. Rasters carry `(doc index, page index)` in their
/// top-left pixel, fragments in their two bytes.
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub docs: Vec<FakeDoc>,
}

impl FakeBackend {
    pub fn add(&mut self, name: &str, pages: Vec<FakePage>) -> InputDocument {
        let path = PathBuf::from("/fixtures").join(name);
        self.docs.push(FakeDoc {
            path: path.clone(),
            pages,
        });
        InputDocument::new(name, path)
    }

    fn page(&self, doc: u8, page: u8) -> anyhow::Result<&FakePage> {
        match self
            .docs
            .get(doc as usize)
            .and_then(|d| d.pages.get(page as usize))
        {
            Some(p) => Ok(p),
            None => bail!("no page {page} in document {doc}"),
        }
    }
}

struct FakeSource<'a> {
    index: u8,
    doc: &'a FakeDoc,
}

impl PdfSource for FakeSource<'_> {
    fn page_count(&self) -> usize {
        self.doc.pages.len()
    }

    fn split_page(&self, page: PageID, _dpi: f32) -> anyhow::Result<PageSplit> {
        if self.doc.pages[page].fail_split {
            bail!("can't render page {page}");
        }
        let mut raster = RgbImage::from_pixel(RASTER_SIZE.0, RASTER_SIZE.1, Rgb([255, 255, 255]));
        raster.put_pixel(0, 0, Rgb([self.index, page as u8, 0]));
        Ok(PageSplit {
            page,
            raster: DynamicImage::ImageRgb8(raster),
            fragment: vec![self.index, page as u8],
        })
    }
}

impl PdfBackend for FakeBackend {
    fn open<'a>(&'a self, path: &Path) -> anyhow::Result<Box<dyn PdfSource + 'a>> {
        match self.docs.iter().position(|d| d.path == path) {
            Some(index) => Ok(Box::new(FakeSource {
                index: index as u8,
                doc: &self.docs[index],
            })),
            None => bail!("{} is not a PDF", path.display()),
        }
    }

    fn read_fragment(&self, fragment: &[u8]) -> anyhow::Result<NativePage> {
        let [doc, page] = fragment else {
            bail!("bad fragment");
        };
        Ok(NativePage {
            width: PAGE_SIZE.0,
            height: PAGE_SIZE.1,
            text_blocks: self.page(*doc, *page)?.text_blocks.clone(),
        })
    }
}

/// Returns the scripted detections of the page encoded in the raster.
pub struct ScriptedDetector {
    pub backend: Arc<FakeBackend>,
    pub delay: Option<Duration>,
}

impl LayoutDetector for ScriptedDetector {
    fn detect(&self, page: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let key = page.get_pixel(0, 0);
        Ok(self.backend.page(key[0], key[1])?.detections.clone())
    }
}

/// Answers every crop with the same fragments.
pub struct ScriptedOcr {
    pub fragments: Vec<RecognizedText>,
}

impl TextRecognizer for ScriptedOcr {
    fn recognize(&self, _crop: &DynamicImage) -> anyhow::Result<Vec<RecognizedText>> {
        Ok(self.fragments.clone())
    }
}

pub fn ocr(fragments: &[(&str, f32)]) -> Vec<RecognizedText> {
    fragments
        .iter()
        .map(|(text, confidence)| RecognizedText {
            text: (*text).to_owned(),
            confidence: *confidence,
        })
        .collect()
}

pub fn bbox(x0: f32, y0: f32, x1: f32, y1: f32) -> BBox {
    BBox { x0, y0, x1, y1 }
}

pub fn test_config(workers: usize) -> ExtractConfig {
    ExtractConfig {
        workers,
        task_capacity: 2,
        result_capacity: 2,
        result_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

/// Model loader for `OutlineExtractor::start`.
pub fn scripted_models(
    backend: Arc<FakeBackend>,
    ocr_fragments: Vec<RecognizedText>,
    delay: Option<Duration>,
) -> impl Fn(usize) -> anyhow::Result<WorkerModels> + Send + Sync + 'static {
    move |_id| {
        Ok(WorkerModels {
            detector: Box::new(ScriptedDetector {
                backend: Arc::clone(&backend),
                delay,
            }),
            recognizer: Box::new(ScriptedOcr {
                fragments: ocr_fragments.clone(),
            }),
        })
    }
}
