use std::path::Path;

use image::DynamicImage;

use crate::entities::{BBox, PageID};

pub(crate) mod native;
pub mod pdfium;

/// A text block from a PDF's native text layer, in document space.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTextBlock {
    pub bbox: BBox,
    pub text: String,
}

/// Native text layer of a single-page fragment.
#[derive(Debug, Clone, Default)]
pub struct NativePage {
    pub width: f32,
    pub height: f32,
    pub text_blocks: Vec<NativeTextBlock>,
}

/// One page cut out of a source document.
pub struct PageSplit {
    pub page: PageID,
    pub raster: DynamicImage,
    /// Self-contained single-page PDF holding only this page.
    pub fragment: Vec<u8>,
}

/// An opened source document.
pub trait PdfSource {
    fn page_count(&self) -> usize;

    /// Renders page `page` at `dpi` and exports it as a single-page PDF.
    fn split_page(&self, page: PageID, dpi: f32) -> anyhow::Result<PageSplit>;
}

/// PDF capabilities the pipeline needs.
///
/// One backend is shared by the producer and every worker.
pub trait PdfBackend: Send + Sync {
    fn open<'a>(&'a self, path: &Path) -> anyhow::Result<Box<dyn PdfSource + 'a>>;

    /// Reads the native text layer of a single-page fragment.
    fn read_fragment(&self, fragment: &[u8]) -> anyhow::Result<NativePage>;
}
