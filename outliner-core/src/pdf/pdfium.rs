use std::path::Path;

use anyhow::Context;
use pdfium_render::prelude::{PdfDocument, PdfPageIndex, PdfRenderConfig, Pdfium};
use tracing::instrument;

use super::{
    native::{into_text_blocks, parse_text_lines, parse_text_spans},
    NativePage, PageSplit, PdfBackend, PdfSource,
};
use crate::entities::PageID;

/// Points per inch in PDF user space.
const PDF_POINTS_PER_INCH: f32 = 72.0;

pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl std::fmt::Debug for PdfiumBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumBackend").finish_non_exhaustive()
    }
}

impl PdfiumBackend {
    /// Binds the pdfium shared library from `lib_dir`, or from the system
    /// library path when no directory is given.
    pub fn new(lib_dir: Option<&Path>) -> anyhow::Result<Self> {
        let bindings = match lib_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                .with_context(|| format!("can't bind pdfium from {}", dir.display()))?,
            None => Pdfium::bind_to_system_library().context("can't bind system pdfium")?,
        };
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

struct PdfiumSource<'a> {
    pdfium: &'a Pdfium,
    document: PdfDocument<'a>,
}

impl PdfSource for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    #[instrument(skip(self))]
    fn split_page(&self, page: PageID, dpi: f32) -> anyhow::Result<PageSplit> {
        let index = PdfPageIndex::try_from(page).context("page index out of range")?;
        let pdf_page = self.document.pages().get(index)?;
        let raster = pdf_page
            .render_with_config(
                &PdfRenderConfig::default().scale_page_by_factor(dpi / PDF_POINTS_PER_INCH),
            )
            .map(|bitmap| bitmap.as_image())?;

        let mut fragment_doc = self.pdfium.create_new_pdf()?;
        fragment_doc
            .pages_mut()
            .copy_page_from_document(&self.document, index, 0)?;
        let fragment = fragment_doc.save_to_bytes()?;

        Ok(PageSplit {
            page,
            raster,
            fragment,
        })
    }
}

impl PdfBackend for PdfiumBackend {
    fn open<'a>(&'a self, path: &Path) -> anyhow::Result<Box<dyn PdfSource + 'a>> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, None)
            .with_context(|| format!("can't open pdf {}", path.display()))?;
        Ok(Box::new(PdfiumSource {
            pdfium: &self.pdfium,
            document,
        }))
    }

    #[instrument(skip_all)]
    fn read_fragment(&self, fragment: &[u8]) -> anyhow::Result<NativePage> {
        let document = self.pdfium.load_pdf_from_byte_slice(fragment, None)?;
        let page = document.pages().get(0)?;
        let (width, height) = (page.width().value, page.height().value);

        let spans = parse_text_spans(page.text()?.chars().iter(), height);
        let text_blocks = into_text_blocks(parse_text_lines(spans));

        Ok(NativePage {
            width,
            height,
            text_blocks,
        })
    }
}
