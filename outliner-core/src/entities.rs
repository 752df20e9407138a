use std::{fmt, path::PathBuf, time::Duration};

use image::DynamicImage;
use pdfium_render::prelude::PdfRect;
use serde::{Deserialize, Serialize};

pub type PageID = usize;

/// Documents are keyed by their file name (e.g. `report.pdf`).
pub type DocumentId = String;

#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Pdfium rects have a bottom-left origin, flip to top-left.
    pub(crate) fn from_pdfrect(rect: PdfRect, page_height: f32) -> Self {
        Self {
            x0: rect.left().value,
            y0: page_height - rect.top().value,
            x1: rect.right().value,
            y1: page_height - rect.bottom().value,
        }
    }

    #[inline(always)]
    pub fn center(&self) -> (f32, f32) {
        (
            self.x0 + self.width() / 2f32,
            self.y0 + self.height() / 2f32,
        )
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }
    #[inline(always)]
    pub fn area(&self) -> f32 {
        self.height() * self.width()
    }

    #[inline(always)]
    pub(crate) fn merge(&mut self, other: &Self) {
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
    }
    #[inline(always)]
    fn overlap_x(&self, other: &Self) -> f32 {
        f32::max(
            0f32,
            f32::min(self.x1, other.x1) - f32::max(self.x0, other.x0),
        )
    }
    #[inline(always)]
    fn overlap_y(&self, other: &Self) -> f32 {
        f32::max(
            0f32,
            f32::min(self.y1, other.y1) - f32::max(self.y0, other.y0),
        )
    }

    #[inline(always)]
    pub fn intersection(&self, other: &Self) -> f32 {
        self.overlap_x(other) * self.overlap_y(other)
    }

    /// Intersection over the smaller of the two areas.
    #[inline(always)]
    pub fn relaxed_iou(&self, other: &Self) -> f32 {
        let a = self.intersection(other);
        let b = self.area().min(other.area());
        a / b
    }

    /// Half-plane separation test: two boxes overlap unless one lies strictly
    /// to the left, right, above or below the other. Touching edges overlap.
    #[inline(always)]
    pub fn overlaps(&self, other: &Self) -> bool {
        !(other.x1 < self.x0 || other.x0 > self.x1 || other.y1 < self.y0 || other.y0 > self.y1)
    }

    /// Grows the box by `padding` on every side, then clamps it to
    /// `[0, width] x [0, height]`. Returns `None` for a degenerate result or
    /// any non-finite input.
    pub fn pad_and_clip(&self, padding: f32, bounds: (u32, u32)) -> Option<Self> {
        // f32::max/min swallow NaN, so reject before clamping
        if ![self.x0, self.y0, self.x1, self.y1, padding]
            .iter()
            .all(|v| v.is_finite())
        {
            return None;
        }
        let (width, height) = (bounds.0 as f32, bounds.1 as f32);
        let padded = Self {
            x0: (self.x0 - padding).max(0f32),
            y0: (self.y0 - padding).max(0f32),
            x1: (self.x1 + padding).min(width),
            y1: (self.y1 + padding).min(height),
        };
        if padded.x0 < padded.x1 && padded.y0 < padded.y1 {
            Some(padded)
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn scale(&self, scale_x: f32, scale_y: f32) -> Self {
        Self {
            x0: self.x0 * scale_x,
            y0: self.y0 * scale_y,
            x1: self.x1 * scale_x,
            y1: self.y1 * scale_y,
        }
    }

    /// Maps a raster-space box to document (point) space using independent
    /// x/y scale factors. No rotation or skew handling.
    pub fn to_document_space(&self, image_size: (u32, u32), page_size: (f32, f32)) -> Self {
        self.scale(
            page_size.0 / image_size.0 as f32,
            page_size.1 / image_size.1 as f32,
        )
    }

    /// Inverse of [`BBox::to_document_space`].
    pub fn to_raster_space(&self, image_size: (u32, u32), page_size: (f32, f32)) -> Self {
        self.scale(
            image_size.0 as f32 / page_size.0,
            image_size.1 as f32 / page_size.1,
        )
    }

    /// Drops the fractional part of every coordinate.
    pub fn truncated(&self) -> Self {
        Self {
            x0: self.x0.trunc(),
            y0: self.y0.trunc(),
            x1: self.x1.trunc(),
            y1: self.y1.trunc(),
        }
    }
}

/// DocLayNet classes, in the class-id order of the layout model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutLabel {
    Caption,
    Footnote,
    Formula,
    ListItem,
    PageFooter,
    PageHeader,
    Picture,
    SectionHeader,
    Table,
    Text,
    Title,
}

impl LayoutLabel {
    pub const ALL: [LayoutLabel; 11] = [
        LayoutLabel::Caption,
        LayoutLabel::Footnote,
        LayoutLabel::Formula,
        LayoutLabel::ListItem,
        LayoutLabel::PageFooter,
        LayoutLabel::PageHeader,
        LayoutLabel::Picture,
        LayoutLabel::SectionHeader,
        LayoutLabel::Table,
        LayoutLabel::Text,
        LayoutLabel::Title,
    ];

    pub fn from_class_id(class_id: usize) -> Option<Self> {
        Self::ALL.get(class_id).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutLabel::Caption => "Caption",
            LayoutLabel::Footnote => "Footnote",
            LayoutLabel::Formula => "Formula",
            LayoutLabel::ListItem => "List-item",
            LayoutLabel::PageFooter => "Page-footer",
            LayoutLabel::PageHeader => "Page-header",
            LayoutLabel::Picture => "Picture",
            LayoutLabel::SectionHeader => "Section-header",
            LayoutLabel::Table => "Table",
            LayoutLabel::Text => "Text",
            LayoutLabel::Title => "Title",
        }
    }
}

impl fmt::Display for LayoutLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw layout model output, in raster pixel space.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BBox,
    pub label: LayoutLabel,
    pub confidence: f32,
}

/// The three layout classes that carry outline information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Title,
    SectionHeader,
    Text,
}

impl BlockKind {
    pub fn from_label(label: LayoutLabel) -> Option<Self> {
        match label {
            LayoutLabel::Title => Some(BlockKind::Title),
            LayoutLabel::SectionHeader => Some(BlockKind::SectionHeader),
            LayoutLabel::Text => Some(BlockKind::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    /// Integer pixel box in the raster the block was detected on.
    pub bbox: BBox,
    pub text: String,
    pub confidence: f32,
    pub page: PageID,
}

/// Everything a worker extracted from one page.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub doc_id: DocumentId,
    pub page: PageID,
    pub blocks: Vec<Block>,
}

impl PageResult {
    pub fn empty(doc_id: DocumentId, page: PageID) -> Self {
        Self {
            doc_id,
            page,
            blocks: Vec::new(),
        }
    }
}

/// One unit of work: a rendered page plus its isolated single-page PDF.
pub struct Task {
    pub doc_id: DocumentId,
    pub page: PageID,
    pub raster: DynamicImage,
    pub fragment: Vec<u8>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("doc_id", &self.doc_id)
            .field("page", &self.page)
            .field("raster", &(self.raster.width(), self.raster.height()))
            .field("fragment_len", &self.fragment.len())
            .finish()
    }
}

/// Heading rank, serialized as `"H1"`, `"H2"`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct HeadingLevel(pub u8);

impl fmt::Display for HeadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

impl From<HeadingLevel> for String {
    fn from(level: HeadingLevel) -> Self {
        level.to_string()
    }
}

impl TryFrom<String> for HeadingLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .strip_prefix('H')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| *n > 0)
            .map(HeadingLevel)
            .ok_or_else(|| format!("invalid heading level: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutlineEntry {
    pub level: HeadingLevel,
    pub text: String,
    pub page: PageID,
}

/// Final per-document output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DocumentRecord {
    pub title: String,
    pub outline: Vec<OutlineEntry>,
}

#[derive(Debug, Clone)]
pub struct InputDocument {
    pub doc_id: DocumentId,
    pub path: PathBuf,
}

impl InputDocument {
    pub fn new(doc_id: impl Into<DocumentId>, path: impl Into<PathBuf>) -> Self {
        Self {
            doc_id: doc_id.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDocument {
    pub doc_id: DocumentId,
    pub record: DocumentRecord,
}

/// Summary of one pipeline run: every input document ends up either
/// completed or failed.
#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<CompletedDocument>,
    pub failed: Vec<crate::error::DocumentFailure>,
    pub elapsed: Duration,
    /// Why aggregation stopped early, if it did.
    pub aborted: Option<crate::error::AggregationError>,
}
