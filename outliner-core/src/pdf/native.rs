use pdfium_render::prelude::{PdfFontWeight, PdfPageTextChar};
use plsfix::fix_text;

use super::NativeTextBlock;
use crate::entities::BBox;

/// Run of consecutive chars sharing font and rotation.
pub(crate) struct CharSpan {
    pub bbox: BBox,
    pub text: String,
    pub rotation: f32,
    pub font_name: String,
    pub font_size: f32,
    pub font_weight: Option<PdfFontWeight>,
}

impl CharSpan {
    fn new_from_char(char: &PdfPageTextChar, char_bbox: BBox) -> Self {
        Self {
            bbox: char_bbox,
            text: char.unicode_char().unwrap_or_default().into(),
            font_name: char.font_name(),
            font_weight: char.font_weight(),
            font_size: char.unscaled_font_size().value,
            rotation: char.get_rotation_clockwise_degrees(),
        }
    }

    fn same_style(&self, char: &PdfPageTextChar) -> bool {
        char.unscaled_font_size().value == self.font_size
            && char.font_name() == self.font_name
            && char.font_weight() == self.font_weight
            && char.get_rotation_clockwise_degrees() == self.rotation
    }

    fn push(&mut self, char: &PdfPageTextChar, char_bbox: &BBox) {
        self.text.push(char.unicode_char().unwrap_or_default());
        self.bbox.merge(char_bbox);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TextLine {
    pub text: String,
    pub bbox: BBox,
    pub rotation: f32,
}

impl TextLine {
    fn new_from_span(span: CharSpan) -> Self {
        Self {
            bbox: span.bbox,
            text: span.text,
            rotation: span.rotation,
        }
    }

    /// Gives the span back when it starts a new line.
    fn append(&mut self, span: CharSpan) -> Result<(), CharSpan> {
        if span.rotation != self.rotation
        // pdfium doesn't always inject a linebreak, check positions too
        || span.bbox.y0 > self.bbox.y1
        || self.text.ends_with('\n') || self.text.ends_with('\x02')
        {
            Err(span)
        } else {
            self.bbox.merge(&span.bbox);
            self.text.push_str(&span.text);
            Ok(())
        }
    }
}

pub(crate) fn parse_text_spans<'a>(
    chars: impl Iterator<Item = PdfPageTextChar<'a>>,
    page_height: f32,
) -> Vec<CharSpan> {
    let mut spans: Vec<CharSpan> = Vec::new();

    for char in chars {
        // Generated chars (e.g. implicit spaces) may have no bounds
        let Ok(rect) = char.tight_bounds() else {
            continue;
        };
        let char_bbox = BBox::from_pdfrect(rect, page_height);
        match spans.last_mut() {
            Some(span) if span.same_style(&char) => span.push(&char, &char_bbox),
            _ => spans.push(CharSpan::new_from_char(&char, char_bbox)),
        }
    }

    spans
}

pub(crate) fn parse_text_lines(spans: Vec<CharSpan>) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    for span in spans {
        let rejected = match lines.last_mut() {
            Some(line) => line.append(span).err(),
            None => Some(span),
        };
        if let Some(span) = rejected {
            lines.push(TextLine::new_from_span(span));
        }
    }
    lines
}

pub(crate) fn into_text_blocks(lines: Vec<TextLine>) -> Vec<NativeTextBlock> {
    lines
        .into_iter()
        .filter_map(|line| {
            let text = fix_text(&line.text, None);
            let text = text.trim();
            (!text.is_empty()).then(|| NativeTextBlock {
                bbox: line.bbox,
                text: text.to_owned(),
            })
        })
        .collect()
}
