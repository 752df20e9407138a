use image::DynamicImage;

pub mod crnn;
mod lines;

pub use lines::segment_lines;

/// One recognized text fragment with its recognition confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: f32,
}

/// Optical text recognition over a cropped region.
///
/// Built once per worker, like [`crate::layout::LayoutDetector`].
pub trait TextRecognizer {
    /// Fragments are returned in reading order. An empty vec means nothing
    /// legible was found.
    fn recognize(&self, crop: &DynamicImage) -> anyhow::Result<Vec<RecognizedText>>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(&self, crop: &DynamicImage) -> anyhow::Result<Vec<RecognizedText>> {
        (**self).recognize(crop)
    }
}
