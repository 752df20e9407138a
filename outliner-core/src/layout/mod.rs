use image::DynamicImage;

use crate::entities::Detection;

pub mod model;

/// Page layout detection over a rendered raster.
///
/// Implementations are built once per worker and are never shared across
/// threads, so they don't need to be `Send` or `Sync`.
pub trait LayoutDetector {
    /// Returns every detected region in raster pixel space. Order is
    /// unspecified.
    fn detect(&self, page: &DynamicImage) -> anyhow::Result<Vec<Detection>>;
}

impl<T: LayoutDetector + ?Sized> LayoutDetector for Box<T> {
    fn detect(&self, page: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        (**self).detect(page)
    }
}
