use image::GrayImage;
use imageproc::contrast::otsu_level;

// Rows closer than this are part of the same line
const MAX_LINE_GAP: u32 = 2;
const MIN_LINE_HEIGHT: u32 = 4;
const LINE_MARGIN: u32 = 2;

/// Splits a text crop into horizontal line bands using a row ink profile.
///
/// Returns `(top, bottom)` row ranges, bottom exclusive, top to bottom.
pub fn segment_lines(gray: &GrayImage) -> Vec<(u32, u32)> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if min == max {
        return Vec::new();
    }

    let level = otsu_level(gray);
    // Ink is the minority class; a dark majority means light text on a dark background
    let dark = gray.pixels().filter(|p| p.0[0] <= level).count() as u64;
    let inverted = dark * 2 > width as u64 * height as u64;
    let is_ink = |v: u8| if inverted { v > level } else { v <= level };

    let mut runs: Vec<(u32, u32)> = Vec::new();
    let mut start = None;
    for y in 0..height {
        let ink = (0..width).any(|x| is_ink(gray.get_pixel(x, y).0[0]));
        match (ink, start) {
            (true, None) => start = Some(y),
            (false, Some(s)) => {
                runs.push((s, y));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, height));
    }

    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(runs.len());
    for run in runs {
        match merged.last_mut() {
            Some(last) if run.0 - last.1 <= MAX_LINE_GAP => last.1 = run.1,
            _ => merged.push(run),
        }
    }

    merged
        .into_iter()
        .filter(|(top, bottom)| bottom - top >= MIN_LINE_HEIGHT)
        .map(|(top, bottom)| {
            (
                top.saturating_sub(LINE_MARGIN),
                (bottom + LINE_MARGIN).min(height),
            )
        })
        .collect()
}
