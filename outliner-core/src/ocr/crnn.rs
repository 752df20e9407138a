use std::path::{Path, PathBuf};

use anyhow::Context;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array4, ArrayView2, Axis, Ix3};
use ort::session::Session;

use super::{segment_lines, RecognizedText, TextRecognizer};
use crate::layout::model::ORTConfig;

pub const RECOGNITION_MODEL_FILE: &str = "en_PP-OCRv4_rec_infer.onnx";
pub const RECOGNITION_DICT_FILE: &str = "en_dict.txt";

#[derive(Debug, Clone)]
pub struct CrnnConfig {
    pub model_path: PathBuf,
    /// One character per line, index 1.. in the model's output classes.
    pub dict_path: PathBuf,
    pub input_height: u32,
    pub max_input_width: u32,
    /// Appends a space class after the dictionary.
    pub use_space_char: bool,
    pub ort: ORTConfig,
}

impl CrnnConfig {
    pub const INPUT_HEIGHT: u32 = 48;
    pub const MAX_INPUT_WIDTH: u32 = 3200;

    pub fn new(model_path: impl Into<PathBuf>, dict_path: impl Into<PathBuf>, ort: ORTConfig) -> Self {
        Self {
            model_path: model_path.into(),
            dict_path: dict_path.into(),
            input_height: Self::INPUT_HEIGHT,
            max_input_width: Self::MAX_INPUT_WIDTH,
            use_space_char: true,
            ort,
        }
    }
}

/// CTC text line recognizer (PP-OCR style CRNN).
///
/// Crops are split into lines first, each line is recognized independently.
///
/// Line splitting only looks at the row ink profile, there is no text
/// detector. Text sitting side by side in one crop (columns, a label next to
/// a value) shares a band and is read as a single line, left to right.
#[derive(Debug)]
pub struct CrnnRecognizer {
    session: Session,
    output_name: String,
    charset: Vec<char>,
    input_height: u32,
    max_input_width: u32,
}

impl CrnnRecognizer {
    pub fn new(config: &CrnnConfig) -> anyhow::Result<Self> {
        let charset = load_charset(&config.dict_path, config.use_space_char)?;
        let session = config.ort.session_from_file(&config.model_path)?;
        let output_name = session
            .outputs
            .first()
            .map(|o| &o.name)
            .context("recognition model has no output")?
            .to_owned();

        Ok(Self {
            session,
            output_name,
            charset,
            input_height: config.input_height,
            max_input_width: config.max_input_width,
        })
    }

    fn recognize_line(&self, line: &DynamicImage) -> anyhow::Result<RecognizedText> {
        let input = self.preprocess(line);
        let outputs = self.session.run(ort::inputs![input]?)?;
        let output = outputs
            .get(self.output_name.as_str())
            .context("can't get the value of first output")?
            .try_extract_tensor::<f32>()?;
        // (batch, timesteps, classes)
        let output = output.into_dimensionality::<Ix3>()?;
        let (text, confidence) = ctc_greedy_decode(output.index_axis(Axis(0), 0), &self.charset);
        Ok(RecognizedText { text, confidence })
    }

    /// Resizes to the model height keeping the aspect ratio and maps pixels
    /// to `[-1, 1]`.
    fn preprocess(&self, img: &DynamicImage) -> Array4<f32> {
        let (w0, h0) = img.dimensions();
        let height = self.input_height;
        let width = ((w0 as f32 * height as f32 / h0.max(1) as f32).ceil() as u32)
            .clamp(height / 4, self.max_input_width);
        let resized = img.resize_exact(width, height, FilterType::Triangle);

        let mut input = Array4::zeros([1, 3, height as usize, width as usize]);
        for (x, y, pixel) in resized.pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b, _] = pixel.0;
            input[[0, 0, y, x]] = (r as f32 / 255.0 - 0.5) / 0.5;
            input[[0, 1, y, x]] = (g as f32 / 255.0 - 0.5) / 0.5;
            input[[0, 2, y, x]] = (b as f32 / 255.0 - 0.5) / 0.5;
        }
        input
    }
}

impl TextRecognizer for CrnnRecognizer {
    #[tracing::instrument(skip_all)]
    fn recognize(&self, crop: &DynamicImage) -> anyhow::Result<Vec<RecognizedText>> {
        let (width, _) = crop.dimensions();
        let mut fragments = Vec::new();
        for (top, bottom) in segment_lines(&crop.to_luma8()) {
            let line = crop.crop_imm(0, top, width, bottom - top);
            let recognized = self.recognize_line(&line)?;
            if !recognized.text.trim().is_empty() {
                fragments.push(recognized);
            }
        }
        Ok(fragments)
    }
}

fn load_charset(dict_path: &Path, use_space_char: bool) -> anyhow::Result<Vec<char>> {
    let dict = std::fs::read_to_string(dict_path)
        .with_context(|| format!("can't read ocr dictionary {}", dict_path.display()))?;
    let mut charset = parse_charset(&dict);
    anyhow::ensure!(!charset.is_empty(), "empty ocr dictionary");
    if use_space_char {
        charset.push(' ');
    }
    Ok(charset)
}

fn parse_charset(dict: &str) -> Vec<char> {
    dict.lines().filter_map(|line| line.chars().next()).collect()
}

/// Greedy CTC decoding of a `(timesteps, classes)` probability matrix.
///
/// Class 0 is the blank, class `i` maps to `charset[i - 1]`. Repeated
/// classes collapse and blanks are dropped. The confidence is the mean
/// probability of the kept steps, 0 when nothing is kept.
pub fn ctc_greedy_decode(probs: ArrayView2<f32>, charset: &[char]) -> (String, f32) {
    const BLANK: usize = 0;

    let mut text = String::new();
    let mut kept_probs = Vec::new();
    let mut previous = None;
    for step in probs.outer_iter() {
        let Some((idx, &prob)) = step
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };
        if idx != BLANK && previous != Some(idx) {
            if let Some(c) = charset.get(idx - 1) {
                text.push(*c);
                kept_probs.push(prob);
            }
        }
        previous = Some(idx);
    }

    let confidence = if kept_probs.is_empty() {
        0.0
    } else {
        kept_probs.iter().sum::<f32>() / kept_probs.len() as f32
    };
    (text, confidence)
}
