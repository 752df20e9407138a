use std::path::{Path, PathBuf};

use anyhow::Context;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{s, Array4, ArrayView2, Axis, Ix3};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
        ExecutionProviderDispatch, TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
};

use super::LayoutDetector;
use crate::entities::{BBox, Detection, LayoutLabel};

pub const LAYOUT_MODEL_FILE: &str = "yolov11n-doclaynet.onnx";

#[derive(Debug, Clone)]
pub struct ORTConfig {
    pub execution_providers: Vec<OrtExecutionProvider>,
    pub intra_threads: usize,
    pub inter_threads: usize,
    /// Graph optimization level 0 to 3, highest when unset.
    pub opt_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrtExecutionProvider {
    CPU,
    CoreML { ane_only: bool },
    CUDA(i32),
    Trt(i32),
}

impl Default for ORTConfig {
    fn default() -> Self {
        let mut execution_providers = vec![OrtExecutionProvider::CPU];
        if cfg!(target_os = "macos") {
            execution_providers.push(OrtExecutionProvider::CoreML { ane_only: false });
        }
        Self {
            execution_providers,
            intra_threads: Self::ORT_INTRATHREAD,
            inter_threads: Self::ORT_INTERTHREAD,
            opt_level: None,
        }
    }
}

impl ORTConfig {
    // Every worker owns its sessions, keep per-session thread pools small.
    pub const ORT_INTRATHREAD: usize = 2;
    pub const ORT_INTERTHREAD: usize = 1;

    fn dispatch(&self) -> Vec<ExecutionProviderDispatch> {
        // Sort providers by priority
        let mut providers = self.execution_providers.clone();
        providers.sort();

        providers
            .into_iter()
            .map(|provider| match provider {
                OrtExecutionProvider::Trt(device_id) => TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                OrtExecutionProvider::CUDA(device_id) => CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                OrtExecutionProvider::CoreML { ane_only } => {
                    let provider = CoreMLExecutionProvider::default();
                    if ane_only {
                        provider.with_ane_only().build()
                    } else {
                        provider.build()
                    }
                }
                OrtExecutionProvider::CPU => CPUExecutionProvider::default().build(),
            })
            .collect()
    }

    fn optimization_level(&self) -> GraphOptimizationLevel {
        match self.opt_level {
            Some(0) => GraphOptimizationLevel::Disable,
            Some(1) => GraphOptimizationLevel::Level1,
            Some(2) => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        }
    }

    /// Builds an inference session for the ONNX model at `model_path`.
    pub(crate) fn session_from_file(&self, model_path: &Path) -> anyhow::Result<Session> {
        let session = Session::builder()?
            .with_execution_providers(self.dispatch())?
            .with_optimization_level(self.optimization_level())?
            .with_intra_threads(self.intra_threads)?
            .with_inter_threads(self.inter_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("can't load onnx model {}", model_path.display()))?;
        Ok(session)
    }
}

#[derive(Debug, Clone)]
pub struct LayoutModelConfig {
    pub model_path: PathBuf,
    /// Square input side of the model.
    pub input_size: u32,
    /// Detections below this confidence are dropped.
    pub conf_threshold: f32,
    /// Relaxed IoU above which the lower-confidence box is suppressed.
    pub iou_threshold: f32,
    pub ort: ORTConfig,
}

impl LayoutModelConfig {
    pub const INPUT_SIZE: u32 = 1024;
    pub const CONF_THRESHOLD: f32 = 0.3;
    pub const IOU_THRESHOLD: f32 = 0.8;

    pub fn new(model_path: impl Into<PathBuf>, ort: ORTConfig) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: Self::INPUT_SIZE,
            conf_threshold: Self::CONF_THRESHOLD,
            iou_threshold: Self::IOU_THRESHOLD,
            ort,
        }
    }
}

/// YOLO DocLayNet detector running on onnxruntime.
#[derive(Debug)]
pub struct ORTLayoutParser {
    session: Session,
    output_name: String,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
}

impl ORTLayoutParser {
    // Letterbox fill value
    const PAD_VALUE: f32 = 144.0 / 255.0;

    pub fn new(config: &LayoutModelConfig) -> anyhow::Result<Self> {
        let session = config.ort.session_from_file(&config.model_path)?;
        let output_name = session
            .outputs
            .first()
            .map(|o| &o.name)
            .context("layout model has no output")?
            .to_owned();

        Ok(Self {
            session,
            output_name,
            input_size: config.input_size,
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
        })
    }

    #[tracing::instrument(skip_all)]
    pub fn parse_layout(&self, page_img: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        let (img_width, img_height) = page_img.dimensions();
        let input = self.preprocess(page_img);

        let outputs = self.session.run(ort::inputs![input]?)?;
        let output = outputs
            .get(self.output_name.as_str())
            .context("can't get the value of first output")?
            .try_extract_tensor::<f32>()?;
        // (batch, 4 + classes, anchors)
        let output = output.into_dimensionality::<Ix3>()?;
        anyhow::ensure!(
            output.shape()[1] >= CXYWH_OFFSET + LayoutLabel::ALL.len(),
            "unexpected layout output shape {:?}",
            output.shape()
        );

        let mut detections = extract_detections(
            output.slice(s![0, .., ..]),
            self.input_size,
            self.conf_threshold,
            (img_width, img_height),
        );
        nms(&mut detections, self.iou_threshold);
        Ok(detections)
    }

    /// Letterboxes the page into the top-left of a square input.
    fn preprocess(&self, img: &DynamicImage) -> Array4<f32> {
        let (w0, h0) = img.dimensions();
        let side = self.input_size;
        let r = (side as f32 / w0 as f32).min(side as f32 / h0 as f32);
        let (w_new, h_new) = (
            ((w0 as f32 * r).round() as u32).clamp(1, side),
            ((h0 as f32 * r).round() as u32).clamp(1, side),
        );
        let resized_img = img.resize_exact(w_new, h_new, FilterType::Triangle);

        let mut input_tensor = Array4::from_elem([1, 3, side as usize, side as usize], Self::PAD_VALUE);
        for (x, y, pixel) in resized_img.pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b, _] = pixel.0;
            input_tensor[[0, 0, y, x]] = r as f32 / 255.0;
            input_tensor[[0, 1, y, x]] = g as f32 / 255.0;
            input_tensor[[0, 2, y, x]] = b as f32 / 255.0;
        }
        input_tensor
    }
}

// Box coordinates come first in each prediction: (cx, cy, w, h)
const CXYWH_OFFSET: usize = 4;

/// Decodes one `(4 + classes, anchors)` prediction matrix into raster-space
/// detections, undoing the top-left letterbox.
fn extract_detections(
    output: ArrayView2<f32>,
    input_size: u32,
    conf_threshold: f32,
    (original_width, original_height): (u32, u32),
) -> Vec<Detection> {
    let ratio = input_size as f32 / original_width.max(original_height) as f32;
    let (max_w, max_h) = (original_width as f32, original_height as f32);

    let mut result = Vec::new();
    for prediction in output.axis_iter(Axis(1)) {
        let bbox = prediction.slice(s![0..CXYWH_OFFSET]);
        let classes = prediction.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + LayoutLabel::ALL.len()]);
        let Some((class_id, &proba)) = classes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };
        if proba < conf_threshold {
            continue;
        }
        let Some(label) = LayoutLabel::from_class_id(class_id) else {
            continue;
        };

        let xc = bbox[0] / ratio;
        let yc = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        // Change to (upper-left, lower-right)
        let x0 = (xc - w / 2.0).clamp(0f32, max_w);
        let y0 = (yc - h / 2.0).clamp(0f32, max_h);
        let x1 = (xc + w / 2.0).clamp(0f32, max_w);
        let y1 = (yc + h / 2.0).clamp(0f32, max_h);
        if x0 >= x1 || y0 >= y1 {
            tracing::trace!("dropping empty {label} box ({x0},{y0}), ({x1},{y1})");
            continue;
        }

        result.push(Detection {
            bbox: BBox { x0, y0, x1, y1 },
            label,
            confidence: proba,
        });
    }
    result
}

impl LayoutDetector for ORTLayoutParser {
    fn detect(&self, page: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        self.parse_layout(page)
    }
}

/// Class-agnostic nms over relaxed IoU, keeps the highest confidence box.
fn nms(raw_bboxes: &mut Vec<Detection>, iou_threshold: f32) {
    raw_bboxes.sort_by(|r1, r2| r2.confidence.total_cmp(&r1.confidence));
    let mut current_index = 0;
    for index in 0..raw_bboxes.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = raw_bboxes[prev_index]
                .bbox
                .relaxed_iou(&raw_bboxes[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            raw_bboxes.swap(current_index, index);
            current_index += 1;
        }
    }
    // Everything after has been swapped
    raw_bboxes.truncate(current_index);
}
