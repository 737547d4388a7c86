//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB image into a square input whose side is chosen per
//! call, decodes the three anchor-free stride heads, and applies NMS.
//! Detections come back in descending confidence order.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (set ROLLCALL_MODEL_DIR)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detector input side {0} is not a positive multiple of 32")]
    InvalidInputSize(usize),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor positions for one stride level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideSlots {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Scale and padding used to fit the source image into the square input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    new_w: u32,
    new_h: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, side: usize) -> Self {
        let side_f = side as f32;
        let scale = (side_f / width as f32).min(side_f / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, side as u32);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, side as u32);
        Self {
            scale,
            pad_x: ((side as u32 - new_w) / 2) as f32,
            pad_y: ((side as u32 - new_h) / 2) as f32,
            new_w,
            new_h,
        }
    }

    /// Map a point from input-tensor space back to source image space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Raw head outputs for one stride level.
struct StrideTensors<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    slots: [StrideSlots; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    ///
    /// The model must accept a dynamic spatial input (e.g. `det_10g`), since
    /// the input side varies with the requested detection mode.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let slots = output_layout(&output_names);
        tracing::debug!(?slots, "SCRFD output tensor mapping");

        Ok(Self { session, slots })
    }

    /// Detect faces in an RGB image using a square input of `input_side` pixels.
    pub fn detect(
        &mut self,
        image: &RgbImage,
        input_side: usize,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        if input_side == 0 || input_side % 32 != 0 {
            return Err(DetectorError::InvalidInputSize(input_side));
        }
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image, input_side);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slots, &stride) in self.slots.iter().zip(SCRFD_STRIDES.iter()) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let tensors = StrideTensors {
                scores: extract(slots.score, "scores")?,
                bboxes: extract(slots.bbox, "bboxes")?,
                kps: extract(slots.kps, "kps")?,
            };
            candidates.extend(decode_stride(
                &tensors,
                stride,
                input_side,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), input_side, "SCRFD detection complete");
        Ok(faces)
    }
}

/// Letterbox an RGB image into a normalized `1×3×side×side` tensor.
///
/// Padding is left at 0.0, which is exactly where `SCRFD_MEAN` normalizes to.
fn preprocess(image: &RgbImage, side: usize) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), side);
    let resized = imageops::resize(image, letterbox.new_w, letterbox.new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    let (ox, oy) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, oy + y as usize, ox + x as usize]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Map output tensors to stride levels.
///
/// Exports that name their tensors `score_8`, `bbox_16`, `kps_32`, ... are
/// mapped by name; anything else falls back to the insightface positional
/// order `[scores 8/16/32, bboxes 8/16/32, kps 8/16/32]`.
fn output_layout(names: &[String]) -> [StrideSlots; 3] {
    let position = |kind: &str, stride: usize| {
        let target = format!("{kind}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideSlots>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideSlots {
                score: position("score", stride)?,
                bbox: position("bbox", stride)?,
                kps: position("kps", stride)?,
            })
        })
        .collect();

    match named.and_then(|slots| <[StrideSlots; 3]>::try_from(slots).ok()) {
        Some(slots) => slots,
        None => std::array::from_fn(|i| StrideSlots { score: i, bbox: i + 3, kps: i + 6 }),
    }
}

/// Decode anchor-free detections for a single stride level.
fn decode_stride(
    tensors: &StrideTensors<'_>,
    stride: usize,
    input_side: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_side / stride;
    let s = stride as f32;

    tensors
        .scores
        .iter()
        .take(grid * grid * SCRFD_ANCHORS_PER_CELL)
        .enumerate()
        .filter(|&(_, &score)| score > threshold)
        .filter_map(|(idx, &score)| {
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * s;
            let ay = (cell / grid) as f32 * s;

            let d = tensors.bboxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.unmap(ax - d[0] * s, ay - d[1] * s);
            let (x2, y2) = letterbox.unmap(ax + d[2] * s, ay + d[3] * s);

            let landmarks = tensors.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.unmap(ax + k[2 * i] * s, ay + k[2 * i + 1] * s))
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; the result is sorted by confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| k.iou(&det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}
