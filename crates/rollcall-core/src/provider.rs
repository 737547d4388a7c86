//! The embedding-provider boundary.
//!
//! Everything above this module treats face detection and embedding as an
//! opaque capability: image in, `(region, embedding)` pairs out, in
//! detection order (descending detector confidence).

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceEncoding;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_DETECTOR_SIDE: usize = 1280;

/// Accuracy/latency trade-off for the detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// 640px detector input. Used for enrollment.
    Accurate,
    /// 320px detector input. Used for verification.
    Fast,
}

impl DetectionMode {
    pub fn base_input_side(self) -> usize {
        match self {
            DetectionMode::Accurate => 640,
            DetectionMode::Fast => 320,
        }
    }
}

/// Per-call provider configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub mode: DetectionMode,
    /// Each step doubles the detector input side (capped at 1280px).
    pub upsample_count: u32,
    /// Number of aligned crop variants averaged into one embedding.
    pub jitter_count: u32,
}

impl EncodeOptions {
    pub const fn enrollment() -> Self {
        Self { mode: DetectionMode::Accurate, upsample_count: 0, jitter_count: 1 }
    }

    pub const fn verification() -> Self {
        Self { mode: DetectionMode::Fast, upsample_count: 0, jitter_count: 1 }
    }

    pub fn detector_input_side(&self) -> usize {
        let mut side = self.mode.base_input_side();
        for _ in 0..self.upsample_count {
            if side >= MAX_DETECTOR_SIDE {
                break;
            }
            side *= 2;
        }
        side.min(MAX_DETECTOR_SIDE)
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0}")]
    Other(String),
}

/// Detects faces and computes one embedding per face.
///
/// Implementations may hold mutable inference state, hence `&mut self`.
pub trait EmbeddingProvider: Send {
    fn detect_and_encode(
        &mut self,
        image: &RgbImage,
        options: &EncodeOptions,
    ) -> Result<Vec<FaceEncoding>, ProviderError>;
}

/// SCRFD detection followed by ArcFace embedding, both on ONNX Runtime.
pub struct OnnxProvider {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxProvider {
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, ProviderError> {
        let detector = FaceDetector::load(scrfd_path)?;
        tracing::info!(path = scrfd_path, "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(arcface_path)?;
        tracing::info!(path = arcface_path, "ArcFace recognizer loaded");

        Ok(Self { detector, recognizer })
    }
}

impl EmbeddingProvider for OnnxProvider {
    fn detect_and_encode(
        &mut self,
        image: &RgbImage,
        options: &EncodeOptions,
    ) -> Result<Vec<FaceEncoding>, ProviderError> {
        let faces = self.detector.detect(image, options.detector_input_side())?;

        let mut encodings = Vec::with_capacity(faces.len());
        for region in faces {
            let embedding = self.recognizer.extract(image, &region, options.jitter_count)?;
            encodings.push(FaceEncoding { region, embedding });
        }
        Ok(encodings)
    }
}
