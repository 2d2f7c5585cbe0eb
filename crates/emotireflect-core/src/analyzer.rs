//! Face + emotion analysis: the detector boundary used by the pipeline.

use crate::classifier::{self, ClassifierError, EmotionClassifier, TensorLayout};
use crate::detector::{DetectorError, FaceDetector, SCRFD_DEFAULT_CONFIDENCE};
use crate::types::{BoundingBox, Detection};
use image::imageops;
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fraction of the face size added on every side before classification.
const FACE_CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("couldn't read image {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("emotion classification failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("{0}")]
    Other(String),
}

/// Anything that turns a photo into per-face emotion scores.
pub trait EmotionDetector: Send {
    fn detect_emotions(&mut self, image: &RgbImage) -> Result<Vec<Detection>, AnalyzeError>;

    /// File-based entry point: decode the image at `path` and analyse it.
    fn detect_emotions_at(&mut self, path: &Path) -> Result<Vec<Detection>, AnalyzeError> {
        let image = image::open(path)
            .map_err(|source| AnalyzeError::Decode {
                path: path.display().to_string(),
                source,
            })?
            .to_rgb8();
        self.detect_emotions(&image)
    }
}

/// Where the models live and how to run them.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub face_model: PathBuf,
    pub emotion_model: PathBuf,
    pub face_threshold: f32,
    pub emotion_layout: TensorLayout,
    pub emotion_labels: Vec<String>,
    pub intra_threads: usize,
}

impl DetectorConfig {
    /// Standard model file names inside `model_dir`.
    pub fn in_dir(model_dir: &Path) -> Self {
        Self {
            face_model: model_dir.join("det_10g.onnx"),
            emotion_model: model_dir.join("emotion_mini_xception.onnx"),
            face_threshold: SCRFD_DEFAULT_CONFIDENCE,
            emotion_layout: TensorLayout::Nhwc,
            emotion_labels: classifier::default_labels(),
            intra_threads: 2,
        }
    }
}

/// SCRFD face detection followed by per-face emotion classification.
pub struct OnnxEmotionDetector {
    faces: FaceDetector,
    classifier: EmotionClassifier,
}

impl OnnxEmotionDetector {
    pub fn load(config: &DetectorConfig) -> Result<Self, AnalyzeError> {
        let faces = FaceDetector::load(&config.face_model.to_string_lossy(), config.intra_threads)?
            .with_confidence_threshold(config.face_threshold);
        let classifier = EmotionClassifier::load(
            &config.emotion_model.to_string_lossy(),
            config.emotion_layout,
            config.emotion_labels.clone(),
            config.intra_threads,
        )?;
        Ok(Self { faces, classifier })
    }
}

impl EmotionDetector for OnnxEmotionDetector {
    fn detect_emotions(&mut self, image: &RgbImage) -> Result<Vec<Detection>, AnalyzeError> {
        let gray = imageops::grayscale(image);
        let boxes = self.faces.detect(image)?;

        let mut detections = Vec::with_capacity(boxes.len());
        for raw in &boxes {
            let Some(bounding_box) = raw.to_face_box(image.width(), image.height()) else {
                tracing::debug!(?raw, "face box outside image; skipped");
                continue;
            };
            let crop = crop_face(&gray, raw);
            let emotions = self.classifier.classify(&crop)?;
            detections.push(Detection { bounding_box, emotions });
        }

        tracing::info!(
            width = image.width(),
            height = image.height(),
            faces = detections.len(),
            "emotion analysis finished"
        );
        Ok(detections)
    }
}

/// Cut the face out of the grayscale photo with a margin, clipped to the image.
fn crop_face(gray: &GrayImage, face: &BoundingBox) -> GrayImage {
    let margin_x = face.width * FACE_CROP_MARGIN;
    let margin_y = face.height * FACE_CROP_MARGIN;
    let widened = BoundingBox {
        x: face.x - margin_x,
        y: face.y - margin_y,
        width: face.width + 2.0 * margin_x,
        height: face.height + 2.0 * margin_y,
        confidence: face.confidence,
        landmarks: None,
    };

    match widened.to_face_box(gray.width(), gray.height()) {
        Some(b) => imageops::crop_imm(gray, b.x, b.y, b.width, b.height).to_image(),
        None => gray.clone(),
    }
}
