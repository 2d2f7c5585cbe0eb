//! Facial-expression classifier via ONNX Runtime.
//!
//! Runs a FER-2013 style CNN (mini-Xception, 64×64 grayscale) over a face crop
//! and returns one confidence per emotion label, in model output order.

use crate::types::EmotionScores;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const EMOTION_INPUT_SIZE: u32 = 64;

/// Output order of FER-2013 models.
pub const FER2013_LABELS: [&str; 7] = ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];

/// Scores are reported with two decimals, as FER-based tools print them.
const SCORE_DECIMALS: f32 = 100.0;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} — export a FER-2013 emotion model to ONNX and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model produced {actual} scores but {expected} labels are configured")]
    LabelMismatch { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Memory layout of the classifier's input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 64, 64, 1]`, as exported from Keras.
    Nhwc,
    /// `[1, 1, 64, 64]`, as exported from PyTorch.
    Nchw,
}

impl std::str::FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout {other:?} (expected nhwc or nchw)")),
        }
    }
}

/// Emotion classifier over grayscale face crops.
pub struct EmotionClassifier {
    session: Session,
    layout: TensorLayout,
    labels: Vec<String>,
}

impl EmotionClassifier {
    /// Load the emotion ONNX model from the given path.
    pub fn load(
        model_path: &str,
        layout: TensorLayout,
        labels: Vec<String>,
        intra_threads: usize,
    ) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            ?layout,
            labels = ?labels,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded emotion model"
        );

        Ok(Self { session, layout, labels })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Score every configured emotion for one grayscale face crop.
    pub fn classify(&mut self, face: &GrayImage) -> Result<EmotionScores, ClassifierError> {
        let input = preprocess(face, self.layout);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("emotion scores: {e}")))?;

        scores_from_output(raw, &self.labels)
    }
}

/// Resize a face crop to the model input and scale pixels into [-1, 1].
fn preprocess(face: &GrayImage, layout: TensorLayout) -> Array4<f32> {
    let size = EMOTION_INPUT_SIZE;
    let resized = imageops::resize(face, size, size, FilterType::Triangle);

    let n = size as usize;
    let shape = match layout {
        TensorLayout::Nhwc => (1, n, n, 1),
        TensorLayout::Nchw => (1, 1, n, n),
    };
    let mut tensor = Array4::<f32>::zeros(shape);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let value = (pixel[0] as f32 / 255.0 - 0.5) * 2.0;
        let (x, y) = (x as usize, y as usize);
        match layout {
            TensorLayout::Nhwc => tensor[[0, y, x, 0]] = value,
            TensorLayout::Nchw => tensor[[0, 0, y, x]] = value,
        }
    }

    tensor
}

/// Turn raw model output into labelled, rounded scores.
///
/// Outputs that are not already a probability vector (logits) are soft-maxed.
fn scores_from_output(raw: &[f32], labels: &[String]) -> Result<EmotionScores, ClassifierError> {
    if raw.len() != labels.len() {
        return Err(ClassifierError::LabelMismatch {
            expected: labels.len(),
            actual: raw.len(),
        });
    }

    let sum: f32 = raw.iter().sum();
    let is_distribution = raw.iter().all(|v| (0.0..=1.0).contains(v)) && (sum - 1.0).abs() < 1e-3;
    let probs: Vec<f32> = if is_distribution {
        raw.to_vec()
    } else {
        softmax(raw)
    };

    Ok(labels
        .iter()
        .zip(probs)
        .map(|(label, p)| (label.clone(), (p * SCORE_DECIMALS).round() / SCORE_DECIMALS))
        .collect())
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// The FER-2013 label list as owned strings.
pub fn default_labels() -> Vec<String> {
    FER2013_LABELS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_nhwc() {
        let face = GrayImage::from_pixel(120, 90, image::Luma([0]));
        let tensor = preprocess(&face, TensorLayout::Nhwc);
        assert_eq!(tensor.shape(), &[1, 64, 64, 1]);
        assert!((tensor[[0, 10, 20, 0]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_shape_nchw() {
        let face = GrayImage::from_pixel(64, 64, image::Luma([255]));
        let tensor = preprocess(&face, TensorLayout::Nchw);
        assert_eq!(tensor.shape(), &[1, 1, 64, 64]);
        assert!((tensor[[0, 0, 63, 63]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_probabilities_rounded_in_label_order() {
        let raw = [0.014, 0.0, 0.1, 0.706, 0.08, 0.05, 0.05];
        let scores = scores_from_output(&raw, &default_labels()).unwrap();
        let labels: Vec<&str> = scores.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, FER2013_LABELS.to_vec());
        assert_eq!(scores.get("angry"), Some(0.01));
        assert_eq!(scores.get("happy"), Some(0.71));
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let raw = [2.0, -1.0, 0.5];
        let labels: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let scores = scores_from_output(&raw, &labels).unwrap();
        let total: f32 = scores.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 0.02);
        assert_eq!(scores.dominant().unwrap().emotion_label, "a");
    }

    #[test]
    fn test_label_mismatch() {
        let err = scores_from_output(&[0.5, 0.5], &default_labels()).unwrap_err();
        assert!(matches!(err, ClassifierError::LabelMismatch { expected: 7, actual: 2 }));
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!("NCHW".parse::<TensorLayout>().unwrap(), TensorLayout::Nchw);
        assert!("hwc".parse::<TensorLayout>().is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let err = EmotionClassifier::load("/nonexistent/emotion.onnx", TensorLayout::Nhwc, default_labels(), 1)
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::ModelNotFound(_)));
    }
}
