//! emotireflect-core: face emotion analysis and the lookups built on it.
//!
//! Uses SCRFD for face detection and a FER-2013 CNN for expression
//! classification, both running via ONNX Runtime for CPU inference. The
//! selection, stress and message logic is pure and model-independent.

pub mod analyzer;
pub mod classifier;
pub mod detector;
pub mod selection;
pub mod stress;
pub mod tables;
pub mod types;

use std::path::PathBuf;

pub use analyzer::{AnalyzeError, DetectorConfig, EmotionDetector, OnnxEmotionDetector};
pub use selection::{select_dominant, FaceSelection, Selected, SelectionError};
pub use stress::{map_emotion_to_stress, StressLevel};
pub use tables::{display_label, Tables};
pub use types::{Detection, DominantResult, EmotionScores, FaceBox, PipelineMode};

/// Default model directory: `$XDG_DATA_HOME/emotireflect/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("emotireflect/models")
}
