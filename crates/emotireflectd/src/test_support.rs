//! Fakes shared by the daemon's unit tests.

use crate::engine::{spawn_engine, EngineHandle};
use emotireflect_core::{AnalyzeError, Detection, EmotionDetector, EmotionScores, FaceBox};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Detector that answers every request with the same scripted result.
#[derive(Clone)]
pub struct ScriptedDetector {
    result: Result<Vec<Detection>, String>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    pub fn faces(detections: Vec<Detection>) -> Self {
        Self {
            result: Ok(detections),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(reason.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn face(width: u32, height: u32, scores: &[(&str, f32)]) -> Detection {
        Detection {
            bounding_box: FaceBox { x: 0, y: 0, width, height },
            emotions: scores.iter().map(|&(label, score)| (label, score)).collect::<EmotionScores>(),
        }
    }

    pub fn engine(self) -> EngineHandle {
        spawn_engine(Box::new(move || Ok(Box::new(self) as Box<dyn EmotionDetector>))).unwrap()
    }
}

impl EmotionDetector for ScriptedDetector {
    fn detect_emotions(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, AnalyzeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(AnalyzeError::Other)
    }
}

pub fn png_bytes() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 12, image::Rgb([180, 150, 120])))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// A small PNG on disk. Keep the returned directory alive while using the path.
pub fn png_file() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("face.png");
    std::fs::write(&path, png_bytes()).unwrap();
    (dir, path)
}
