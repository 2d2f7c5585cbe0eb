//! SCRFD face detector via ONNX Runtime.
//!
//! Finds face rectangles in RGB photos. Uploaded photos are letterboxed into
//! the square SCRFD input, decoded per stride and filtered with NMS; boxes are
//! returned in the coordinate space of the original photo.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
pub const SCRFD_DEFAULT_CONFIDENCE: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download det_10g.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image is empty")]
    EmptyImage,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when letterboxing, needed to map boxes back.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, input_size: usize) -> Self {
        let scale = (input_size as f32 / width as f32).min(input_size as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (input_size as f32 - new_w) / 2.0,
            pad_y: (input_size as f32 - new_h) / 2.0,
        }
    }

    fn resized_dims(&self, width: u32, height: u32) -> (u32, u32) {
        (
            ((width as f32 * self.scale).round() as u32).max(1),
            ((height as f32 * self.scale).round() as u32).max(1),
        )
    }

    fn to_image(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Positions of the score, bbox and keypoint tensors for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Raw tensors of one stride level.
struct StrideTensors<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
    confidence_threshold: f32,
    outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let outputs = discover_outputs(&output_names);
        tracing::debug!(?outputs, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_size: SCRFD_INPUT_SIZE,
            confidence_threshold: SCRFD_DEFAULT_CONFIDENCE,
            outputs,
        })
    }

    /// Minimum face score kept after decoding.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Detect faces in an RGB photo, returning boxes sorted by confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectorError::EmptyImage);
        }

        let (input, letterbox) = preprocess(image, self.input_size);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let idx = self.outputs[slot];
            let extract = |i: usize, what: &str| {
                outputs[i]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };

            let tensors = StrideTensors {
                stride,
                scores: extract(idx.score, "scores")?,
                bboxes: extract(idx.bbox, "bboxes")?,
                kps: extract(idx.kps, "kps")?,
            };
            candidates.extend(decode_stride(
                &tensors,
                self.input_size,
                &letterbox,
                self.confidence_threshold,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }
}

/// Letterbox an RGB photo into a normalised NCHW tensor.
fn preprocess(image: &RgbImage, input_size: usize) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), input_size);
    let (new_w, new_h) = letterbox.resized_dims(image.width(), image.height());
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let off_x = letterbox.pad_x.floor() as usize;
    let off_y = letterbox.pad_y.floor() as usize;

    // Padding stays at 0.0, which is SCRFD_MEAN after normalisation.
    let mut tensor = Array4::<f32>::zeros((1, 3, input_size, input_size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = off_x + x as usize;
        let ty = off_y + y as usize;
        if tx >= input_size || ty >= input_size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Map output tensors to strides.
///
/// Exports either name them `score_8`, `bbox_16`, `kps_32`, ... or use opaque
/// numeric names, in which case the standard order is assumed:
/// scores 8/16/32, then bboxes 8/16/32, then keypoints 8/16/32.
fn discover_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideOutputs {
                score: find("score", stride)?,
                bbox: find("bbox", stride)?,
                kps: find("kps", stride)?,
            })
        })
        .collect();

    match named {
        Some(found) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [found[0], found[1], found[2]]
        }
        None => {
            tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
            std::array::from_fn(|i| StrideOutputs { score: i, bbox: i + 3, kps: i + 6 })
        }
    }
}

/// Decode the anchors of one stride level into boxes in photo coordinates.
fn decode_stride(
    tensors: &StrideTensors<'_>,
    input_size: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let stride = tensors.stride;
    let grid = input_size / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut faces = Vec::new();
    for idx in 0..anchors {
        let score = tensors.scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let Some(offsets) = tensors.bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let ax = (cell % grid) as f32 * step;
        let ay = (cell / grid) as f32 * step;

        let (x1, y1) = letterbox.to_image(ax - offsets[0] * step, ay - offsets[1] * step);
        let (x2, y2) = letterbox.to_image(ax + offsets[2] * step, ay + offsets[3] * step);

        let landmarks = tensors.kps.get(idx * 10..idx * 10 + 10).map(|kps| {
            std::array::from_fn(|i| {
                letterbox.to_image(ax + kps[i * 2] * step, ay + kps[i * 2 + 1] * step)
            })
        });

        faces.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    faces
}

/// Non-maximum suppression; output is sorted by descending confidence.
fn nms(mut faces: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for face in faces {
        if keep.iter().all(|kept| iou(kept, &face) <= iou_threshold) {
            keep.push(face);
        }
    }
    keep
}

/// Intersection-over-union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf, landmarks: None }
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        assert!(iou(&a, &face(30.0, 30.0, 5.0, 5.0, 1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping_group() {
        let faces = vec![
            face(5.0, 5.0, 100.0, 100.0, 0.8),
            face(200.0, 200.0, 50.0, 50.0, 0.7),
            face(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let kept = nms(faces, 0.4);
        let scores: Vec<f32> = kept.iter().map(|f| f.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn test_letterbox_landscape_photo() {
        let lb = Letterbox::fit(1280, 640, 640);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert!(lb.pad_x.abs() < 1e-6);
        assert!((lb.pad_y - 160.0).abs() < 1e-6);
        assert_eq!(lb.resized_dims(1280, 640), (640, 320));

        let (x, y) = lb.to_image(100.0, 160.0 + 50.0);
        assert!((x - 200.0).abs() < 1e-3);
        assert!((y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_pads_with_zero_and_normalizes_rgb() {
        // 2:1 landscape, so rows above and below the photo are padding.
        let image = RgbImage::from_pixel(64, 32, image::Rgb([255, 127, 0]));
        let (tensor, lb) = preprocess(&image, 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert!((lb.pad_y - 16.0).abs() < 1e-6);

        // Padding row
        assert_eq!(tensor[[0, 0, 0, 10]], 0.0);
        // Photo row: each channel normalised independently
        let r = tensor[[0, 0, 32, 10]];
        let g = tensor[[0, 1, 32, 10]];
        let b = tensor[[0, 2, 32, 10]];
        assert!((r - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-5);
        assert!((g - (127.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-5);
        assert!((b - (0.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-5);
    }

    #[test]
    fn test_decode_stride_maps_back_to_photo() {
        // 64px input, stride 32 → 2×2 grid, 8 anchors. Only anchor 2 (cell 1: x=32, y=0) fires.
        let mut scores = vec![0.0f32; 8];
        scores[2] = 0.95;
        let mut bboxes = vec![0.0f32; 8 * 4];
        bboxes[2 * 4..2 * 4 + 4].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);
        let tensors = StrideTensors { stride: 32, scores: &scores, bboxes: &bboxes, kps: &[] };
        let lb = Letterbox { scale: 0.5, pad_x: 0.0, pad_y: 0.0 };

        let faces = decode_stride(&tensors, 64, &lb, 0.5);
        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        // Letterboxed box (16, 0)-(48, 32), scaled ×2 back to the photo.
        assert!((f.x - 32.0).abs() < 1e-4);
        assert!(f.y.abs() < 1e-4);
        assert!((f.width - 64.0).abs() < 1e-4);
        assert!((f.height - 64.0).abs() < 1e-4);
        assert!(f.landmarks.is_none());
    }

    #[test]
    fn test_decode_stride_threshold() {
        let scores = vec![0.5f32; 8];
        let bboxes = vec![1.0f32; 32];
        let tensors = StrideTensors { stride: 32, scores: &scores, bboxes: &bboxes, kps: &[] };
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        assert!(decode_stride(&tensors, 64, &lb, 0.5).is_empty());
    }

    #[test]
    fn test_discover_outputs_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let outputs = discover_outputs(&names);
        assert_eq!(outputs[0], StrideOutputs { score: 2, bbox: 0, kps: 1 });
        assert_eq!(outputs[2], StrideOutputs { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_discover_outputs_positional() {
        let names: Vec<String> = (400..409).map(|i: usize| i.to_string()).collect();
        let outputs = discover_outputs(&names);
        assert_eq!(outputs[1], StrideOutputs { score: 1, bbox: 4, kps: 7 });
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceDetector::load("/nonexistent/det_10g.onnx", 1).err().unwrap();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }
}
