//! Choosing which face to report and which of its emotions dominates.

use crate::types::{Detection, DominantResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("selected face has no emotion scores")]
    NoEmotionScores,
}

/// Strategy for picking one detection out of many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceSelection {
    /// Take the detector's first result.
    First,
    /// Take the face with the largest bounding-box area; first wins on ties.
    Largest,
}

impl FaceSelection {
    pub fn select<'a>(&self, detections: &'a [Detection]) -> Option<&'a Detection> {
        match self {
            FaceSelection::First => detections.first(),
            FaceSelection::Largest => {
                let mut best: Option<&Detection> = None;
                for detection in detections {
                    match best {
                        Some(current)
                            if detection.bounding_box.area() <= current.bounding_box.area() => {}
                        _ => best = Some(detection),
                    }
                }
                best
            }
        }
    }
}

/// Outcome of dominant selection: the chosen face and its winning emotion.
#[derive(Debug, Clone, PartialEq)]
pub struct Selected<'a> {
    pub detection: &'a Detection,
    pub dominant: DominantResult,
}

/// Pick a face with `strategy`, then the arg-max of its emotion scores.
pub fn select_dominant(
    detections: &[Detection],
    strategy: FaceSelection,
) -> Result<Selected<'_>, SelectionError> {
    let detection = strategy
        .select(detections)
        .ok_or(SelectionError::NoFaceDetected)?;
    let dominant = detection
        .emotions
        .dominant()
        .ok_or(SelectionError::NoEmotionScores)?;

    tracing::debug!(
        faces = detections.len(),
        ?strategy,
        area = detection.bounding_box.area(),
        emotion = %dominant.emotion_label,
        confidence = dominant.confidence,
        "dominant emotion selected"
    );

    Ok(Selected { detection, dominant })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EmotionScores, FaceBox};

    fn detection(width: u32, height: u32, emotions: &[(&str, f32)]) -> Detection {
        Detection {
            bounding_box: FaceBox { x: 0, y: 0, width, height },
            emotions: emotions.iter().map(|&(l, c)| (l, c)).collect(),
        }
    }

    #[test]
    fn test_largest_face_by_area() {
        // Areas 10, 50, 5
        let detections = vec![
            detection(2, 5, &[("sad", 0.9)]),
            detection(5, 10, &[("happy", 0.8)]),
            detection(1, 5, &[("angry", 0.7)]),
        ];
        let selected = select_dominant(&detections, FaceSelection::Largest).unwrap();
        assert_eq!(selected.detection.bounding_box.area(), 50);
        assert_eq!(selected.dominant.emotion_label, "happy");
    }

    #[test]
    fn test_largest_face_tie_prefers_first() {
        let detections = vec![
            detection(4, 5, &[("fear", 0.6)]),
            detection(5, 4, &[("neutral", 0.6)]),
        ];
        let selected = select_dominant(&detections, FaceSelection::Largest).unwrap();
        assert_eq!(selected.dominant.emotion_label, "fear");
    }

    #[test]
    fn test_first_face_ignores_area() {
        let detections = vec![
            detection(1, 1, &[("surprise", 0.5)]),
            detection(100, 100, &[("happy", 0.9)]),
        ];
        let selected = select_dominant(&detections, FaceSelection::First).unwrap();
        assert_eq!(selected.dominant.emotion_label, "surprise");
    }

    #[test]
    fn test_empty_detections() {
        assert_eq!(
            select_dominant(&[], FaceSelection::Largest).unwrap_err(),
            SelectionError::NoFaceDetected
        );
        assert_eq!(
            select_dominant(&[], FaceSelection::First).unwrap_err(),
            SelectionError::NoFaceDetected
        );
    }

    #[test]
    fn test_face_without_scores() {
        let detections = vec![Detection {
            bounding_box: FaceBox { x: 0, y: 0, width: 10, height: 10 },
            emotions: EmotionScores::new(),
        }];
        assert_eq!(
            select_dominant(&detections, FaceSelection::Largest).unwrap_err(),
            SelectionError::NoEmotionScores
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let detections = vec![
            detection(3, 3, &[("sad", 0.3), ("fear", 0.3)]),
            detection(6, 6, &[("angry", 0.45), ("disgust", 0.45), ("happy", 0.1)]),
        ];
        let a = select_dominant(&detections, FaceSelection::Largest).unwrap();
        let b = select_dominant(&detections, FaceSelection::Largest).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dominant.emotion_label, "angry");
    }
}
