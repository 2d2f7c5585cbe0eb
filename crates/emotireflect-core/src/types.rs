use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Raw face box produced by the detector, in image coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Snap to whole pixels and clip to an image of the given size.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn to_face_box(&self, image_width: u32, image_height: u32) -> Option<FaceBox> {
        let x1 = self.x.max(0.0).round();
        let y1 = self.y.max(0.0).round();
        let x2 = (self.x + self.width).min(image_width as f32).round();
        let y2 = (self.y + self.height).min(image_height as f32).round();

        if !(x2 > x1 && y2 > y1) {
            return None;
        }

        Some(FaceBox {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// Integer face rectangle, clipped to the analysed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Emotion label → confidence, kept in the order the classifier produced them.
///
/// Every stored value lies in [0, 1]; out-of-range input is clamped and NaN
/// is stored as 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, f32>", into = "IndexMap<String, f32>")]
pub struct EmotionScores(IndexMap<String, f32>);

impl EmotionScores {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Insert or overwrite a score. Overwriting keeps the original position.
    pub fn insert(&mut self, label: impl Into<String>, confidence: f32) {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self.0.insert(label.into(), confidence);
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.0.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(label, &confidence)| (label.as_str(), confidence))
    }

    /// Highest-confidence label; on ties the earliest inserted label wins.
    pub fn dominant(&self) -> Option<DominantResult> {
        let mut best: Option<(&str, f32)> = None;
        for (label, confidence) in self.iter() {
            match best {
                Some((_, current)) if confidence <= current => {}
                _ => best = Some((label, confidence)),
            }
        }
        best.map(|(label, confidence)| DominantResult {
            emotion_label: label.to_string(),
            confidence,
        })
    }
}

impl<L: Into<String>> FromIterator<(L, f32)> for EmotionScores {
    fn from_iter<I: IntoIterator<Item = (L, f32)>>(iter: I) -> Self {
        let mut scores = Self::new();
        for (label, confidence) in iter {
            scores.insert(label, confidence);
        }
        scores
    }
}

impl From<IndexMap<String, f32>> for EmotionScores {
    fn from(map: IndexMap<String, f32>) -> Self {
        map.into_iter().collect()
    }
}

impl From<EmotionScores> for IndexMap<String, f32> {
    fn from(scores: EmotionScores) -> Self {
        scores.0
    }
}

/// One analysed face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: FaceBox,
    pub emotions: EmotionScores,
}

/// The winning emotion of a single detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantResult {
    pub emotion_label: String,
    pub confidence: f32,
}

/// Which pipeline variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// First face only; dominant emotion, chart and message.
    Simple,
    /// Largest face; adds the stress banner and the mood log.
    Full,
}

impl PipelineMode {
    pub fn face_selection(self) -> crate::selection::FaceSelection {
        match self {
            PipelineMode::Simple => crate::selection::FaceSelection::First,
            PipelineMode::Full => crate::selection::FaceSelection::Largest,
        }
    }

    pub fn maps_stress(self) -> bool {
        matches!(self, PipelineMode::Full)
    }

    pub fn logs_mood(self) -> bool {
        matches!(self, PipelineMode::Full)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineMode::Simple => "simple",
            PipelineMode::Full => "full",
        }
    }
}

impl std::str::FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(PipelineMode::Simple),
            "full" => Ok(PipelineMode::Full),
            other => Err(format!("unknown pipeline mode {other:?} (expected simple or full)")),
        }
    }
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
