use crate::tables::Tables;
use serde::{Deserialize, Serialize};

/// Coarse stress category derived from a dominant emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
    Unknown,
}

impl StressLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            StressLevel::Low => "Low",
            StressLevel::Moderate => "Moderate",
            StressLevel::High => "High",
            StressLevel::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for StressLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an emotion label to its stress bucket using the built-in table.
///
/// Total: labels the table does not know map to [`StressLevel::Unknown`].
pub fn map_emotion_to_stress(label: &str) -> StressLevel {
    Tables::builtin().stress_for(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_stress_labels() {
        for label in ["sad", "angry", "fear", "disgust"] {
            assert_eq!(map_emotion_to_stress(label), StressLevel::High, "{label}");
        }
    }

    #[test]
    fn test_moderate_and_low() {
        assert_eq!(map_emotion_to_stress("neutral"), StressLevel::Moderate);
        assert_eq!(map_emotion_to_stress("happy"), StressLevel::Low);
        assert_eq!(map_emotion_to_stress("surprise"), StressLevel::Low);
    }

    #[test]
    fn test_unknown_labels() {
        assert_eq!(map_emotion_to_stress("banana"), StressLevel::Unknown);
        assert_eq!(map_emotion_to_stress(""), StressLevel::Unknown);
        assert_eq!(map_emotion_to_stress("contempt"), StressLevel::Unknown);
    }

    #[test]
    fn test_display() {
        assert_eq!(StressLevel::Moderate.to_string(), "Moderate");
        assert_eq!(serde_json::to_string(&StressLevel::High).unwrap(), "\"high\"");
    }
}
