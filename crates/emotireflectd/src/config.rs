use emotireflect_core::classifier::{self, TensorLayout};
use emotireflect_core::detector::SCRFD_DEFAULT_CONFIDENCE;
use emotireflect_core::{DetectorConfig, PipelineMode};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub http_addr: SocketAddr,
    /// Pipeline variant (`simple` or `full`).
    pub mode: PipelineMode,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path of the CSV mood log.
    pub log_path: PathBuf,
    /// Number of log rows shown on the page.
    pub recent_rows: usize,
    /// Optional TOML file overriding the built-in stress/message tables.
    pub tables_path: Option<PathBuf>,
    /// Maximum accepted request body in bytes.
    pub body_limit: usize,
    /// Minimum SCRFD face score.
    pub face_threshold: f32,
    /// Input layout of the emotion model.
    pub emotion_layout: TensorLayout,
    /// Emotion labels in model output order.
    pub emotion_labels: Vec<String>,
    /// ONNX Runtime intra-op threads per model.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `EMOTIREFLECT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let emotion_labels = get("EMOTIREFLECT_EMOTION_LABELS")
            .map(|v| {
                v.split(',')
                    .map(|l| l.trim().to_ascii_lowercase())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(classifier::default_labels);

        Self {
            http_addr: parsed(&get, "EMOTIREFLECT_HTTP_ADDR", || SocketAddr::from(([127, 0, 0, 1], 8501))),
            mode: parsed(&get, "EMOTIREFLECT_MODE", || PipelineMode::Full),
            model_dir: get("EMOTIREFLECT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(emotireflect_core::default_model_dir),
            log_path: get("EMOTIREFLECT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("mood_log.csv")),
            recent_rows: parsed(&get, "EMOTIREFLECT_RECENT_ROWS", || 5),
            tables_path: get("EMOTIREFLECT_TABLES_PATH").map(PathBuf::from),
            body_limit: parsed(&get, "EMOTIREFLECT_BODY_LIMIT_BYTES", || 16 * 1024 * 1024),
            face_threshold: parsed(&get, "EMOTIREFLECT_FACE_THRESHOLD", || SCRFD_DEFAULT_CONFIDENCE),
            emotion_layout: parsed(&get, "EMOTIREFLECT_EMOTION_LAYOUT", || TensorLayout::Nhwc),
            emotion_labels,
            intra_threads: parsed(&get, "EMOTIREFLECT_INTRA_THREADS", || 2),
        }
    }

    /// Detector settings derived from this configuration.
    pub fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            face_threshold: self.face_threshold,
            emotion_layout: self.emotion_layout,
            emotion_labels: self.emotion_labels.clone(),
            intra_threads: self.intra_threads,
            ..DetectorConfig::in_dir(&self.model_dir)
        }
    }
}

/// Parse `key`, warning and falling back to `default` on bad input.
fn parsed<T, E>(get: &impl Fn(&str) -> Option<String>, key: &str, default: impl FnOnce() -> T) -> T
where
    T: FromStr<Err = E>,
    E: std::fmt::Display,
{
    match get(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "invalid setting; using default");
                default()
            }
        },
        None => default(),
    }
}
