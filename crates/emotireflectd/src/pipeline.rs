//! One upload, top to bottom: decode, detect, select, map, log.
//!
//! Every stage failure degrades to a user-visible [`Notice`]; nothing here
//! aborts the request.

use crate::engine::{EngineError, EngineHandle};
use emotireflect_core::{
    display_label, select_dominant, AnalyzeError, EmotionScores, FaceBox, PipelineMode,
    SelectionError, StressLevel, Tables,
};
use emotireflect_io::{decode_upload, preview_data_uri, MoodLog, MoodLogEntry, TempPhoto};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Why a stage stopped or degraded. The display text is shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("Couldn't read the image. Try another one.")]
    Decode(String),
    #[error("No face detected. Try a clearer frontal image.")]
    NoFaceDetected,
    #[error("Emotion analysis failed: {0}")]
    Detector(String),
    #[error("Couldn't prepare the image for analysis: {0}")]
    Storage(String),
    #[error("Couldn't update the mood log: {0}")]
    LogIo(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl From<&StageError> for Notice {
    fn from(err: &StageError) -> Self {
        let level = match err {
            StageError::Decode(_) | StageError::Detector(_) | StageError::Storage(_) => {
                NoticeLevel::Error
            }
            StageError::NoFaceDetected | StageError::LogIo(_) => NoticeLevel::Warning,
        };
        Notice {
            level,
            message: err.to_string(),
        }
    }
}

/// The dominant emotion of the chosen face and everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reflection {
    pub emotion: String,
    pub display_label: String,
    pub confidence: f32,
    pub emotions: EmotionScores,
    pub face: FaceBox,
    pub faces_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress: Option<StressLevel>,
    pub message: String,
    pub logged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing uploaded yet.
    Idle,
    Rejected,
    NoFace,
    DetectorFailed,
    Detected(Reflection),
}

impl From<&StageError> for Outcome {
    /// Only an unreadable upload is the caller's fault.
    fn from(err: &StageError) -> Self {
        match err {
            StageError::Decode(_) => Outcome::Rejected,
            StageError::NoFaceDetected => Outcome::NoFace,
            StageError::Detector(_) | StageError::Storage(_) | StageError::LogIo(_) => {
                Outcome::DetectorFailed
            }
        }
    }
}

/// Everything the page or the JSON API needs to present one request.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub mode: PipelineMode,
    #[serde(skip)]
    pub preview: Option<String>,
    pub outcome: Outcome,
    pub notices: Vec<Notice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent: Option<Vec<MoodLogEntry>>,
}

impl Report {
    fn new(mode: PipelineMode) -> Self {
        Self {
            mode,
            preview: None,
            outcome: Outcome::Idle,
            notices: Vec::new(),
            recent: None,
        }
    }

    fn notice(&mut self, err: &StageError) {
        self.notices.push(Notice::from(err));
    }
}

pub struct Pipeline {
    mode: PipelineMode,
    tables: Arc<Tables>,
    log: MoodLog,
    recent_rows: usize,
    engine: EngineHandle,
}

impl Pipeline {
    pub fn new(
        mode: PipelineMode,
        tables: Arc<Tables>,
        log: MoodLog,
        recent_rows: usize,
        engine: EngineHandle,
    ) -> Self {
        Self {
            mode,
            tables,
            log,
            recent_rows,
            engine,
        }
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn log(&self) -> &MoodLog {
        &self.log
    }

    pub fn recent_rows(&self) -> usize {
        self.recent_rows
    }

    /// Page state before any upload.
    pub async fn idle(&self) -> Report {
        let mut report = Report::new(self.mode);
        self.attach_recent(&mut report).await;
        report
    }

    /// Run the full pipeline over uploaded bytes.
    pub async fn analyze(&self, upload: &[u8]) -> Report {
        let mut report = Report::new(self.mode);
        match self.run(upload, &mut report).await {
            Ok(reflection) => report.outcome = Outcome::Detected(reflection),
            Err(err) => {
                report.outcome = Outcome::from(&err);
                report.notice(&err);
            }
        }
        self.attach_recent(&mut report).await;
        report
    }

    async fn run(&self, upload: &[u8], report: &mut Report) -> Result<Reflection, StageError> {
        let photo = decode_upload(upload).map_err(|e| {
            tracing::warn!(bytes = upload.len(), error = %e, "upload rejected");
            StageError::Decode(e.to_string())
        })?;

        match preview_data_uri(&photo.image) {
            Ok(uri) => report.preview = Some(uri),
            Err(e) => tracing::warn!(error = %e, "preview encoding failed"),
        }

        // The temp file must outlive the engine call.
        let temp = TempPhoto::persist(&photo.image).map_err(|e| {
            tracing::error!(error = %e, "failed to persist upload");
            StageError::Storage(e.to_string())
        })?;

        let detections = self
            .engine
            .analyze_file(temp.path().to_path_buf())
            .await
            .map_err(|e| match e {
                EngineError::Analyze(AnalyzeError::Decode { .. }) => {
                    tracing::warn!(error = %e, "detector couldn't read upload");
                    StageError::Decode(e.to_string())
                }
                other => {
                    tracing::error!(error = %other, "emotion analysis failed");
                    StageError::Detector(other.to_string())
                }
            })?;
        drop(temp);

        let selected =
            select_dominant(&detections, self.mode.face_selection()).map_err(|e| match e {
                SelectionError::NoFaceDetected => {
                    tracing::info!(width = photo.width(), height = photo.height(), "no face detected");
                    StageError::NoFaceDetected
                }
                SelectionError::NoEmotionScores => StageError::Detector(e.to_string()),
            })?;

        let label = selected.dominant.emotion_label.clone();
        let stress = self
            .mode
            .maps_stress()
            .then(|| self.tables.stress_for(&label));

        let mut logged = false;
        if self.mode.logs_mood() {
            let log = self.log.clone();
            let entry = MoodLogEntry::now(label.clone());
            match blocking(move || log.append(&entry)).await {
                Ok(()) => logged = true,
                Err(e) => {
                    tracing::warn!(error = %e, "mood log append failed");
                    report.notice(&StageError::LogIo(e));
                }
            }
        }

        tracing::info!(
            mode = %self.mode,
            emotion = %label,
            confidence = selected.dominant.confidence,
            ?stress,
            logged,
            "upload analysed"
        );

        Ok(Reflection {
            display_label: display_label(&label),
            message: self.tables.message_for(&label).to_string(),
            confidence: selected.dominant.confidence,
            emotions: selected.detection.emotions.clone(),
            face: selected.detection.bounding_box,
            faces_found: detections.len(),
            stress,
            logged,
            emotion: label,
        })
    }

    async fn attach_recent(&self, report: &mut Report) {
        if !self.mode.logs_mood() {
            return;
        }
        match self.recent(self.recent_rows).await {
            Ok(rows) => report.recent = Some(rows),
            Err(e) => {
                tracing::warn!(error = %e, "mood log read failed");
                report.notice(&StageError::LogIo(e));
            }
        }
    }

    /// The last `limit` mood log rows, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<MoodLogEntry>, String> {
        let log = self.log.clone();
        blocking(move || log.read_recent(limit)).await
    }
}

/// Run file I/O off the async workers, flattening both error layers to text.
async fn blocking<T, E>(f: impl FnOnce() -> Result<T, E> + Send + 'static) -> Result<T, String>
where
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}
