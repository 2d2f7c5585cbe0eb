use emotireflect_core::{AnalyzeError, Detection, EmotionDetector};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Builds the detector. Called at most once, on the first analysis request.
pub type DetectorLoader =
    Box<dyn FnOnce() -> Result<Box<dyn EmotionDetector>, AnalyzeError> + Send + 'static>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("emotion detector unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error("failed to start engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Lifecycle of the process-wide detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum DetectorState {
    NotLoaded,
    Ready,
    Failed(String),
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Analyze {
        path: PathBuf,
        reply: oneshot::Sender<Result<Vec<Detection>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    state: Arc<RwLock<DetectorState>>,
}

impl EngineHandle {
    /// Analyse the image file at `path`. Requests are served one at a time.
    pub async fn analyze_file(&self, path: PathBuf) -> Result<Vec<Detection>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze { path, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn state(&self) -> DetectorState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The detector is not built until the first request arrives; after that it
/// stays resident for the life of the process. A failed load is remembered
/// and reported to every later request without retrying.
pub fn spawn_engine(loader: DetectorLoader) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let state = Arc::new(RwLock::new(DetectorState::NotLoaded));
    let thread_state = Arc::clone(&state);

    std::thread::Builder::new()
        .name("emotireflect-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut slot = DetectorSlot::new(loader, thread_state);
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { path, reply } => {
                        let result = slot.analyze_guarded(&path);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, state })
}

/// Lazily initialised detector owned by the engine thread.
struct DetectorSlot {
    loader: Option<DetectorLoader>,
    detector: Option<Box<dyn EmotionDetector>>,
    state: Arc<RwLock<DetectorState>>,
}

impl DetectorSlot {
    fn new(loader: DetectorLoader, state: Arc<RwLock<DetectorState>>) -> Self {
        Self {
            loader: Some(loader),
            detector: None,
            state,
        }
    }

    /// Like [`analyze`](Self::analyze), but a panic in the detector retires it
    /// instead of killing the engine thread.
    fn analyze_guarded(&mut self, path: &Path) -> Result<Vec<Detection>, EngineError> {
        match catch_unwind(AssertUnwindSafe(|| self.analyze(path))) {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(reason = %reason, "emotion detector panicked; disabling it");
                self.loader = None;
                self.detector = None;
                let reason = format!("detector panicked: {reason}");
                *self.state.write().unwrap_or_else(|p| p.into_inner()) =
                    DetectorState::Failed(reason.clone());
                Err(EngineError::Unavailable(reason))
            }
        }
    }

    fn analyze(&mut self, path: &Path) -> Result<Vec<Detection>, EngineError> {
        if let Some(load) = self.loader.take() {
            let started = std::time::Instant::now();
            let next = match load() {
                Ok(detector) => {
                    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "emotion detector loaded");
                    self.detector = Some(detector);
                    DetectorState::Ready
                }
                Err(e) => {
                    tracing::error!(error = %e, "emotion detector failed to load");
                    DetectorState::Failed(e.to_string())
                }
            };
            *self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
        }

        match self.detector.as_mut() {
            Some(detector) => Ok(detector.detect_emotions_at(path)?),
            None => {
                let reason = match &*self.state.read().unwrap_or_else(|p| p.into_inner()) {
                    DetectorState::Failed(reason) => reason.clone(),
                    _ => "detector not loaded".to_string(),
                };
                Err(EngineError::Unavailable(reason))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{png_file, ScriptedDetector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_loader(
        loads: Arc<AtomicUsize>,
        detector: ScriptedDetector,
    ) -> DetectorLoader {
        Box::new(move || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(detector) as Box<dyn EmotionDetector>)
        })
    }

    #[tokio::test]
    async fn test_detector_loaded_lazily_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let detector = ScriptedDetector::faces(vec![ScriptedDetector::face(10, 10, &[("happy", 0.9)])]);
        let engine = spawn_engine(counting_loader(loads.clone(), detector)).unwrap();

        assert_eq!(engine.state(), DetectorState::NotLoaded);
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        let (_dir, path) = png_file();
        let first = engine.analyze_file(path.clone()).await.unwrap();
        let second = engine.analyze_file(path).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state(), DetectorState::Ready);
    }

    #[tokio::test]
    async fn test_load_failure_is_remembered() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let engine = spawn_engine(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AnalyzeError::Other("model missing".into()))
        }))
        .unwrap();

        let (_dir, path) = png_file();
        for _ in 0..2 {
            match engine.analyze_file(path.clone()).await {
                Err(EngineError::Unavailable(reason)) => assert!(reason.contains("model missing")),
                other => panic!("expected Unavailable, got {other:?}"),
            }
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state(), DetectorState::Failed("model missing".into()));
    }

    #[tokio::test]
    async fn test_analysis_errors_pass_through() {
        let engine = spawn_engine(counting_loader(
            Arc::new(AtomicUsize::new(0)),
            ScriptedDetector::failing("tensor shape mismatch"),
        ))
        .unwrap();

        let (_dir, path) = png_file();
        let err = engine.analyze_file(path).await.unwrap_err();
        assert!(matches!(err, EngineError::Analyze(AnalyzeError::Other(_))));
        assert_eq!(engine.state(), DetectorState::Ready);
    }

    struct Exploding;

    impl EmotionDetector for Exploding {
        fn detect_emotions(&mut self, _image: &image::RgbImage) -> Result<Vec<Detection>, AnalyzeError> {
            panic!("tensor index out of bounds");
        }
    }

    #[tokio::test]
    async fn test_detector_panic_marks_failed_and_keeps_thread() {
        let engine =
            spawn_engine(Box::new(|| Ok(Box::new(Exploding) as Box<dyn EmotionDetector>))).unwrap();

        let (_dir, path) = png_file();
        match engine.analyze_file(path.clone()).await {
            Err(EngineError::Unavailable(reason)) => {
                assert!(reason.contains("tensor index out of bounds"))
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert!(matches!(engine.state(), DetectorState::Failed(reason) if reason.contains("panicked")));

        // The thread is still serving requests.
        assert!(matches!(
            engine.analyze_file(path).await,
            Err(EngineError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_decode_error() {
        let engine = spawn_engine(counting_loader(
            Arc::new(AtomicUsize::new(0)),
            ScriptedDetector::faces(vec![]),
        ))
        .unwrap();

        let err = engine
            .analyze_file(PathBuf::from("/nonexistent/upload.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Analyze(AnalyzeError::Decode { .. })));
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_string(&DetectorState::Failed("boom".into())).unwrap();
        assert_eq!(json, r#"{"state":"failed","error":"boom"}"#);
        let json = serde_json::to_string(&DetectorState::Ready).unwrap();
        assert_eq!(json, r#"{"state":"ready"}"#);
    }
}
