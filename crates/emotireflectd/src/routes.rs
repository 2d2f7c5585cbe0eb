//! HTTP surface: the page plus a small JSON API.

use crate::engine::DetectorState;
use crate::page;
use crate::pipeline::{Outcome, Pipeline, Report};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use emotireflect_core::PipelineMode;
use emotireflect_io::MoodLogEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Multipart form field carrying the photo.
const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(index).post(upload))
        .route("/api/analyze", post(api_analyze))
        .route("/api/log", get(api_log))
        .route("/api/status", get(api_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    code: &'static str,
    message: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::new(e.status(), "BAD_UPLOAD", e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

/// Bytes of the `file` field, or `None` when no photo was chosen.
async fn read_upload(mut multipart: Multipart) -> Result<Option<Vec<u8>>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field.bytes().await?;
            return Ok((!bytes.is_empty()).then(|| bytes.to_vec()));
        }
    }
    Ok(None)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(page::render(&state.pipeline.idle().await))
}

async fn upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    match read_upload(multipart).await {
        Ok(Some(bytes)) => {
            tracing::info!(bytes = bytes.len(), "upload received");
            Html(page::render(&state.pipeline.analyze(&bytes).await)).into_response()
        }
        Ok(None) => Html(page::render(&state.pipeline.idle().await)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "malformed upload");
            (e.status(), Html(page::render(&state.pipeline.idle().await))).into_response()
        }
    }
}

async fn api_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    let bytes = read_upload(multipart).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "MISSING_FILE",
            format!("multipart field '{UPLOAD_FIELD}' is required"),
        )
    })?;

    let report = state.pipeline.analyze(&bytes).await;
    let status = match report.outcome {
        Outcome::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
        Outcome::DetectorFailed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    Ok((status, Json(report)))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

async fn api_log(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<MoodLogEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(state.pipeline.recent_rows());
    state
        .pipeline
        .recent(limit)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "LOG_IO", e))
}

#[derive(Debug, Serialize)]
struct Status {
    version: &'static str,
    mode: PipelineMode,
    detector: DetectorState,
    log_path: String,
}

async fn api_status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        version: env!("CARGO_PKG_VERSION"),
        mode: state.pipeline.mode(),
        detector: state.pipeline.engine().state(),
        log_path: state.pipeline.log().path().display().to_string(),
    })
}
