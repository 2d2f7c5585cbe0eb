//! emotireflect-io: everything that touches files on behalf of the pipeline.
//!
//! Decodes uploaded photos, hands them to file-based detectors through a
//! temporary file, and keeps the append-only CSV mood log.

pub mod ingest;
pub mod mood_log;

pub use ingest::{decode_upload, preview_data_uri, IngestError, Photo, TempPhoto};
pub use mood_log::{LogError, MoodLog, MoodLogEntry};
