//! Append-only CSV history of detected emotions.
//!
//! File layout: header `time,emotion`, then one row per logged detection.
//! The file is created on first append and never rewritten. There is no
//! locking; concurrent writers may interleave rows.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Second-precision ISO-8601 local timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const HEADER: [&str; 2] = ["time", "emotion"];

#[derive(Error, Debug)]
pub enum LogError {
    #[error("mood log {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mood log {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// One row of the mood log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodLogEntry {
    #[serde(rename = "time")]
    pub timestamp: String,
    pub emotion: String,
}

impl MoodLogEntry {
    pub fn new(timestamp: impl Into<String>, emotion: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            emotion: emotion.into(),
        }
    }

    /// Entry stamped with the current local time.
    pub fn now(emotion: impl Into<String>) -> Self {
        Self::at(&Local::now(), emotion)
    }

    pub fn at<Tz: TimeZone>(time: &DateTime<Tz>, emotion: impl Into<String>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self::new(time.format(TIMESTAMP_FORMAT).to_string(), emotion)
    }
}

/// Handle to a mood log file.
#[derive(Debug, Clone)]
pub struct MoodLog {
    path: PathBuf,
}

impl MoodLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new or empty.
    pub fn append(&self, entry: &MoodLogEntry) -> Result<(), LogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let is_new = file.metadata().map_err(|e| self.io_error(e))?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(HEADER).map_err(|e| self.csv_error(e))?;
        }
        writer
            .write_record([entry.timestamp.as_str(), entry.emotion.as_str()])
            .map_err(|e| self.csv_error(e))?;
        writer.flush().map_err(|e| self.io_error(e))?;

        tracing::debug!(
            path = %self.path.display(),
            time = %entry.timestamp,
            emotion = %entry.emotion,
            "mood logged"
        );
        Ok(())
    }

    /// The last `n` rows, newest first. A missing file yields no rows.
    pub fn read_recent(&self, n: usize) -> Result<Vec<MoodLogEntry>, LogError> {
        let mut entries = self.read_all()?;
        let skip = entries.len().saturating_sub(n);
        let mut recent = entries.split_off(skip);
        recent.reverse();
        Ok(recent)
    }

    /// Every row in file order. A missing file yields no rows.
    pub fn read_all(&self) -> Result<Vec<MoodLogEntry>, LogError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        csv::Reader::from_reader(file)
            .deserialize()
            .collect::<Result<Vec<MoodLogEntry>, _>>()
            .map_err(|e| self.csv_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> LogError {
        LogError::Csv {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn log_in(dir: &tempfile::TempDir) -> MoodLog {
        MoodLog::new(dir.path().join("mood_log.csv"))
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(log_in(&dir).read_recent(5).unwrap().is_empty());
    }

    #[test]
    fn test_roundtrip_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        log.append(&MoodLogEntry::new("2024-05-01T10:00:00", "happy")).unwrap();
        log.append(&MoodLogEntry::new("2024-05-01T10:05:00", "sad")).unwrap();

        let recent = log.read_recent(5).unwrap();
        assert_eq!(
            recent,
            vec![
                MoodLogEntry::new("2024-05-01T10:05:00", "sad"),
                MoodLogEntry::new("2024-05-01T10:00:00", "happy"),
            ]
        );
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        log.append(&MoodLogEntry::new("2024-05-01T10:00:00", "happy")).unwrap();
        log.append(&MoodLogEntry::new("2024-05-01T10:00:01", "neutral")).unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            text,
            "time,emotion\n2024-05-01T10:00:00,happy\n2024-05-01T10:00:01,neutral\n"
        );
    }

    #[test]
    fn test_recent_limits_rows() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        for i in 0..8 {
            log.append(&MoodLogEntry::new(format!("2024-05-01T10:00:0{i}"), "fear")).unwrap();
        }
        let recent = log.read_recent(5).unwrap();
        let stamps: Vec<&str> = recent.iter().map(|e| e.timestamp.as_str()).collect();
        assert_eq!(
            stamps,
            vec![
                "2024-05-01T10:00:07",
                "2024-05-01T10:00:06",
                "2024-05-01T10:00:05",
                "2024-05-01T10:00:04",
                "2024-05-01T10:00:03",
            ]
        );
        assert!(log.read_recent(0).unwrap().is_empty());
        assert_eq!(log.read_all().unwrap().len(), 8);
    }

    #[test]
    fn test_append_to_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        std::fs::write(log.path(), "time,emotion\n").unwrap();
        assert!(log.read_recent(5).unwrap().is_empty());

        log.append(&MoodLogEntry::new("2024-05-01T10:00:00", "angry")).unwrap();
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.matches("time,emotion").count(), 1);
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_append_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log = MoodLog::new(dir.path().join("no-such-dir").join("mood_log.csv"));
        let err = log.append(&MoodLogEntry::new("t", "happy")).unwrap_err();
        assert!(matches!(err, LogError::Io { .. }));
    }

    #[test]
    fn test_timestamp_format() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let time = tz.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let entry = MoodLogEntry::at(&time, "surprise");
        assert_eq!(entry.timestamp, "2024-01-02T03:04:05");
        assert_eq!(entry.emotion, "surprise");
    }

    #[test]
    fn test_entry_json_uses_time_key() {
        let json = serde_json::to_string(&MoodLogEntry::new("x", "sad")).unwrap();
        assert_eq!(json, r#"{"time":"x","emotion":"sad"}"#);
    }
}
