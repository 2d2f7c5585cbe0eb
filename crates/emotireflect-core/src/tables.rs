//! Stress and message lookup tables.
//!
//! The built-in tables are embedded at compile time from
//! `contrib/tables/default.toml`. An alternative file with the same layout can
//! be loaded at runtime to change buckets or wording.

use crate::stress::StressLevel;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_TABLES: &str = include_str!("../../../contrib/tables/default.toml");

static BUILTIN: OnceLock<Tables> = OnceLock::new();

#[derive(Error, Debug)]
pub enum TablesError {
    #[error("failed to read tables file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bad tables TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("label {label:?} is listed in both the {first} and {second} stress buckets")]
    DuplicateLabel {
        label: String,
        first: StressLevel,
        second: StressLevel,
    },
}

/// File layout of a tables TOML document.
#[derive(Debug, Clone, Deserialize)]
struct TablesFile {
    stress: StressSection,
    messages: MessagesSection,
}

/// `[stress]` section: label lists per bucket.
#[derive(Debug, Clone, Default, Deserialize)]
struct StressSection {
    #[serde(default)]
    high: Vec<String>,
    #[serde(default)]
    moderate: Vec<String>,
    #[serde(default)]
    low: Vec<String>,
}

/// `[messages]` section.
#[derive(Debug, Clone, Deserialize)]
struct MessagesSection {
    default: String,
    #[serde(default)]
    emotions: HashMap<String, String>,
}

/// Emotion label lookups: stress bucket and canned message.
#[derive(Debug, Clone)]
pub struct Tables {
    stress: HashMap<String, StressLevel>,
    messages: HashMap<String, String>,
    default_message: String,
}

impl Tables {
    /// Tables shipped with the binary. Parsed once per process.
    pub fn builtin() -> &'static Tables {
        BUILTIN.get_or_init(|| match Tables::from_toml_str(DEFAULT_TABLES) {
            Ok(tables) => tables,
            Err(e) => {
                tracing::error!(error = %e, "built-in tables are invalid; using empty tables");
                Tables {
                    stress: HashMap::new(),
                    messages: HashMap::new(),
                    default_message: String::new(),
                }
            }
        })
    }

    /// Load tables from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TablesError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| TablesError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let tables = Self::from_toml_str(&src)?;
        tracing::info!(
            path = %path.display(),
            stress_labels = tables.stress.len(),
            messages = tables.messages.len(),
            "loaded lookup tables"
        );
        Ok(tables)
    }

    pub fn from_toml_str(src: &str) -> Result<Self, TablesError> {
        let file: TablesFile = toml::from_str(src)?;

        let mut stress = HashMap::new();
        let buckets = [
            (StressLevel::High, &file.stress.high),
            (StressLevel::Moderate, &file.stress.moderate),
            (StressLevel::Low, &file.stress.low),
        ];
        for (level, labels) in buckets {
            for label in labels {
                let key = normalize_label(label);
                if let Some(&first) = stress.get(&key) {
                    return Err(TablesError::DuplicateLabel {
                        label: key,
                        first,
                        second: level,
                    });
                }
                stress.insert(key, level);
            }
        }

        let messages = file
            .messages
            .emotions
            .into_iter()
            .map(|(label, text)| (normalize_label(&label), text))
            .collect();

        Ok(Self {
            stress,
            messages,
            default_message: file.messages.default,
        })
    }

    /// Stress bucket for a label. Unlisted labels are `Unknown`.
    pub fn stress_for(&self, label: &str) -> StressLevel {
        self.stress
            .get(&normalize_label(label))
            .copied()
            .unwrap_or(StressLevel::Unknown)
    }

    /// Canned message for a label, falling back to the default message.
    pub fn message_for(&self, label: &str) -> &str {
        self.messages
            .get(&normalize_label(label))
            .map(String::as_str)
            .unwrap_or(&self.default_message)
    }

    pub fn default_message(&self) -> &str {
        &self.default_message
    }

    /// Stress entries sorted by bucket then label, for display.
    pub fn stress_entries(&self) -> Vec<(&str, StressLevel)> {
        let mut entries: Vec<(&str, StressLevel)> = self
            .stress
            .iter()
            .map(|(label, &level)| (label.as_str(), level))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));
        entries
    }

    /// Message entries sorted by label, for display.
    pub fn message_entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .messages
            .iter()
            .map(|(label, text)| (label.as_str(), text.as_str()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

/// Heading form of a label: first letter upper-cased, rest lower-cased.
pub fn display_label(label: &str) -> String {
    let lower = label.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
