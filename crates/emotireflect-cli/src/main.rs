use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use emotireflect_core::classifier::TensorLayout;
use emotireflect_core::{
    display_label, select_dominant, DetectorConfig, EmotionDetector, FaceSelection,
    OnnxEmotionDetector, Tables,
};
use reqwest::StatusCode;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "emotireflect", about = "EmotiReflect emotion mirror CLI")]
struct Cli {
    /// Base URL of a running emotireflectd
    #[arg(long, global = true, env = "EMOTIREFLECT_URL", default_value = "http://127.0.0.1:8501")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a photo to the daemon and show the reflected emotion
    Analyze {
        image: PathBuf,
        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent mood log rows
    Log {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show daemon status
    Status,
    /// Run the local detector on a photo (bypasses the daemon)
    ///
    /// Reads the same EMOTIREFLECT_* model and table settings as emotireflectd.
    Check {
        image: PathBuf,
        /// Directory containing det_10g.onnx and emotion_mini_xception.onnx
        #[arg(long, env = "EMOTIREFLECT_MODEL_DIR")]
        model_dir: Option<PathBuf>,
        /// Emotion model input layout (nhwc or nchw)
        #[arg(long, env = "EMOTIREFLECT_EMOTION_LAYOUT", default_value = "nhwc")]
        layout: TensorLayout,
        /// Minimum face detection score
        #[arg(long, env = "EMOTIREFLECT_FACE_THRESHOLD")]
        face_threshold: Option<f32>,
        /// Emotion labels in model output order, comma separated
        #[arg(long, env = "EMOTIREFLECT_EMOTION_LABELS", value_delimiter = ',')]
        labels: Option<Vec<String>>,
        /// TOML override for the stress and message tables
        #[arg(long, env = "EMOTIREFLECT_TABLES_PATH")]
        tables: Option<PathBuf>,
    },
    /// Print the effective stress and message tables
    Tables {
        /// TOML override file; defaults to the built-in tables
        #[arg(long, env = "EMOTIREFLECT_TABLES_PATH")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Analyze { image, json } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let form = reqwest::multipart::Form::new()
                .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

            tracing::debug!(path = %image.display(), server = %server, "uploading photo");
            let response = reqwest::Client::new()
                .post(format!("{server}/api/analyze"))
                .multipart(form)
                .send()
                .await
                .with_context(|| format!("connecting to {server}"))?;
            let status = response.status();
            let body = response.text().await?;
            let report = analyze_report(status, &body)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", summarize_report(&report));
            }
        }
        Commands::Log { limit } => {
            let mut url = format!("{server}/api/log");
            if let Some(limit) = limit {
                url.push_str(&format!("?limit={limit}"));
            }
            let rows: Value = get_json(&url).await?;
            match rows.as_array() {
                Some(rows) if rows.is_empty() => println!("No moods logged yet."),
                Some(rows) => {
                    for row in rows {
                        println!("{}  {}", text(&row["time"]), text(&row["emotion"]));
                    }
                }
                None => bail!("unexpected response: {rows}"),
            }
        }
        Commands::Status => {
            let status = get_json(&format!("{server}/api/status")).await?;
            println!("emotireflectd {}", text(&status["version"]));
            println!("  mode:     {}", text(&status["mode"]));
            println!("  detector: {}", text(&status["detector"]["state"]));
            if let Some(error) = status["detector"]["error"].as_str() {
                println!("  error:    {error}");
            }
            println!("  log:      {}", text(&status["log_path"]));
        }
        Commands::Check {
            image,
            model_dir,
            layout,
            face_threshold,
            labels,
            tables,
        } => {
            let model_dir = model_dir.unwrap_or_else(emotireflect_core::default_model_dir);
            let config = check_config(&model_dir, layout, face_threshold, labels);
            let tables = load_tables(tables.as_deref())?;
            println!("Loading models from {}", model_dir.display());
            let mut detector = OnnxEmotionDetector::load(&config)?;

            let started = std::time::Instant::now();
            let detections = detector.detect_emotions_at(&image)?;
            println!("{} face(s) in {:.0?}", detections.len(), started.elapsed());

            for (i, detection) in detections.iter().enumerate() {
                let b = detection.bounding_box;
                println!("face {i}: {}x{} at ({}, {})", b.width, b.height, b.x, b.y);
                for (label, confidence) in detection.emotions.iter() {
                    println!("  {label:<10} {confidence:.2}");
                }
            }

            match select_dominant(&detections, FaceSelection::Largest) {
                Ok(selected) => {
                    let label = &selected.dominant.emotion_label;
                    println!(
                        "Dominant: {} ({:.2}), stress {}",
                        display_label(label),
                        selected.dominant.confidence,
                        tables.stress_for(label)
                    );
                    println!("{}", tables.message_for(label));
                }
                Err(e) => println!("{e}"),
            }
        }
        Commands::Tables { path } => {
            let tables = load_tables(path.as_deref())?;
            println!("Stress buckets:");
            for (label, level) in tables.stress_entries() {
                println!("  {label:<10} {level}");
            }
            println!("Messages:");
            for (label, message) in tables.message_entries() {
                println!("  {label:<10} {message}");
            }
            println!("  {:<10} {}", "(default)", tables.default_message());
        }
    }

    Ok(())
}

async fn get_json(url: &str) -> Result<Value> {
    tracing::debug!(url, "requesting");
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    let status = response.status();
    if !status.is_success() {
        bail!("{url}: HTTP {status}: {}", response.text().await.unwrap_or_default());
    }
    Ok(response.json().await?)
}

/// Detector settings for `check`, defaulting like the daemon does.
fn check_config(
    model_dir: &Path,
    layout: TensorLayout,
    face_threshold: Option<f32>,
    labels: Option<Vec<String>>,
) -> DetectorConfig {
    let defaults = DetectorConfig::in_dir(model_dir);
    let labels = labels
        .map(|labels| {
            labels
                .iter()
                .map(|l| l.trim().to_ascii_lowercase())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|labels| !labels.is_empty())
        .unwrap_or(defaults.emotion_labels.clone());

    DetectorConfig {
        emotion_layout: layout,
        face_threshold: face_threshold.unwrap_or(defaults.face_threshold),
        emotion_labels: labels,
        ..defaults
    }
}

fn load_tables(path: Option<&Path>) -> Result<Tables> {
    match path {
        Some(path) => Tables::load(path).with_context(|| format!("loading tables from {}", path.display())),
        None => Ok(Tables::builtin().clone()),
    }
}

/// Parse an `/api/analyze` response body.
///
/// Reports are accepted whatever the status, since the daemon answers 422 and
/// 500 with a full report. Anything else is turned into an error.
fn analyze_report(status: StatusCode, body: &str) -> Result<Value> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => bail!("HTTP {status}: {}", body.trim()),
    };
    if value.get("outcome").is_some() {
        return Ok(value);
    }
    match (value["code"].as_str(), value["message"].as_str()) {
        (Some(code), Some(message)) => bail!("HTTP {status}: {code}: {message}"),
        _ => bail!("HTTP {status}: unexpected response: {value}"),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Human-readable rendering of an `/api/analyze` report.
fn summarize_report(report: &Value) -> String {
    let mut out = String::new();
    for notice in report["notices"].as_array().into_iter().flatten() {
        out.push_str(&format!("[{}] {}\n", text(&notice["level"]), text(&notice["message"])));
    }

    let outcome = &report["outcome"];
    if outcome["status"] == "detected" {
        let label = outcome["emotion"].as_str().unwrap_or_default();
        out.push_str(&format!(
            "Detected Emotion: {} ({:.2})\n",
            display_label(label),
            outcome["confidence"].as_f64().unwrap_or_default()
        ));
        if let Some(scores) = outcome["emotions"].as_object() {
            for (label, confidence) in scores {
                out.push_str(&format!("  {label:<10} {:.2}\n", confidence.as_f64().unwrap_or_default()));
            }
        }
        if let Some(stress) = outcome["stress"].as_str() {
            out.push_str(&format!("Stress level: {}\n", display_label(stress)));
        }
        out.push_str(&format!("{}\n", text(&outcome["message"])));
    }
    out
}
