use anyhow::{Context, Result};
use emotireflect_core::{EmotionDetector, OnnxEmotionDetector, Tables};
use emotireflect_io::MoodLog;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod chart;
mod config;
mod engine;
mod page;
mod pipeline;
mod routes;
#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "emotireflectd starting");

    let config = config::Config::from_env();
    tracing::info!(
        addr = %config.http_addr,
        mode = %config.mode,
        model_dir = %config.model_dir.display(),
        log_path = %config.log_path.display(),
        "configuration loaded"
    );

    let tables = match &config.tables_path {
        Some(path) => {
            let tables = Tables::load(path)
                .with_context(|| format!("loading lookup tables from {}", path.display()))?;
            tracing::info!(path = %path.display(), "custom lookup tables loaded");
            tables
        }
        None => Tables::builtin().clone(),
    };

    // Models are loaded on the engine thread when the first photo arrives.
    let detector_config = config.detector();
    let engine = engine::spawn_engine(Box::new(move || {
        OnnxEmotionDetector::load(&detector_config)
            .map(|detector| Box::new(detector) as Box<dyn EmotionDetector>)
    }))?;

    let pipeline = pipeline::Pipeline::new(
        config.mode,
        Arc::new(tables),
        MoodLog::new(&config.log_path),
        config.recent_rows,
        engine,
    );
    let app = routes::router(routes::AppState::new(pipeline), config.body_limit);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("binding {}", config.http_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "emotireflectd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("emotireflectd shutting down");
    Ok(())
}
