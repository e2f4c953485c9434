use std::process::ExitCode;
use std::sync::Arc;

use nodescope::backend::http::HttpBackend;
use nodescope::backend::retry::RetryingBackend;
use nodescope::config::NodescopeConfig;
use nodescope::error::ErrorCode;
use nodescope::session::Session;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    if let Err(e) = dotenv {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let config = match NodescopeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "configuration invalid");
            return ExitCode::FAILURE;
        }
    };

    let http = match HttpBackend::new(&config.backend_url, config.timeouts) {
        Ok(http) => http,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "backend client init failed");
            return ExitCode::FAILURE;
        }
    };
    let backend = Arc::new(RetryingBackend::new(http, config.retry));

    let preset = config.initial_preset();
    tracing::info!(
        backend = %config.backend_url,
        dataset = %preset.dataset,
        entities = preset.selected_entities.len(),
        features = preset.selected_features.len(),
        debounce_ms = config.cluster_debounce.as_millis(),
        "starting session"
    );
    let session = Session::new(preset, backend);

    if let Err(e) = session.initialize().await {
        tracing::error!(error = %e, code = e.error_code(), retryable = e.retryable(), "initial load failed");
        return ExitCode::FAILURE;
    }

    let snap = session.snapshot().await;
    tracing::info!(
        dataset = %snap.dataset,
        rows = snap.telemetry.len(),
        extent = ?snap.telemetry.time_extent(),
        features = snap.dataset_features().len(),
        scored_entities = snap.zscores.len(),
        clusters = snap.clusters.clusters().len(),
        projected = snap.projection.len(),
        baselines = snap.baselines.len(),
        "dataset loaded"
    );
    ExitCode::SUCCESS
}
