//! llmfs - Main entry point.

use anyhow::Result;
use llmfs_backend::{AnthropicBackend, Backend};
use llmfs_common::config::Config;
use llmfs_common::logging::init_logging;
use llmfs_core::{MetricsCollector, Namespace, SessionSettings, SessionStore};
use llmfs_server::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(&config.observability);

    tracing::info!("llmfs v{}", env!("CARGO_PKG_VERSION"));

    let backend: Arc<dyn Backend> = Arc::new(AnthropicBackend::from_config(&config.backend)?);
    let metrics = Arc::new(MetricsCollector::new());
    backend.set_metrics_callback(metrics.callback());

    let mut store = SessionStore::new(backend, SessionSettings::from(&config.session));
    if config.ask_timeout_secs > 0 {
        store = store.with_ask_timeout(Duration::from_secs(config.ask_timeout_secs));
    }

    let shutdown = CancellationToken::new();
    let namespace = Arc::new(Namespace::new(
        Arc::new(store),
        metrics,
        shutdown.clone(),
    ));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    llmfs_server::start_server(&config.server, AppState::new(namespace), shutdown).await
}
