//! Worker server binary.

use tokio::signal;
use tracing::info;

use rsvp_shared::config::ConfigLoader;
use rsvp_shared::logging;
use rsvp_worker::bootstrap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_from_env()?;
    logging::init_tracing(config.environment(), &config.worker.logger);

    info!("Starting rsvp worker server");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!("   Environment: {}", config.environment());

    let handle = bootstrap::bootstrap(&config)
        .await
        .map_err(|e| format!("Failed to bootstrap worker: {e}"))?;

    info!("   Press Ctrl+C to shutdown gracefully");
    shutdown_signal().await;

    info!("Shutdown signal received, draining");
    handle.stop().await;
    info!("Worker shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
