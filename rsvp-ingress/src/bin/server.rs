//! Ingress server binary.

use tokio::signal;
use tracing::{error, info};

use rsvp_ingress::bootstrap;
use rsvp_shared::config::ConfigLoader;
use rsvp_shared::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_from_env()?;
    logging::init_tracing(config.environment(), &config.worker.logger);

    info!("Starting rsvp ingress server");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!("   Environment: {}", config.environment());

    let handle = bootstrap::bootstrap(&config)
        .await
        .map_err(|e| format!("Failed to bootstrap ingress: {e}"))?;

    let listener = tokio::net::TcpListener::bind(&handle.bind_address).await?;
    info!("   Listening on {}", handle.bind_address);
    info!("   Press Ctrl+C to shutdown gracefully");

    let server = axum::serve(listener, handle.router.clone())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        error!("Server error: {e}");
    }

    info!("Shutdown signal received, closing connections");
    handle.stop().await;
    info!("Ingress shutdown complete");

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
