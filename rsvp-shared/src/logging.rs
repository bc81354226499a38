//! Environment-aware structured logging.
//!
//! Console output for interactive use plus a JSON file per process under
//! `log/`, so async dispatch/consume interleavings can be reconstructed
//! after the fact.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize tracing for a service process. Idempotent.
///
/// The filter comes from `RUST_LOG` when set, otherwise from the
/// environment profile (`debug` in development, `info` elsewhere).
pub fn init_tracing(environment: &str, default_level: &str) {
    if LOGGER_GUARD.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let log_dir = PathBuf::from("log");
    if !log_dir.exists() && fs::create_dir_all(&log_dir).is_err() {
        // Fall back to console-only logging when the directory is not writable.
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_filter(filter))
            .try_init();
        return;
    }

    let file_name = format!("{}.{}.log", environment, process::id());
    let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .with_filter(filter),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new("info")),
        )
        .try_init();

    let _ = LOGGER_GUARD.set(guard);
}
