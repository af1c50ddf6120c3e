//! Tracing subscriber setup shared by the server and the CLI.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::env::APP_CONFIG;

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. `LOG_FORMAT=json` switches
/// stdout to JSON lines, and `LOG_FILE` adds a plain-text file sink.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout_layer = if APP_CONFIG.log_format.eq_ignore_ascii_case("json") {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let mut file_error = None;
    let file_layer = if APP_CONFIG.log_file.is_empty() {
        None
    } else {
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&APP_CONFIG.log_file)
        {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .boxed(),
            ),
            Err(e) => {
                file_error = Some(e);
                None
            }
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!(path = %APP_CONFIG.log_file, error = %e, "Could not open log file");
    }
}
