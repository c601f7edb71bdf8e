// Logging module for structured logging using the tracing crate.
//
// Grounded on the teacher's `observability::tracing::TracingManager`, scaled
// down to the piece every deployment needs regardless of whether the fuller
// OpenTelemetry exporter stack (see `observability::config`) is wired in:
// a JSON-formatted `tracing-subscriber` writer gated by `RUST_LOG`.

use std::error::Error;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Initialize the global tracing subscriber for structured logging.
///
/// Emits newline-delimited JSON to stdout, filtered by the `RUST_LOG`
/// environment variable (falling back to `info` when unset or invalid).
/// Safe to call more than once in a process — later calls are no-ops.
///
/// # Examples
///
/// ```
/// use videogate::logging::init_subscriber;
///
/// init_subscriber().expect("failed to initialize logging");
/// tracing::info!("application started");
/// ```
pub fn init_subscriber() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(true)
        .finish();

    // `set_global_default` fails if a subscriber is already installed; that's
    // expected when this is called more than once (e.g. across tests) and
    // not a real error for our purposes.
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}
