//! Process-wide log and trace output.
//!
//! Library code logs through the `log` macros and opens `tracing` spans;
//! both end up in one `tracing-subscriber` fmt layer filtered by `RUST_LOG`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::ReuploadError;

/// Set to `json` for one JSON object per line instead of plain text.
pub const FORMAT_ENV: &str = "REUPLOAD_LOG_FORMAT";

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn wants_json() -> bool {
    std::env::var(FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"))
}

/// Installs the global subscriber and routes `log` records into it.
/// Call once, before any work starts.
pub fn init() -> Result<(), ReuploadError> {
    let registry = Registry::default().with(env_filter());
    let installed = if wants_json() {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json().with_thread_names(true)))
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_thread_names(true)))
    };
    installed.map_err(|e| ReuploadError::Logging(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| ReuploadError::Logging(e.to_string()))?;
    Ok(())
}
