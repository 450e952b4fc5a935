//! Logging initialisation
//!
//! Sets up a `tracing` subscriber for binaries and tests that embed the
//! module system:
//! - Respects RUST_LOG environment variable
//! - Falls back to a configured filter, then to "info"
//! - Safe to call more than once (later calls are ignored)
//!
//! # Usage
//! ```rust
//! use modgraph::utils::init_logging;
//!
//! init_logging(None); // Uses RUST_LOG or defaults to "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Resolve the filter: RUST_LOG, then the configured filter, then "info"
fn resolve_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or("info"))
}

/// Initialize human-readable logging
///
/// # Arguments
/// * `filter` - Optional log filter (e.g., "debug", "modgraph::module::graph=trace").
///   Ignored when RUST_LOG is set.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()), // Respect NO_COLOR standard
        )
        .with(resolve_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging with JSON output (for production/monitoring)
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(resolve_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging from [`LoggingConfig`]
///
/// Falls back to human-readable output when JSON is requested but the
/// `json-logging` feature is off.
pub fn init_logging_from_config(config: &LoggingConfig) -> bool {
    let filter = config.filter.as_deref();

    if config.json_format {
        #[cfg(feature = "json-logging")]
        {
            return init_json_logging(filter);
        }
    }
    init_logging(filter)
}
