//! Logging initialization
//!
//! - Respects the RUST_LOG environment variable (it always wins)
//! - Falls back to the configured filter, then to "info"
//! - Writes to stderr so generated output on stdout stays clean
//!
//! # Usage
//! ```no_run
//! use addon_registry::utils::init_logging;
//!
//! init_logging(None); // Uses RUST_LOG or defaults to "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Pick the filter: RUST_LOG, then the config filter, then "info"
fn build_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or("info"))
}

/// Initialize human-readable logging
///
/// # Arguments
/// * `filter` - Optional log filter from config (e.g. "debug",
///   "addon_registry::module=trace"). Ignored when RUST_LOG is set.
pub fn init_logging(filter: Option<&str>) {
    // try_init: a second call (tests, embedding hosts) must not panic
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(build_filter(filter))
        .try_init();
}

/// Initialize logging with JSON output (for CI / log aggregation)
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(build_filter(filter))
        .try_init();
}

/// Initialize logging from [`LoggingConfig`]
pub fn init_logging_from_config(config: Option<&LoggingConfig>) {
    let filter = config.and_then(|c| c.filter.as_deref());

    if config.map(|c| c.json_format).unwrap_or(false) {
        #[cfg(feature = "json-logging")]
        {
            init_json_logging(filter);
        }
        #[cfg(not(feature = "json-logging"))]
        {
            init_logging(filter);
            tracing::warn!("json_format requested but the json-logging feature is disabled");
        }
    } else {
        init_logging(filter);
    }
}
