//! # Structured Logging
//!
//! Environment-aware tracing initialization. Console output always, JSON
//! formatting in production so log collectors can ingest worker output.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber.
///
/// `log_level` comes from configuration (`app.log_level`); `RUST_LOG`
/// overrides it when set. Safe to call more than once — later calls are
/// no-ops, and an already-installed subscriber (e.g. in tests) is left alone.
pub fn init_logging(log_level: &str, env: &str) {
    let level = log_level.to_string();
    let json_output = env == "production";
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.clone()));

        let result = if json_output {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).json().with_filter(filter))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_filter(filter))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}
