//! Tracing initialization.
//!
//! Logs are written to standard error so standard output stays available
//! as a data stream.

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogConfig, LogFormat};

/// Initializes the tracing subscriber.
///
/// The level is read from `RUST_LOG`, defaulting to `info`:
///
/// ```bash
/// RUST_LOG=debug esdump --input ... --output ...
/// RUST_LOG=esdump_engine=debug,esdump_dal::elasticsearch=trace esdump ...
/// ```
pub(crate) fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let env_filter = create_env_filter()?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.log_format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(config.ansi()),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init(),
    };

    result.context("failed to initialize tracing")
}

/// Creates an environment filter for tracing.
fn create_env_filter() -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to create env filter")
}
