#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use std::process;

use anyhow::{Context, anyhow};
use esdump_dal::Role;
use esdump_engine::DumpReport;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "esdump_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "esdump_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "esdump_cli::config";

/// Failures listed individually before the rest are summarized.
const MAX_LOGGED_FAILURES: usize = 20;

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SHUTDOWN,
            "dump completed successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %format!("{error:#}"),
            "dump terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    telemetry::init_tracing(&cli.log)?;
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        "starting esdump"
    );
    cli.log();

    cli.validate().context("invalid configuration")?;
    let options = cli.transfer_options()?;
    let shared = cli.endpoint_options()?;

    let input = cli.input()?.open(Role::Input, &shared);
    let output = cli.output()?.open(Role::Output, &shared);

    let report = esdump_engine::dump(input, output, options)
        .await
        .context("dump could not start")?;
    log_report(&report);

    let (error, total) = report.completion();
    match error {
        Some(err) => Err(anyhow!(err).context(format!("dump failed after writing {total} units"))),
        None => Ok(()),
    }
}

/// Logs per-session totals, warnings and failed units.
fn log_report(report: &DumpReport) {
    for session in &report.sessions {
        let container = session.container.as_deref().unwrap_or("-");
        for warning in &session.warnings {
            tracing::warn!(target: TRACING_TARGET_SHUTDOWN, container, "{warning}");
        }
        for failure in session.failures.iter().take(MAX_LOGGED_FAILURES) {
            tracing::warn!(
                target: TRACING_TARGET_SHUTDOWN,
                container,
                unit = %failure.label,
                kind = ?failure.kind,
                reason = %failure.message,
                "unit not transferred"
            );
        }
        if session.failures.len() > MAX_LOGGED_FAILURES {
            tracing::warn!(
                target: TRACING_TARGET_SHUTDOWN,
                container,
                omitted = session.failures.len() - MAX_LOGGED_FAILURES,
                "further units not transferred"
            );
        }
        tracing::info!(
            target: TRACING_TARGET_SHUTDOWN,
            container,
            state = %session.state,
            read = session.counters.total_read,
            written = session.counters.total_written,
            deleted = session.counters.total_deleted,
            failed = session.failures.len(),
            "session finished"
        );
    }

    tracing::info!(
        target: TRACING_TARGET_SHUTDOWN,
        sessions = report.sessions.len(),
        total_written = report.total_written(),
        total_deleted = report.total_deleted(),
        "dump totals"
    );
}
