//! Fan-out over every container of the input, and the `dump()` entry point.

use std::sync::Arc;

use esdump_core::{ContainerRef, Error, ErrorKind, Result};
use esdump_dal::Transport;
use futures::StreamExt;

use crate::session::{DumpSession, TransferReport, check_output_format};
use crate::TransferOptions;

/// Tracing target for fan-out operations.
const TRACING_TARGET: &str = "esdump_engine::fanout";

/// Outcome of a whole dump: one report per session.
#[derive(Debug, Default)]
pub struct DumpReport {
    /// Session reports, in container order.
    pub sessions: Vec<TransferReport>,
    /// Failure outside any session: discovery or finishing the output.
    pub error: Option<Error>,
}

impl DumpReport {
    /// Returns the grand total of units written.
    pub fn total_written(&self) -> u64 {
        self.sessions
            .iter()
            .map(|report| report.counters.total_written)
            .sum()
    }

    /// Returns the grand total of source records deleted.
    pub fn total_deleted(&self) -> u64 {
        self.sessions
            .iter()
            .map(|report| report.counters.total_deleted)
            .sum()
    }

    /// Returns the sessions that failed.
    pub fn failed(&self) -> impl Iterator<Item = &TransferReport> {
        self.sessions.iter().filter(|report| !report.is_success())
    }

    /// Returns whether every session completed and the output was finished.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed().next().is_none()
    }

    /// Returns the caller-facing completion signal.
    ///
    /// Session failures are surfaced together in one error; a single failed
    /// session keeps its own error kind.
    pub fn completion(&self) -> (Option<Error>, u64) {
        let total = self.total_written();
        if let Some(err) = &self.error {
            return (Some(Error::new(err.kind()).with_message(message_of(err))), total);
        }

        let failed: Vec<&TransferReport> = self.failed().collect();
        let error = match failed.as_slice() {
            [] => None,
            [report] => report.error.as_ref().map(|err| {
                let message = match &report.container {
                    Some(container) => format!("{container}: {}", message_of(err)),
                    None => message_of(err),
                };
                Error::new(err.kind()).with_message(message)
            }),
            reports => {
                let kind = reports
                    .iter()
                    .filter_map(|report| report.error.as_ref().map(Error::kind))
                    .reduce(|a, b| if a == b { a } else { ErrorKind::Internal })
                    .unwrap_or(ErrorKind::Internal);
                let details: Vec<String> = reports
                    .iter()
                    .filter_map(|report| {
                        report.error.as_ref().map(|err| describe_failure(report, err))
                    })
                    .collect();
                Some(Error::new(kind).with_message(format!(
                    "{} of {} sessions failed: {}",
                    reports.len(),
                    self.sessions.len(),
                    details.join("; ")
                )))
            }
        };
        (error, total)
    }
}

fn message_of(err: &Error) -> String {
    err.message
        .clone()
        .unwrap_or_else(|| err.kind_str().to_owned())
}

fn describe_failure(report: &TransferReport, err: &Error) -> String {
    match &report.container {
        Some(container) => format!("{container}: {err}"),
        None => err.to_string(),
    }
}

/// Runs one session per container discovered at the input.
///
/// A failed session is recorded and the remaining containers continue.
#[derive(Clone)]
pub struct FanOut {
    input: Arc<dyn Transport>,
    output: Arc<dyn Transport>,
    options: TransferOptions,
}

impl FanOut {
    /// Creates a fan-out, checking that the input can enumerate containers.
    pub fn new(
        input: Arc<dyn Transport>,
        output: Arc<dyn Transport>,
        options: TransferOptions,
    ) -> Result<Self> {
        options.validate()?;
        check_output_format(output.as_ref(), &options)?;
        if !input.capabilities().discover {
            return Err(Error::configuration_invalid()
                .with_message(format!("{} cannot list its containers", input.describe())));
        }
        Ok(Self {
            input,
            output,
            options,
        })
    }

    /// Lists the containers to transfer, minus the excluded ones.
    pub async fn discover(&self) -> Result<Vec<String>> {
        let input = Arc::clone(&self.input);
        let mut containers = self.options.retry.retry(|| input.discover()).await?;
        containers.retain(|name| !self.options.exclude.contains(name));
        Ok(containers)
    }

    /// Runs every session. Sessions run `fan_out_concurrency` at a time.
    pub async fn run(&self) -> DumpReport {
        let containers = match self.discover().await {
            Ok(containers) => containers,
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    input = %self.input.describe(),
                    error = %err,
                    "Container discovery failed"
                );
                return DumpReport {
                    sessions: Vec::new(),
                    error: Some(err),
                };
            }
        };

        tracing::info!(
            target: TRACING_TARGET,
            containers = containers.len(),
            concurrency = self.options.fan_out_concurrency,
            excluded = self.options.exclude.len(),
            "Starting fan-out"
        );

        let sessions: Vec<TransferReport> = futures::stream::iter(containers)
            .map(|name| self.run_one(name))
            .buffered(self.options.fan_out_concurrency.max(1))
            .collect()
            .await;

        let report = DumpReport {
            sessions,
            error: None,
        };
        tracing::info!(
            target: TRACING_TARGET,
            sessions = report.sessions.len(),
            failed = report.failed().count(),
            total_written = report.total_written(),
            "Fan-out completed"
        );
        report
    }

    async fn run_one(&self, name: String) -> TransferReport {
        let session = DumpSession::new(
            Arc::clone(&self.input),
            Arc::clone(&self.output),
            self.options.clone(),
        );
        match session {
            Ok(session) => {
                session
                    .with_container(Some(ContainerRef::new(name)))
                    .run()
                    .await
            }
            Err(err) => TransferReport::rejected(Some(name), err),
        }
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("input", &self.input.describe())
            .field("output", &self.output.describe())
            .field("concurrency", &self.options.fan_out_concurrency)
            .finish_non_exhaustive()
    }
}

/// Runs a whole dump and finishes the output exactly once.
///
/// With `fan_out_all` every discovered container is transferred; otherwise
/// one session reads the input's own container. Configuration errors are
/// returned before anything is read.
pub async fn dump(
    input: Arc<dyn Transport>,
    output: Arc<dyn Transport>,
    options: TransferOptions,
) -> Result<DumpReport> {
    let mut report = if options.fan_out_all {
        FanOut::new(input, Arc::clone(&output), options)?.run().await
    } else {
        let session = DumpSession::new(input, Arc::clone(&output), options)?;
        DumpReport {
            sessions: vec![session.run().await],
            error: None,
        }
    };

    if let Err(err) = output.finish().await {
        tracing::error!(
            target: TRACING_TARGET,
            output = %output.describe(),
            error = %err,
            "Failed to finish output"
        );
        report.error.get_or_insert(err);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use esdump_dal::{Capabilities, MemoryTransport};

    use super::*;
    use crate::RetryConfig;

    fn options() -> TransferOptions {
        TransferOptions {
            limit: 100,
            fan_out_all: true,
            retry: RetryConfig::new(2, Duration::from_millis(1)),
            ..TransferOptions::default()
        }
    }

    fn source() -> Arc<MemoryTransport> {
        let source = MemoryTransport::new("source");
        source.seed("source_index", 250);
        source.seed("another_index", 120);
        source.seed("third_index", 30);
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_fan_out_writes_every_container() {
        let source = source();
        let destination = Arc::new(MemoryTransport::new("destination"));

        let report = dump(source.clone(), destination.clone(), options())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.sessions.len(), 3);
        assert_eq!(report.total_written(), 400);
        assert_eq!(destination.count("source_index"), 250);
        assert_eq!(destination.count("another_index"), 120);
        assert_eq!(destination.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_excluded_containers_are_skipped() {
        let source = source();
        let destination = Arc::new(MemoryTransport::new("destination"));
        let options = TransferOptions {
            exclude: vec!["third_index".into()],
            fan_out_concurrency: 2,
            ..options()
        };

        let report = dump(source, destination.clone(), options).await.unwrap();
        assert_eq!(report.total_written(), 370);
        assert_eq!(destination.count("third_index"), 0);
    }

    #[tokio::test]
    async fn test_failed_container_does_not_stop_the_others() {
        let source = source();
        source.fail_container("another_index");
        let destination = Arc::new(MemoryTransport::new("destination"));

        let report = dump(source, destination.clone(), options()).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.total_written(), 280);

        let (error, total) = report.completion();
        assert_eq!(total, 280);
        let error = error.unwrap();
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(error.to_string().contains("another_index"));
        assert_eq!(destination.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_single_session_dump_finishes_output() {
        let source = Arc::new(MemoryTransport::new("source").with_container(ContainerRef::new("source_index")));
        source.seed("source_index", 10);
        let destination = Arc::new(MemoryTransport::new("destination"));
        let options = TransferOptions {
            fan_out_all: false,
            ..options()
        };

        let report = dump(source, destination.clone(), options).await.unwrap();
        assert_eq!(report.completion().1, 10);
        assert!(report.completion().0.is_none());
        assert_eq!(destination.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_requires_discovery() {
        let source = Arc::new(MemoryTransport::new("file").with_capabilities(Capabilities::sequential()));
        let destination = Arc::new(MemoryTransport::new("destination"));
        let err = dump(source, destination, options()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
    }
}
