//! Dump session: drives one input/output pair to completion.

use std::sync::Arc;

use esdump_core::{ContainerRef, Error, RecordRef, Result, Unit};
use esdump_dal::{Format, RecordFailure, Transport};
use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::cursor::CursorManager;
use crate::transform::transform;
use crate::TransferOptions;

/// Tracing target for session operations.
const TRACING_TARGET: &str = "esdump_engine::session";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    FetchingFirstBatch,
    WritingBatch,
    FetchingNextBatch,
    DeletingSource,
    Completed,
    Failed,
}

/// Counters of one session. Only ever increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferCounters {
    /// Units fetched and handed to the transform.
    pub total_read: u64,
    /// Units the destination accepted, overwrites included.
    pub total_written: u64,
    /// Source records removed after transfer.
    pub total_deleted: u64,
}

/// Result of one session.
///
/// Counters are reported even when the session failed part-way.
#[derive(Debug)]
pub struct TransferReport {
    /// Container read by the session, when one was named.
    pub container: Option<String>,
    /// Final state: `Completed` or `Failed`.
    pub state: SessionState,
    pub counters: TransferCounters,
    /// Error that stopped the session.
    pub error: Option<Error>,
    /// Units that could not be read, written or deleted.
    pub failures: Vec<RecordFailure>,
    pub warnings: Vec<String>,
}

impl TransferReport {
    /// Creates the report of a session that could not be constructed.
    pub fn rejected(container: Option<String>, error: Error) -> Self {
        Self {
            container,
            state: SessionState::Failed,
            counters: TransferCounters::default(),
            error: Some(error),
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Returns whether the session completed without error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the caller-facing completion signal: the error, if any, and
    /// the number of units written.
    pub fn completion(&self) -> (Option<&Error>, u64) {
        (self.error.as_ref(), self.counters.total_written)
    }
}

/// Wires one input (through a [`CursorManager`]) and the transform to one
/// output.
///
/// Consumed by [`DumpSession::run`]. The output is not finished by the
/// session.
pub struct DumpSession {
    input: Arc<dyn Transport>,
    output: Arc<dyn Transport>,
    options: TransferOptions,
    container: Option<ContainerRef>,
    cursor: CursorManager,

    state: SessionState,
    counters: TransferCounters,
    consumed: Vec<RecordRef>,
    failures: Vec<RecordFailure>,
    warnings: Vec<String>,
}

/// Rejects an output whose encoding disagrees with `line_format`.
pub(crate) fn check_output_format(output: &dyn Transport, options: &TransferOptions) -> Result<()> {
    let expected = Format::from_line_format(options.line_format);
    match output.output_format() {
        Some(format) if format != expected => Err(Error::configuration_invalid().with_message(
            format!("{} writes {format} output, expected {expected}", output.describe()),
        )),
        _ => Ok(()),
    }
}

impl DumpSession {
    /// Creates a session, checking options and transport capabilities.
    pub fn new(
        input: Arc<dyn Transport>,
        output: Arc<dyn Transport>,
        options: TransferOptions,
    ) -> Result<Self> {
        options.validate()?;

        let source = input.capabilities();
        let destination = output.capabilities();
        let missing = if !source.fetch {
            Some(format!("{} cannot be read", input.describe()))
        } else if !destination.write {
            Some(format!("{} cannot be written", output.describe()))
        } else if options.delete_after_transfer && !source.delete {
            Some(format!("{} does not support delete", input.describe()))
        } else if options.filter.is_some() && !source.filter {
            Some(format!("{} does not support filter queries", input.describe()))
        } else {
            None
        };
        if let Some(message) = missing {
            return Err(Error::configuration_invalid().with_message(message));
        }
        check_output_format(output.as_ref(), &options)?;

        let cursor = CursorManager::new(Arc::clone(&input), None, &options);
        Ok(Self {
            input,
            output,
            options,
            container: None,
            cursor,
            state: SessionState::Idle,
            counters: TransferCounters::default(),
            consumed: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
        })
    }

    /// Reads `container` instead of the input transport's own.
    #[must_use]
    pub fn with_container(mut self, container: Option<ContainerRef>) -> Self {
        self.cursor = CursorManager::new(Arc::clone(&self.input), container.clone(), &self.options);
        self.container = container;
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the counters accumulated so far.
    pub fn counters(&self) -> TransferCounters {
        self.counters
    }

    /// Runs the session to completion.
    pub async fn run(mut self) -> TransferReport {
        tracing::info!(
            target: TRACING_TARGET,
            input = %self.input.describe(),
            output = %self.output.describe(),
            container = self.container.as_ref().map(ContainerRef::path),
            kind = %self.options.kind,
            limit = self.options.limit,
            offset = self.options.offset,
            strategy = %self.cursor.strategy(),
            "Starting dump session"
        );

        self.state = SessionState::FetchingFirstBatch;
        let result = self.drive().await;
        self.cursor.close().await;
        self.warnings.extend(self.cursor.take_warnings());

        let error = match result {
            Ok(()) => {
                self.state = SessionState::Completed;
                tracing::info!(
                    target: TRACING_TARGET,
                    total_read = self.counters.total_read,
                    total_written = self.counters.total_written,
                    total_deleted = self.counters.total_deleted,
                    failures = self.failures.len(),
                    "Dump session completed"
                );
                None
            }
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    state = %self.state,
                    total_written = self.counters.total_written,
                    error = %err,
                    "Dump session failed"
                );
                self.state = SessionState::Failed;
                Some(err)
            }
        };

        TransferReport {
            container: self.container.as_ref().map(ContainerRef::path),
            state: self.state,
            counters: self.counters,
            error,
            failures: self.failures,
            warnings: self.warnings,
        }
    }

    async fn drive(&mut self) -> Result<()> {
        loop {
            let page = self.cursor.next_batch().await?;
            self.failures.extend(page.failures);

            if !page.units.is_empty() {
                self.state = SessionState::WritingBatch;
                self.write_batch(page.units).await?;
            }
            if page.exhausted {
                break;
            }
            self.state = SessionState::FetchingNextBatch;
        }

        if self.options.delete_after_transfer {
            self.state = SessionState::DeletingSource;
            self.delete_consumed().await?;
        }
        Ok(())
    }

    async fn write_batch(&mut self, units: Vec<Unit>) -> Result<()> {
        let fetched = units.len();
        self.counters.total_read += fetched as u64;

        let mut batch = Vec::with_capacity(fetched);
        for unit in units {
            let label = unit.label();
            match transform(unit, self.options.kind, self.options.source_only) {
                Ok(unit) => batch.push(unit),
                Err(err) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        unit = %label,
                        error = %err,
                        "Skipping unit"
                    );
                    self.failures.push(RecordFailure::new(label, &err));
                }
            }
        }
        if batch.is_empty() {
            return Ok(());
        }

        let output = Arc::clone(&self.output);
        let outcome = self
            .options
            .retry
            .retry(|| output.write(batch.clone()))
            .await?;

        self.counters.total_written += outcome.written;
        self.failures.extend(outcome.failures);
        if self.options.delete_after_transfer {
            self.consumed.extend(outcome.accepted);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            batch_size = fetched,
            written = outcome.written,
            total_read = self.counters.total_read,
            total_written = self.counters.total_written,
            "Wrote batch"
        );
        Ok(())
    }

    /// Deletes every accepted source record in chunks of `limit`, then
    /// refreshes the source.
    async fn delete_consumed(&mut self) -> Result<()> {
        let consumed = std::mem::take(&mut self.consumed);
        if consumed.is_empty() {
            return Ok(());
        }

        let input = Arc::clone(&self.input);
        for chunk in consumed.chunks(self.options.limit) {
            let outcome = self
                .options
                .retry
                .retry(|| input.delete(chunk.to_vec()))
                .await?;
            self.counters.total_deleted += outcome.deleted;
            self.failures.extend(outcome.failures);
        }

        let container = self.container.as_ref();
        self.options
            .retry
            .retry(|| input.refresh(container))
            .await?;

        tracing::debug!(
            target: TRACING_TARGET,
            requested = consumed.len(),
            total_deleted = self.counters.total_deleted,
            "Deleted transferred source records"
        );
        Ok(())
    }
}

impl std::fmt::Debug for DumpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpSession")
            .field("input", &self.input.describe())
            .field("output", &self.output.describe())
            .field("state", &self.state)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use esdump_core::{ErrorKind, TransferType};
    use esdump_dal::{Capabilities, FileTransport, Format, MemoryTransport};
    use serde_json::json;

    use super::*;
    use crate::RetryConfig;

    fn options() -> TransferOptions {
        TransferOptions {
            limit: 100,
            retry: RetryConfig::new(2, Duration::from_millis(1)),
            ..TransferOptions::default()
        }
    }

    fn pair(count: u64) -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
        let source = MemoryTransport::new("source").with_container(ContainerRef::new("source_index"));
        source.seed("source_index", count);
        let destination =
            MemoryTransport::new("destination").with_container(ContainerRef::new("destination_index"));
        (Arc::new(source), Arc::new(destination))
    }

    async fn run(
        source: &Arc<MemoryTransport>,
        destination: &Arc<MemoryTransport>,
        options: TransferOptions,
    ) -> TransferReport {
        DumpSession::new(source.clone(), destination.clone(), options)
            .unwrap()
            .run()
            .await
    }

    #[tokio::test]
    async fn test_full_transfer() {
        let (source, destination) = pair(500);
        let report = run(&source, &destination, options()).await;

        assert!(report.is_success());
        assert_eq!(report.state, SessionState::Completed);
        assert!(report.completion().0.is_none());
        assert_eq!(report.completion().1, 500);
        assert_eq!(report.counters.total_read, 500);
        assert_eq!(destination.count("destination_index"), 500);
        // The output is left for the caller to finish.
        assert_eq!(destination.finish_count(), 0);
    }

    #[tokio::test]
    async fn test_round_trip_through_file() {
        let (source, destination) = pair(250);
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(FileTransport::new(dir.path().join("dump.json"), Format::Lines));

        let exported = DumpSession::new(source.clone(), file.clone(), options())
            .unwrap()
            .run()
            .await;
        file.finish().await.unwrap();
        assert_eq!(exported.counters.total_written, 250);

        let reader = Arc::new(FileTransport::new(dir.path().join("dump.json"), Format::Lines));
        let imported = DumpSession::new(reader, destination.clone(), options())
            .unwrap()
            .run()
            .await;

        assert!(imported.is_success());
        assert_eq!(imported.counters.total_written, 250);
        assert_eq!(destination.count("destination_index"), 250);
    }

    #[tokio::test]
    async fn test_rerun_overwrites() {
        let (source, destination) = pair(120);
        let first = run(&source, &destination, options()).await;
        let second = run(&source, &destination, options()).await;

        assert_eq!(first.counters.total_written, second.counters.total_written);
        assert_eq!(destination.count("destination_index"), 120);
    }

    #[tokio::test]
    async fn test_offset_window() {
        for offset in [0u64, 1, 250, 499, 500, 750] {
            let (source, destination) = pair(500);
            let report = run(&source, &destination, TransferOptions { offset, ..options() }).await;

            let expected = 500u64.saturating_sub(offset);
            assert_eq!(report.counters.total_written, expected, "offset {offset}");
            assert_eq!(destination.count("destination_index") as u64, expected);
        }
    }

    #[tokio::test]
    async fn test_equality_filter() {
        let (source, destination) = pair(500);
        let options = TransferOptions {
            filter: Some(json!({"query": {"term": {"key": "key1"}}})),
            ..options()
        };
        let report = run(&source, &destination, options).await;

        assert_eq!(report.counters.total_written, 1);
        assert_eq!(destination.records("destination_index")[0].identity, "1");
    }

    #[tokio::test]
    async fn test_delete_after_transfer_empties_source() {
        let (source, destination) = pair(250);
        let options = TransferOptions {
            delete_after_transfer: true,
            ..options()
        };
        let report = run(&source, &destination, options).await;

        assert_eq!(report.counters.total_written, 250);
        assert_eq!(report.counters.total_deleted, 250);
        assert_eq!(source.count("source_index"), 0);
        assert_eq!(source.refresh_count(), 1);
        assert_eq!(destination.count("destination_index"), 250);
    }

    #[tokio::test]
    async fn test_rejected_records_are_not_deleted() {
        let (source, destination) = pair(10);
        destination.reject_identity("3");
        let options = TransferOptions {
            delete_after_transfer: true,
            ..options()
        };
        let report = run(&source, &destination, options).await;

        assert!(report.is_success());
        assert_eq!(report.counters.total_written, 9);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::DestinationRejected);
        assert_eq!(source.records("source_index")[0].identity, "3");
    }

    #[tokio::test]
    async fn test_source_only_writes_payloads() {
        let (source, _) = pair(3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        let file = Arc::new(FileTransport::new(&path, Format::Lines));
        let options = TransferOptions {
            source_only: true,
            ..options()
        };

        let report = DumpSession::new(source, file.clone(), options)
            .unwrap()
            .run()
            .await;
        file.finish().await.unwrap();
        assert_eq!(report.counters.total_written, 3);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            assert!(line.get("_index").is_none());
            assert!(line.get("_id").is_none());
            assert!(line.get("_source").is_none());
        }
        assert!(lines.contains(&json!({"key": "key1", "_uuid": 1})));
    }

    #[tokio::test]
    async fn test_structural_transfer() {
        let (source, destination) = pair(5);
        source.insert_structure(
            TransferType::Analyzer,
            "source_index",
            json!({"settings": {"index": {
                "uuid": "3x0yZ",
                "analysis": {"analyzer": {"content": {"type": "custom", "tokenizer": "whitespace"}}}
            }}}),
        );
        let options = TransferOptions {
            kind: TransferType::Analyzer,
            ..options()
        };
        let report = run(&source, &destination, options).await;

        assert_eq!(report.counters.total_written, 1);
        assert_eq!(destination.count("destination_index"), 0);
        let written = destination
            .structure(TransferType::Analyzer, "destination_index")
            .unwrap();
        let analyzer = &written["settings"]["index"]["analysis"]["analyzer"]["content"];
        assert_eq!(analyzer["tokenizer"], "whitespace");
        assert!(written["settings"]["index"].get("uuid").is_none());
    }

    #[tokio::test]
    async fn test_capabilities_checked_up_front() {
        let (_, destination) = pair(0);
        let source: Arc<MemoryTransport> =
            Arc::new(MemoryTransport::new("file").with_capabilities(Capabilities::sequential()));

        let delete = TransferOptions {
            delete_after_transfer: true,
            ..options()
        };
        let err = DumpSession::new(source.clone(), destination.clone(), delete).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);

        let filter = TransferOptions {
            filter: Some(json!({"match_all": {}})),
            ..options()
        };
        let err = DumpSession::new(source.clone(), destination.clone(), filter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);

        let write_only = Arc::new(MemoryTransport::new("sink").with_capabilities(Capabilities {
            write: true,
            ..Capabilities::default()
        }));
        let err = DumpSession::new(write_only, destination, options()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
    }

    #[tokio::test]
    async fn test_output_format_must_match_line_format() {
        let (source, _) = pair(1);
        let array = Arc::new(FileTransport::new("unused.json", Format::Array));

        let err = DumpSession::new(source.clone(), array.clone(), options()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);

        let options = TransferOptions {
            line_format: false,
            ..options()
        };
        assert!(DumpSession::new(source, array, options).is_ok());
    }

    #[tokio::test]
    async fn test_failure_keeps_counters() {
        let (source, destination) = pair(250);
        // The second fetch fails and retries are disabled.
        source.fail_from_fetch(2);
        let options = TransferOptions {
            retry: RetryConfig::no_retry(),
            ..options()
        };
        let report = run(&source, &destination, options).await;

        assert_eq!(report.state, SessionState::Failed);
        assert_eq!(report.error.as_ref().unwrap().kind(), ErrorKind::SourceUnavailable);
        assert_eq!(report.counters.total_read, 100);
        assert_eq!(report.completion().1, 100);
        assert_eq!(destination.count("destination_index"), 100);
    }
}
