//! File transport.

use std::path::{Path, PathBuf};

use esdump_core::{Error, Result, Unit};
use tokio::fs::File;
use tokio::io::{BufReader, BufWriter};
use tokio::sync::Mutex;

use super::read_page;
use crate::codec::{Format, UnitReader, UnitWriter};
use crate::core::{Capabilities, Page, ReadContext, Transport, WriteOutcome};

/// Tracing target for file transport operations.
pub const TRACING_TARGET: &str = "esdump_dal::file";

/// Reads and writes line- or array-encoded JSON files.
///
/// The output file is created, truncating any previous content, on the
/// first write and appended to afterwards.
pub struct FileTransport {
    path: PathBuf,
    format: Format,
    reader: Mutex<Option<UnitReader<BufReader<File>>>>,
    writer: Mutex<Option<UnitWriter<BufWriter<File>>>>,
}

impl FileTransport {
    /// Creates a transport for `path`. `format` applies to writes; reads
    /// detect the encoding.
    pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            path: path.into(),
            format,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_reader(&self) -> Result<UnitReader<BufReader<File>>> {
        let file = File::open(&self.path).await.map_err(|e| {
            Error::from(e).with_message(format!("cannot open '{}'", self.path.display()))
        })?;

        tracing::debug!(target: TRACING_TARGET, path = %self.path.display(), "Opened input file");
        Ok(UnitReader::new(BufReader::new(file)))
    }

    async fn open_writer(&self) -> Result<UnitWriter<BufWriter<File>>> {
        let file = File::create(&self.path).await.map_err(|e| {
            Error::from(e).with_message(format!("cannot create '{}'", self.path.display()))
        })?;

        tracing::debug!(
            target: TRACING_TARGET,
            path = %self.path.display(),
            format = %self.format,
            "Created output file"
        );
        Ok(UnitWriter::new(BufWriter::new(file), self.format))
    }
}

impl std::fmt::Debug for FileTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTransport")
            .field("path", &self.path)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Transport for FileTransport {
    fn capabilities(&self) -> Capabilities {
        Capabilities::sequential()
    }

    fn describe(&self) -> String {
        format!("file '{}'", self.path.display())
    }

    fn output_format(&self) -> Option<Format> {
        Some(self.format)
    }

    async fn fetch(&self, ctx: &ReadContext) -> Result<Page> {
        let mut guard = self.reader.lock().await;

        // A fetch without a cursor starts over from the top of the file.
        if ctx.is_first() || guard.is_none() {
            *guard = Some(self.open_reader().await?);
        }

        let Some(reader) = guard.as_mut() else {
            return Err(Error::internal().with_message("file reader not open"));
        };
        read_page(reader, ctx.kind, ctx.limit).await
    }

    async fn write(&self, units: Vec<Unit>) -> Result<WriteOutcome> {
        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            *guard = Some(self.open_writer().await?);
        }
        let Some(writer) = guard.as_mut() else {
            return Err(Error::internal().with_message("file writer not open"));
        };

        let mut outcome = WriteOutcome::default();
        for unit in &units {
            writer.write_value(&unit.to_value()).await?;
            outcome.written += 1;
            if let Some(record) = unit.record() {
                outcome.accepted.push(record.reference());
            }
        }
        writer.flush().await?;

        tracing::debug!(
            target: TRACING_TARGET,
            path = %self.path.display(),
            batch_size = units.len(),
            total = writer.written(),
            "Wrote batch"
        );
        Ok(outcome)
    }

    async fn finish(&self) -> Result<()> {
        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            *guard = Some(self.open_writer().await?);
        }
        match guard.as_mut() {
            Some(writer) => writer.finish().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use esdump_core::{ContainerRef, ErrorKind, Record, TransferType};
    use serde_json::{Value, json};

    use super::*;

    fn document(id: u64) -> Unit {
        Unit::Document(Record::new(
            id.to_string(),
            ContainerRef::new("source_index"),
            json!({"key": format!("key{id}"), "_uuid": id}),
        ))
    }

    async fn read_all(transport: &FileTransport, limit: usize) -> (Vec<Unit>, usize) {
        let mut ctx = ReadContext::new(TransferType::Data, limit);
        let mut units = Vec::new();
        let mut pages = 0;
        loop {
            let page = transport.fetch(&ctx).await.unwrap();
            pages += 1;
            units.extend(page.units);
            match page.cursor {
                Some(cursor) if !page.exhausted => ctx = ctx.with_cursor(cursor),
                _ => break,
            }
        }
        (units, pages)
    }

    #[tokio::test]
    async fn test_round_trip_through_line_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let output = FileTransport::new(&path, Format::Lines);
        output.write((0..3).map(document).collect()).await.unwrap();
        output.write((3..5).map(document).collect()).await.unwrap();
        output.finish().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 5);
        let first: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(first["_index"], "source_index");

        let input = FileTransport::new(&path, Format::Lines);
        let (units, pages) = read_all(&input, 2).await;
        assert_eq!(units.len(), 5);
        assert_eq!(pages, 3);
        assert_eq!(units[4], document(4));
    }

    #[tokio::test]
    async fn test_array_output_closed_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let output = FileTransport::new(&path, Format::Array);
        output.write((0..3).map(document).collect()).await.unwrap();
        output.finish().await.unwrap();

        let parsed: Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);

        let (units, _) = read_all(&FileTransport::new(&path, Format::Lines), 100).await;
        assert_eq!(units.len(), 3);
    }

    #[tokio::test]
    async fn test_first_write_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        tokio::fs::write(&path, "stale\nstale\nstale\n").await.unwrap();

        let output = FileTransport::new(&path, Format::Lines);
        output.write(vec![document(1)]).await.unwrap();
        output.finish().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_source_only_lines_are_malformed_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sourceOnly");

        let output = FileTransport::new(&path, Format::Lines);
        let unit = match document(1) {
            Unit::Document(record) => Unit::Source(record),
            other => other,
        };
        output.write(vec![unit]).await.unwrap();
        output.finish().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let line: Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(line, json!({"key": "key1", "_uuid": 1}));

        let input = FileTransport::new(&path, Format::Lines);
        let page = input
            .fetch(&ReadContext::new(TransferType::Data, 10))
            .await
            .unwrap();
        assert!(page.units.is_empty());
        assert_eq!(page.failures.len(), 1);
        assert_eq!(page.failures[0].kind, ErrorKind::MalformedRecord);
    }

    #[tokio::test]
    async fn test_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = FileTransport::new(dir.path().join("missing.json"), Format::Lines);
        let err = input
            .fetch(&ReadContext::new(TransferType::Data, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
