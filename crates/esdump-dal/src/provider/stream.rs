//! Stream transport over standard input/output or any async reader/writer.

use esdump_core::{Error, Result, Unit};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::Mutex;

use super::read_page;
use crate::codec::{Format, UnitReader, UnitWriter};
use crate::core::{Capabilities, Page, ReadContext, Transport, WriteOutcome};

/// Tracing target for stream transport operations.
pub const TRACING_TARGET: &str = "esdump_dal::stream";

type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Reads from and writes to unbounded byte streams.
///
/// End of input is exhaustion, not an error. Streams cannot be rewound, so
/// the cursor is ignored.
pub struct StreamTransport {
    name: &'static str,
    format: Option<Format>,
    reader: Option<Mutex<UnitReader<BoxedReader>>>,
    writer: Option<Mutex<UnitWriter<BoxedWriter>>>,
}

impl StreamTransport {
    /// Creates a transport reading from standard input.
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin())).named("stdin")
    }

    /// Creates a transport writing to standard output.
    pub fn stdout(format: Format) -> Self {
        Self::from_writer(tokio::io::stdout(), format).named("stdout")
    }

    /// Creates a read-only transport over any buffered reader.
    pub fn from_reader(reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        Self {
            name: "stream",
            format: None,
            reader: Some(Mutex::new(UnitReader::new(Box::new(reader)))),
            writer: None,
        }
    }

    /// Creates a write-only transport over any writer.
    pub fn from_writer(writer: impl AsyncWrite + Unpin + Send + 'static, format: Format) -> Self {
        Self {
            name: "stream",
            format: Some(format),
            reader: None,
            writer: Some(Mutex::new(UnitWriter::new(Box::new(writer), format))),
        }
    }

    fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Transport for StreamTransport {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            fetch: self.reader.is_some(),
            write: self.writer.is_some(),
            ..Capabilities::default()
        }
    }

    fn describe(&self) -> String {
        self.name.to_owned()
    }

    fn output_format(&self) -> Option<Format> {
        self.format
    }

    async fn fetch(&self, ctx: &ReadContext) -> Result<Page> {
        let Some(reader) = &self.reader else {
            return Err(Error::configuration_invalid()
                .with_message(format!("{} is not readable", self.name)));
        };

        let mut reader = reader.lock().await;
        let page = read_page(&mut reader, ctx.kind, ctx.limit).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            stream = self.name,
            batch_size = page.units.len(),
            exhausted = page.exhausted,
            "Read batch"
        );
        Ok(page)
    }

    async fn write(&self, units: Vec<Unit>) -> Result<WriteOutcome> {
        let Some(writer) = &self.writer else {
            return Err(Error::configuration_invalid()
                .with_message(format!("{} is not writable", self.name)));
        };

        let mut writer = writer.lock().await;
        let mut outcome = WriteOutcome::default();
        for unit in &units {
            writer.write_value(&unit.to_value()).await?;
            outcome.written += 1;
            if let Some(record) = unit.record() {
                outcome.accepted.push(record.reference());
            }
        }
        writer.flush().await?;
        Ok(outcome)
    }

    async fn finish(&self) -> Result<()> {
        match &self.writer {
            Some(writer) => writer.lock().await.finish().await,
            None => Ok(()),
        }
    }
}
