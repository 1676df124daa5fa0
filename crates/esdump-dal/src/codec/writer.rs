//! Writer for line- or array-encoded JSON.

use esdump_core::{Error, Result};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::Format;

/// Writes JSON values in the configured format.
///
/// In array format the opening bracket is written with the first value and
/// the closing bracket only by [`finish`](Self::finish).
#[derive(Debug)]
pub struct UnitWriter<W> {
    inner: W,
    format: Format,
    written: u64,
    finished: bool,
}

impl<W> UnitWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a new writer.
    pub fn new(inner: W, format: Format) -> Self {
        Self {
            inner,
            format,
            written: 0,
            finished: false,
        }
    }

    /// Returns how many values have been written.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Writes one value without flushing.
    pub async fn write_value(&mut self, value: &Value) -> Result<()> {
        if self.finished {
            return Err(Error::internal().with_message("write after finish"));
        }

        let mut buf = Vec::with_capacity(256);
        match self.format {
            Format::Lines => {
                serde_json::to_writer(&mut buf, value)?;
                buf.push(b'\n');
            }
            Format::Array => {
                buf.extend_from_slice(if self.written == 0 { b"[\n" } else { b",\n" });
                serde_json::to_writer(&mut buf, value)?;
            }
        }

        self.inner.write_all(&buf).await?;
        self.written += 1;
        Ok(())
    }

    /// Flushes buffered output.
    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Closes the array delimiter (if any) and flushes. Idempotent.
    pub async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if self.format == Format::Array {
            let tail: &[u8] = if self.written == 0 { b"[]\n" } else { b"\n]\n" };
            self.inner.write_all(tail).await?;
        }
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn encode(format: Format, values: &[Value]) -> String {
        let mut writer = UnitWriter::new(Vec::new(), format);
        for value in values {
            writer.write_value(value).await.unwrap();
        }
        writer.finish().await.unwrap();
        assert_eq!(writer.written(), values.len() as u64);
        String::from_utf8(writer.inner).unwrap()
    }

    #[tokio::test]
    async fn test_line_format() {
        let out = encode(Format::Lines, &[json!({"a": 1}), json!({"b": 2})]).await;
        assert_eq!(out, "{\"a\":1}\n{\"b\":2}\n");
    }

    #[tokio::test]
    async fn test_array_format_is_valid_json() {
        let out = encode(Format::Array, &[json!({"a": 1}), json!({"b": 2})]).await;
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!([{"a": 1}, {"b": 2}]));

        let empty = encode(Format::Array, &[]).await;
        assert_eq!(empty, "[]\n");
    }

    #[tokio::test]
    async fn test_write_after_finish_fails() {
        let mut writer = UnitWriter::new(Vec::new(), Format::Lines);
        writer.finish().await.unwrap();
        writer.finish().await.unwrap();
        assert!(writer.write_value(&json!({})).await.is_err());
    }
}
