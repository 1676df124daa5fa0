//! Incremental reader for line- or array-encoded JSON.

use esdump_core::{Error, Result};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::Format;

/// Reads JSON values one at a time from an async buffered reader.
///
/// Array input is split element by element without buffering the whole
/// document.
#[derive(Debug)]
pub struct UnitReader<R> {
    inner: R,
    format: Option<Format>,
    done: bool,
    position: u64,
}

/// Outcome of scanning one array element.
enum Element {
    Value(Vec<u8>),
    Empty,
    End,
}

impl<R> UnitReader<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Creates a reader; the format is detected on the first read.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            format: None,
            done: false,
            position: 0,
        }
    }

    /// Returns the detected format, once known.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Returns how many values have been read so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns whether the end of input was reached.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Reads the next value.
    ///
    /// Returns `Ok(None)` at end of input. A value that is not valid JSON is
    /// returned as an inner `MalformedRecord` error so the caller can skip it;
    /// the outer error is reserved for I/O failures.
    pub async fn next_value(&mut self) -> Result<Option<Result<Value>>> {
        if self.done {
            return Ok(None);
        }

        let format = match self.format {
            Some(format) => format,
            None => match self.detect().await? {
                Some(format) => format,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            },
        };

        let raw = match format {
            Format::Lines => self.next_line().await?,
            Format::Array => match self.next_element().await? {
                Element::Value(raw) => Some(raw),
                Element::Empty => Some(Vec::new()),
                Element::End => None,
            },
        };

        let Some(raw) = raw else {
            self.done = true;
            return Ok(None);
        };

        self.position += 1;
        let position = self.position;
        Ok(Some(serde_json::from_slice(&raw).map_err(|e| {
            Error::malformed_record()
                .with_message(format!("value {position}: {e}"))
                .with_source(e)
        })))
    }

    /// Skips leading whitespace and inspects the first byte.
    async fn detect(&mut self) -> Result<Option<Format>> {
        loop {
            let buf = self.inner.fill_buf().await?;
            if buf.is_empty() {
                return Ok(None);
            }

            let whitespace = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            if whitespace == buf.len() {
                let len = buf.len();
                self.inner.consume(len);
                continue;
            }

            let format = if buf[whitespace] == b'[' {
                self.inner.consume(whitespace + 1);
                Format::Array
            } else {
                self.inner.consume(whitespace);
                Format::Lines
            };
            self.format = Some(format);
            return Ok(Some(format));
        }
    }

    /// Reads the next non-blank line.
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        loop {
            line.clear();
            if self.inner.read_until(b'\n', &mut line).await? == 0 {
                return Ok(None);
            }
            if line.iter().any(|b| !b.is_ascii_whitespace()) {
                return Ok(Some(line));
            }
        }
    }

    /// Scans up to the next top-level `,` or the closing `]`.
    async fn next_element(&mut self) -> Result<Element> {
        let mut element = Vec::new();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let buf = self.inner.fill_buf().await?;
            if buf.is_empty() {
                // Truncated array: yield what is left, then stop.
                self.done = true;
                return Ok(if is_blank(&element) {
                    Element::End
                } else {
                    Element::Value(element)
                });
            }

            let mut consumed = buf.len();
            let mut delimiter = None;
            for (i, &byte) in buf.iter().enumerate() {
                if in_string {
                    element.push(byte);
                    if escaped {
                        escaped = false;
                    } else if byte == b'\\' {
                        escaped = true;
                    } else if byte == b'"' {
                        in_string = false;
                    }
                    continue;
                }

                match byte {
                    b'"' => {
                        in_string = true;
                        element.push(byte);
                    }
                    b'{' | b'[' => {
                        depth += 1;
                        element.push(byte);
                    }
                    b'}' | b']' if depth > 0 => {
                        depth -= 1;
                        element.push(byte);
                    }
                    b',' | b']' if depth == 0 => {
                        consumed = i + 1;
                        delimiter = Some(byte);
                        break;
                    }
                    _ => element.push(byte),
                }
            }
            self.inner.consume(consumed);

            match delimiter {
                Some(b']') => {
                    self.done = true;
                    return Ok(if is_blank(&element) {
                        Element::End
                    } else {
                        Element::Value(element)
                    });
                }
                Some(_) if is_blank(&element) => return Ok(Element::Empty),
                Some(_) => return Ok(Element::Value(element)),
                None => {}
            }
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::BufReader;

    use super::*;

    async fn read_all(input: &str) -> (Vec<Value>, usize, Option<Format>) {
        let mut reader = UnitReader::new(BufReader::with_capacity(7, input.as_bytes()));
        let mut values = Vec::new();
        let mut malformed = 0;
        while let Some(value) = reader.next_value().await.unwrap() {
            match value {
                Ok(value) => values.push(value),
                Err(_) => malformed += 1,
            }
        }
        (values, malformed, reader.format())
    }

    #[tokio::test]
    async fn test_reads_lines_and_skips_blank_lines() {
        let input = "{\"_id\":\"1\"}\n\n{\"_id\":\"2\"}\r\n{\"_id\":\"3\"}";
        let (values, malformed, format) = read_all(input).await;
        assert_eq!(format, Some(Format::Lines));
        assert_eq!(malformed, 0);
        assert_eq!(values, vec![
            json!({"_id": "1"}),
            json!({"_id": "2"}),
            json!({"_id": "3"})
        ]);
    }

    #[tokio::test]
    async fn test_reads_array_with_nested_delimiters() {
        let input = r#"  [ {"_id":"1","_source":{"tags":["a,b","]"]}},
            {"_id":"2","_source":{"quote":"say \"hi\", [ok]"}} ]"#;
        let (values, malformed, format) = read_all(input).await;
        assert_eq!(format, Some(Format::Array));
        assert_eq!(malformed, 0);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["_source"]["tags"][1], "]");
        assert_eq!(values[1]["_source"]["quote"], "say \"hi\", [ok]");
    }

    #[tokio::test]
    async fn test_malformed_value_does_not_stop_reading() {
        let input = "{\"_id\":\"1\"}\n{not json\n{\"_id\":\"3\"}\n";
        let (values, malformed, _) = read_all(input).await;
        assert_eq!(values.len(), 2);
        assert_eq!(malformed, 1);
    }

    #[tokio::test]
    async fn test_empty_inputs() {
        assert_eq!(read_all("").await.0.len(), 0);
        assert_eq!(read_all("  \n ").await.0.len(), 0);
        let (values, malformed, format) = read_all("[]").await;
        assert!(values.is_empty());
        assert_eq!(malformed, 0);
        assert_eq!(format, Some(Format::Array));
    }
}
