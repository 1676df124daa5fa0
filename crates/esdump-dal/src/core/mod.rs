//! Core types and traits for transports.

mod context;
mod limiter;
mod outcome;

pub use context::{DEFAULT_LEASE, ReadContext};
use esdump_core::{ContainerRef, Error, RecordRef, Result, Unit};
pub use limiter::{ConnectionLimiter, DEFAULT_MAX_SOCKETS};
pub use outcome::{DeleteOutcome, Page, RecordFailure, WriteOutcome};
use serde::{Deserialize, Serialize};

use crate::codec::Format;

/// Operations a transport supports.
///
/// Checked once when a dump session is constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Can fetch batches.
    pub fetch: bool,
    /// Can write batches.
    pub write: bool,
    /// Can delete records by identity.
    pub delete: bool,
    /// Can start a read at an arbitrary record offset.
    pub skip: bool,
    /// Can apply a filter query while reading.
    pub filter: bool,
    /// Can enumerate its containers.
    pub discover: bool,
}

impl Capabilities {
    /// Capabilities of a transport that only reads and writes sequentially.
    pub const fn sequential() -> Self {
        Self {
            fetch: true,
            write: true,
            delete: false,
            skip: false,
            filter: false,
            discover: false,
        }
    }

    /// Every capability.
    pub const fn all() -> Self {
        Self {
            fetch: true,
            write: true,
            delete: true,
            skip: true,
            filter: true,
            discover: true,
        }
    }
}

/// A source and/or destination of units.
///
/// Transports are shared behind `Arc` between the cursor manager, the dump
/// session and the fan-out controller, so every method takes `&self`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Returns the operations this transport supports.
    fn capabilities(&self) -> Capabilities;

    /// Returns a human-readable description used in logs.
    fn describe(&self) -> String;

    /// Returns the encoding of written units. `None` for stores that do not
    /// serialize to a byte stream.
    fn output_format(&self) -> Option<Format> {
        None
    }

    /// Fetches one batch.
    ///
    /// Undecodable units are reported in [`Page::failures`] instead of
    /// failing the whole batch.
    async fn fetch(&self, ctx: &ReadContext) -> Result<Page>;

    /// Writes one batch.
    ///
    /// Per-record rejections are reported in the outcome; only failures
    /// affecting the whole request are returned as errors.
    async fn write(&self, units: Vec<Unit>) -> Result<WriteOutcome>;

    /// Deletes records by identity, best-effort.
    async fn delete(&self, refs: Vec<RecordRef>) -> Result<DeleteOutcome> {
        let _ = refs;
        Err(Error::configuration_invalid()
            .with_message(format!("{} does not support delete", self.describe())))
    }

    /// Makes prior writes and deletes visible to readers.
    async fn refresh(&self, container: Option<&ContainerRef>) -> Result<()> {
        let _ = container;
        Ok(())
    }

    /// Releases a server-side cursor.
    async fn clear_cursor(&self, cursor: &str) -> Result<()> {
        let _ = cursor;
        Ok(())
    }

    /// Lists the containers visible at this transport.
    async fn discover(&self) -> Result<Vec<String>> {
        Err(Error::configuration_invalid()
            .with_message(format!("{} does not support discovery", self.describe())))
    }

    /// Completes the output, e.g. closes an array delimiter.
    ///
    /// Called exactly once after the last write.
    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_capabilities() {
        let caps = Capabilities::sequential();
        assert!(caps.fetch && caps.write);
        assert!(!caps.delete && !caps.skip && !caps.filter && !caps.discover);
        assert_eq!(Capabilities::default(), Capabilities {
            fetch: false,
            write: false,
            delete: false,
            skip: false,
            filter: false,
            discover: false,
        });
    }
}
