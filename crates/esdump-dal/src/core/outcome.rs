//! Results of transport operations.

use esdump_core::{Error, ErrorKind, RecordRef, Unit};
use serde::Serialize;

/// A unit that could not be read, written or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Identity or label of the affected unit.
    pub label: String,
    /// Error category.
    pub kind: ErrorKind,
    /// Reason reported by the transport.
    pub message: String,
}

impl RecordFailure {
    /// Creates a failure from a label and an error.
    pub fn new(label: impl Into<String>, error: &Error) -> Self {
        Self {
            label: label.into(),
            kind: error.kind(),
            message: error
                .message
                .clone()
                .unwrap_or_else(|| error.kind_str().to_owned()),
        }
    }

    /// Creates a rejected-write failure.
    pub fn rejected(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ErrorKind::DestinationRejected,
            message: message.into(),
        }
    }
}

/// One batch returned by a fetch.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Decoded units, in source order.
    pub units: Vec<Unit>,
    /// Units that could not be decoded.
    pub failures: Vec<RecordFailure>,
    /// Cursor to resubmit for the next batch.
    pub cursor: Option<String>,
    /// Whether the transport knows no further batch exists.
    pub exhausted: bool,
}

impl Page {
    /// Creates a final page.
    pub fn last(units: Vec<Unit>) -> Self {
        Self {
            units,
            exhausted: true,
            ..Self::default()
        }
    }

    /// Returns how many raw units the source delivered, decodable or not.
    pub fn fetched(&self) -> usize {
        self.units.len() + self.failures.len()
    }
}

/// Result of a write call.
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    /// Units accepted by the destination, overwrites included.
    pub written: u64,
    /// Source references of accepted document units.
    pub accepted: Vec<RecordRef>,
    /// Units the destination refused.
    pub failures: Vec<RecordFailure>,
}

impl WriteOutcome {
    /// Merges another outcome into this one.
    pub fn merge(&mut self, other: WriteOutcome) {
        self.written += other.written;
        self.accepted.extend(other.accepted);
        self.failures.extend(other.failures);
    }
}

/// Result of a delete call.
#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    /// Records removed.
    pub deleted: u64,
    /// Records that could not be removed.
    pub failures: Vec<RecordFailure>,
}

impl DeleteOutcome {
    /// Merges another outcome into this one.
    pub fn merge(&mut self, other: DeleteOutcome) {
        self.deleted += other.deleted;
        self.failures.extend(other.failures);
    }
}

#[cfg(test)]
mod tests {
    use esdump_core::{ContainerRef, Record};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_page_counts_undecodable_units() {
        let record = Record::new("1", ContainerRef::new("source_index"), json!({"key": 1}));
        let mut page = Page::last(vec![Unit::Document(record)]);
        page.failures
            .push(RecordFailure::new("value 2", &Error::malformed_record()));

        assert!(page.exhausted);
        assert!(page.cursor.is_none());
        assert_eq!(page.fetched(), 2);
    }

    #[test]
    fn test_write_outcome_merge() {
        let mut total = WriteOutcome::default();
        total.merge(WriteOutcome {
            written: 3,
            ..WriteOutcome::default()
        });
        total.merge(WriteOutcome {
            written: 2,
            failures: vec![RecordFailure::rejected("2", "mapper_parsing_exception")],
            ..WriteOutcome::default()
        });

        assert_eq!(total.written, 5);
        assert_eq!(total.failures.len(), 1);
        assert_eq!(total.failures[0].kind, ErrorKind::DestinationRejected);
    }
}
