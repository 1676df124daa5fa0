//! Context for fetch operations.

use std::time::Duration;

use esdump_core::{ContainerRef, TransferType};
use serde_json::Value;

/// Default cursor lease: 10 minutes.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(600);

/// Context for one fetch call.
///
/// Carries the declared transfer type, the pagination cursor and the
/// window to read.
#[derive(Debug, Clone)]
pub struct ReadContext {
    /// Declared transfer type.
    pub kind: TransferType,
    /// Container to read, overriding the transport's own when set.
    pub container: Option<ContainerRef>,
    /// Cursor returned by the previous fetch, if any.
    pub cursor: Option<String>,
    /// Records to skip before the first returned record. Only honored by
    /// transports with the `skip` capability on the first fetch.
    pub skip: u64,
    /// Maximum number of records to return.
    pub limit: usize,
    /// Filter query (or full search body) for document reads.
    pub filter: Option<Value>,
    /// How long the server should keep the cursor alive between fetches.
    pub lease: Duration,
}

impl ReadContext {
    /// Creates a context for the first fetch.
    pub fn new(kind: TransferType, limit: usize) -> Self {
        Self {
            kind,
            container: None,
            cursor: None,
            skip: 0,
            limit,
            filter: None,
            lease: DEFAULT_LEASE,
        }
    }

    /// Sets the container.
    pub fn with_container(mut self, container: Option<ContainerRef>) -> Self {
        self.container = container;
        self
    }

    /// Sets the cursor for pagination.
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Sets the number of records to skip.
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the filter query.
    pub fn with_filter(mut self, filter: Option<Value>) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the cursor lease.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Returns the cursor, if set.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Returns whether this is the first fetch of a pagination run.
    pub fn is_first(&self) -> bool {
        self.cursor.is_none()
    }
}
