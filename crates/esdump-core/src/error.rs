//! Common error type definitions.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur during a transfer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr, Serialize, Deserialize
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Connection failure or timeout talking to a transport. Retryable.
    SourceUnavailable,
    /// A single unit could not be decoded into a record.
    MalformedRecord,
    /// The destination refused a specific write.
    DestinationRejected,
    /// A server-side cursor lease ran out between fetches.
    CursorExpired,
    /// Incompatible options or an unsupported transport capability.
    ConfigurationInvalid,
    /// Local file or stream I/O failed.
    Io,
    /// Serialization/deserialization error.
    Serialization,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// Returns whether an operation failing with this kind may be retried.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::SourceUnavailable | Self::CursorExpired)
    }
}

/// A structured error type for esdump operations.
#[derive(Debug, Error)]
#[error("{}{}", kind.as_ref(), message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional error message.
    pub message: Option<String>,
    /// Optional source error.
    #[source]
    pub source: Option<BoxedError>,
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Creates a new source unavailable error.
    pub fn source_unavailable() -> Self {
        Self::new(ErrorKind::SourceUnavailable)
    }

    /// Creates a new malformed record error.
    pub fn malformed_record() -> Self {
        Self::new(ErrorKind::MalformedRecord)
    }

    /// Creates a new destination rejected error.
    pub fn destination_rejected() -> Self {
        Self::new(ErrorKind::DestinationRejected)
    }

    /// Creates a new cursor expired error.
    pub fn cursor_expired() -> Self {
        Self::new(ErrorKind::CursorExpired)
    }

    /// Creates a new configuration invalid error.
    pub fn configuration_invalid() -> Self {
        Self::new(ErrorKind::ConfigurationInvalid)
    }

    /// Creates a new I/O error.
    pub fn io() -> Self {
        Self::new(ErrorKind::Io)
    }

    /// Creates a new serialization error.
    pub fn serialization() -> Self {
        Self::new(ErrorKind::Serialization)
    }

    /// Creates a new internal error.
    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error kind as a string.
    pub fn kind_str(&self) -> &'static str {
        self.kind.into()
    }

    /// Returns whether the failed operation may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io().with_message(err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization()
            .with_message(err.to_string())
            .with_source(err)
    }
}
