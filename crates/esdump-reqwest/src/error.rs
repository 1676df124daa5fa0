//! Error types for esdump-reqwest.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for esdump-reqwest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for esdump-reqwest operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: StatusCode,
        /// Response body, truncated for display.
        body: String,
    },
}

impl Error {
    /// Returns whether a 404 refers to an expired or unknown scroll context.
    fn is_missing_search_context(status: StatusCode, body: &str) -> bool {
        status == StatusCode::NOT_FOUND
            && (body.contains("search_context_missing_exception")
                || body.contains("No search context found"))
    }
}

impl From<Error> for esdump_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    esdump_core::Error::source_unavailable()
                        .with_message("Request timed out")
                        .with_source(e)
                } else if e.is_connect() {
                    esdump_core::Error::source_unavailable()
                        .with_message("Connection failed")
                        .with_source(e)
                } else if e.is_builder() {
                    esdump_core::Error::configuration_invalid()
                        .with_message(e.to_string())
                        .with_source(e)
                } else {
                    esdump_core::Error::source_unavailable()
                        .with_message(e.to_string())
                        .with_source(e)
                }
            }
            Error::Serde(e) => esdump_core::Error::serialization()
                .with_message(e.to_string())
                .with_source(e),
            Error::Status { status, body } => {
                let message = format!("HTTP {status}: {body}");
                if Error::is_missing_search_context(status, &body) {
                    esdump_core::Error::cursor_expired().with_message(message)
                } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    esdump_core::Error::source_unavailable().with_message(message)
                } else {
                    esdump_core::Error::destination_rejected().with_message(message)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use esdump_core::ErrorKind;

    use super::*;

    fn status(status: StatusCode, body: &str) -> esdump_core::Error {
        Error::Status {
            status,
            body: body.to_owned(),
        }
        .into()
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            status(StatusCode::SERVICE_UNAVAILABLE, "").kind(),
            ErrorKind::SourceUnavailable
        );
        assert_eq!(
            status(StatusCode::TOO_MANY_REQUESTS, "").kind(),
            ErrorKind::SourceUnavailable
        );
        assert_eq!(
            status(StatusCode::BAD_REQUEST, "mapper_parsing_exception").kind(),
            ErrorKind::DestinationRejected
        );
    }

    #[test]
    fn test_missing_scroll_context_is_cursor_expired() {
        let body = r#"{"error":{"root_cause":[{"type":"search_context_missing_exception"}]},"status":404}"#;
        let err = status(StatusCode::NOT_FOUND, body);
        assert_eq!(err.kind(), ErrorKind::CursorExpired);
        assert!(err.is_retryable());

        let err = status(StatusCode::NOT_FOUND, "index_not_found_exception");
        assert_eq!(err.kind(), ErrorKind::DestinationRejected);
    }
}
