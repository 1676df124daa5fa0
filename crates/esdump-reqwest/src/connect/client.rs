//! Reqwest-based HTTP client.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder};

use super::ReqwestConfig;
use crate::error::Result;

/// Tracing target for reqwest client operations.
pub const TRACING_TARGET: &str = "esdump_reqwest::client";

/// Inner client that holds the HTTP client and configuration.
struct ReqwestClientInner {
    http: Client,
    config: ReqwestConfig,
}

/// Reqwest-based HTTP client shared by every request of a transport.
///
/// Cloning is cheap: clones share the same connection pool.
///
/// # Examples
///
/// ```rust,ignore
/// use esdump_reqwest::{ReqwestClient, ReqwestConfig};
///
/// let config = ReqwestConfig::default().with_basic_auth("elastic", Some("changeme"));
/// let client = ReqwestClient::new(config)?;
/// ```
#[derive(Clone)]
pub struct ReqwestClient {
    inner: Arc<ReqwestClientInner>,
}

impl std::fmt::Debug for ReqwestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestClient")
            .field("timeout", &self.inner.config.effective_timeout())
            .field("basic_auth", &self.inner.config.username.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestClient {
    /// Creates a new reqwest client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: ReqwestConfig) -> Result<Self> {
        let timeout = config.effective_timeout();
        let user_agent = config.effective_user_agent();

        tracing::debug!(
            target: TRACING_TARGET,
            timeout_ms = timeout.as_millis(),
            user_agent = %user_agent,
            "Creating reqwest client"
        );

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(&user_agent)
            .build()?;

        let inner = ReqwestClientInner { http, config };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &ReqwestConfig {
        &self.inner.config
    }

    /// Starts a request with the configured credentials applied.
    pub(crate) fn request(&self, method: reqwest::Method, url: reqwest::Url) -> RequestBuilder {
        let builder = self.inner.http.request(method, url);
        match &self.inner.config.username {
            Some(username) => builder.basic_auth(username, self.inner.config.password.as_ref()),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ReqwestClient::new(ReqwestConfig::default()).unwrap();
        assert!(client.config().user_agent.is_none());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ReqwestConfig::default().with_basic_auth("elastic", Some("changeme"));
        let client = ReqwestClient::new(config).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("changeme"));
        assert!(debug.contains("basic_auth: true"));
    }
}
