//! Configuration for the reqwest client.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

/// Default timeout for HTTP requests: 30 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the reqwest HTTP client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ReqwestConfig {
    /// Timeout applied to every request (e.g. `30s`, `2m`).
    #[cfg_attr(
        feature = "config",
        arg(
            long = "request-timeout",
            env = "ESDUMP_REQUEST_TIMEOUT",
            value_parser = esdump_core::parse_duration
        )
    )]
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// User-Agent header sent with every request.
    #[cfg_attr(
        feature = "config",
        arg(long = "user-agent", env = "ESDUMP_USER_AGENT")
    )]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Username for HTTP basic authentication.
    #[cfg_attr(
        feature = "config",
        arg(long = "http-username", env = "ESDUMP_HTTP_USERNAME")
    )]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for HTTP basic authentication.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "http-password",
            env = "ESDUMP_HTTP_PASSWORD",
            hide_env_values = true,
            requires = "username"
        )
    )]
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl ReqwestConfig {
    /// Returns the default user agent string.
    fn default_user_agent() -> String {
        format!("esdump/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets basic authentication credentials.
    #[must_use]
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = password.map(Into::into);
        self
    }

    /// Returns the effective timeout, using default if unset or zero.
    pub fn effective_timeout(&self) -> Duration {
        match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Returns the effective user agent, using default if unset or empty.
    pub fn effective_user_agent(&self) -> String {
        match &self.user_agent {
            Some(user_agent) if !user_agent.is_empty() => user_agent.clone(),
            _ => Self::default_user_agent(),
        }
    }
}
