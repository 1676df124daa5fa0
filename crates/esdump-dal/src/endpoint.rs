//! Endpoint addresses and transport construction.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use esdump_core::{ContainerRef, Error, Result};
use esdump_reqwest::{ReqwestClient, Url};

use crate::codec::Format;
use crate::core::{ConnectionLimiter, Transport};
use crate::provider::{ElasticsearchConfig, ElasticsearchTransport, FileTransport, StreamTransport};

/// Which side of a transfer an endpoint is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Input,
    Output,
}

/// Shared resources handed to every transport of a process.
#[derive(Debug, Clone)]
pub struct EndpointOptions {
    /// Layout of written files and streams.
    pub format: Format,
    pub client: ReqwestClient,
    pub limiter: ConnectionLimiter,
    pub elasticsearch: ElasticsearchConfig,
}

/// Parsed input or output address.
///
/// - `http(s)://host[:port][/index[/type]]` is an indexed store.
/// - `$` or `-` is standard input (as input) or standard output (as output).
/// - Anything else is a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Elasticsearch {
        base: Url,
        container: Option<ContainerRef>,
    },
    Stdio,
    File(PathBuf),
}

impl Endpoint {
    /// Parses an address.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::configuration_invalid().with_message("endpoint address is empty"));
        }
        if address == "$" || address == "-" {
            return Ok(Self::Stdio);
        }

        let lowercase = address.to_ascii_lowercase();
        if !lowercase.starts_with("http://") && !lowercase.starts_with("https://") {
            return Ok(Self::File(PathBuf::from(address)));
        }

        let mut base = Url::parse(address).map_err(|err| {
            Error::configuration_invalid()
                .with_message(format!("'{address}' is not a valid URL: {err}"))
                .with_source(err)
        })?;

        let path = base.path().trim_matches('/').to_owned();
        let container = if path.is_empty() {
            None
        } else {
            Some(ContainerRef::parse(&path)?)
        };

        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self::Elasticsearch { base, container })
    }

    /// Replaces the container of an indexed-store endpoint.
    ///
    /// `None` keeps the endpoint unchanged; an override on a file or stream
    /// endpoint is a configuration error.
    pub fn with_container(self, container: Option<ContainerRef>) -> Result<Self> {
        let Some(container) = container else {
            return Ok(self);
        };
        match self {
            Self::Elasticsearch { base, .. } => Ok(Self::Elasticsearch {
                base,
                container: Some(container),
            }),
            other => Err(Error::configuration_invalid().with_message(format!(
                "index '{container}' given for '{other}', which is not an indexed store"
            ))),
        }
    }

    /// Returns the container of an indexed-store endpoint.
    pub fn container(&self) -> Option<&ContainerRef> {
        match self {
            Self::Elasticsearch { container, .. } => container.as_ref(),
            _ => None,
        }
    }

    /// Returns whether this endpoint is an indexed store.
    pub fn is_elasticsearch(&self) -> bool {
        matches!(self, Self::Elasticsearch { .. })
    }

    /// Builds the transport for this endpoint.
    pub fn open(&self, role: Role, options: &EndpointOptions) -> Arc<dyn Transport> {
        match (self, role) {
            (Self::Elasticsearch { base, container }, _) => Arc::new(ElasticsearchTransport::new(
                base.clone(),
                container.clone(),
                options.client.clone(),
                options.limiter.clone(),
                &options.elasticsearch,
            )),
            (Self::Stdio, Role::Input) => Arc::new(StreamTransport::stdin()),
            (Self::Stdio, Role::Output) => Arc::new(StreamTransport::stdout(options.format)),
            (Self::File(path), _) => Arc::new(FileTransport::new(path.clone(), options.format)),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elasticsearch { base, container } => {
                let mut base = base.clone();
                let _ = base.set_password(None);
                match container {
                    Some(container) => write!(f, "{base}{}", container.path()),
                    None => write!(f, "{base}"),
                }
            }
            Self::Stdio => f.write_str("$"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}
