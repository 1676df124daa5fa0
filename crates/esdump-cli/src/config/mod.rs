//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── transfer: TransferArgs            # endpoints, type, window, filter, move semantics
//! ├── retry: RetryConfig                # transient failure retries
//! ├── http: ReqwestConfig               # timeouts, user agent, basic auth
//! ├── elasticsearch: ElasticsearchConfig # socket ceiling, bulk chunk size
//! └── log: LogConfig                    # log layout
//! ```
//!
//! Every option can be given as an argument or an `ESDUMP_*` environment
//! variable. Use `--help` to see all of them.

mod log;
mod transfer;

use std::process;

use anyhow::{Context, bail};
use clap::Parser;
use esdump_dal::{ConnectionLimiter, ElasticsearchConfig, Endpoint, EndpointOptions, Format};
use esdump_engine::{RetryConfig, TransferOptions};
use esdump_reqwest::{ReqwestClient, ReqwestConfig};
pub use log::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
pub use transfer::TransferArgs;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "esdump")]
#[command(about = "Move records between Elasticsearch, files and streams")]
#[command(version)]
pub struct Cli {
    /// Endpoints and transfer options.
    #[clap(flatten)]
    pub transfer: TransferArgs,

    /// Retries of transient failures.
    #[clap(flatten)]
    pub retry: RetryConfig,

    /// HTTP client configuration.
    #[clap(flatten)]
    pub http: ReqwestConfig,

    /// Indexed store configuration.
    #[clap(flatten)]
    pub elasticsearch: ElasticsearchConfig,

    /// Log output configuration.
    #[clap(flatten)]
    pub log: LogConfig,
}

impl Cli {
    /// Loads the `.env` file (if enabled) and parses arguments.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from a `.env` file.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when the dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Parses the input endpoint, applying `--input-index`.
    pub fn input(&self) -> anyhow::Result<Endpoint> {
        Endpoint::parse(&self.transfer.input)
            .and_then(|endpoint| endpoint.with_container(self.transfer.input_index.clone()))
            .context("invalid input")
    }

    /// Parses the output endpoint, applying `--output-index`.
    pub fn output(&self) -> anyhow::Result<Endpoint> {
        Endpoint::parse(&self.transfer.output)
            .and_then(|endpoint| endpoint.with_container(self.transfer.output_index.clone()))
            .context("invalid output")
    }

    /// Builds the engine options.
    ///
    /// With `--all`, an index named by the output is excluded from discovery
    /// so it is never read back into itself.
    pub fn transfer_options(&self) -> anyhow::Result<TransferOptions> {
        let mut options = self.transfer.options(self.retry.clone())?;
        if options.fan_out_all
            && let Some(target) = self.output()?.container()
            && !options.exclude.contains(&target.index)
        {
            options.exclude.push(target.index.clone());
        }
        Ok(options)
    }

    /// Builds the resources shared by both transports.
    pub fn endpoint_options(&self) -> anyhow::Result<EndpointOptions> {
        let client =
            ReqwestClient::new(self.http.clone()).context("failed to create HTTP client")?;
        Ok(EndpointOptions {
            format: Format::from_line_format(self.transfer.line_format),
            client,
            limiter: ConnectionLimiter::new(self.elasticsearch.max_sockets),
            elasticsearch: self.elasticsearch.clone(),
        })
    }

    /// Rejects incoherent combinations before any transport is built.
    pub fn validate(&self) -> anyhow::Result<()> {
        let input = self.input()?;
        let output = self.output()?;

        if self.transfer.all {
            if !input.is_elasticsearch() {
                bail!("--all requires an Elasticsearch input");
            }
            if input.container().is_some() {
                bail!("--all cannot be combined with an input index");
            }
        }
        if self.transfer.delete && !input.is_elasticsearch() {
            bail!("--delete requires an Elasticsearch input");
        }
        if let (Endpoint::File(input), Endpoint::File(output)) = (&input, &output)
            && input == output
        {
            bail!("input and output are the same file: {}", input.display());
        }
        if self.elasticsearch.max_sockets == 0 {
            bail!("--max-sockets must be at least 1");
        }

        self.transfer_options()?;
        Ok(())
    }

    /// Logs the configuration (no credentials).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        let describe = |endpoint: anyhow::Result<Endpoint>| {
            endpoint.map_or_else(|_| "<invalid>".to_owned(), |endpoint| endpoint.to_string())
        };
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            input = %describe(self.input()),
            output = %describe(self.output()),
            "Endpoints"
        );
        self.transfer.log();

        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            max_sockets = self.elasticsearch.max_sockets,
            bulk_chunk_size = self.elasticsearch.bulk_chunk_size,
            retries = self.retry.max_attempts,
            basic_auth = self.http.username.is_some(),
            "Connection configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
