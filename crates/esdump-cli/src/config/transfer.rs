//! Transfer options given on the command line.

use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args};
use esdump_core::{ContainerRef, TransferType};
use esdump_engine::{DEFAULT_LIMIT, RetryConfig, TransferOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TRACING_TARGET_CONFIG;

/// What to move and how.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct TransferArgs {
    /// Input endpoint: `http(s)://host:port[/index[/type]]`, `$` for
    /// standard input, or a file path.
    #[arg(short = 'i', long, env = "ESDUMP_INPUT")]
    pub input: String,

    /// Output endpoint: `http(s)://host:port[/index[/type]]`, `$` for
    /// standard output, or a file path.
    #[arg(short = 'o', long, env = "ESDUMP_OUTPUT")]
    pub output: String,

    /// Input container as `index[/type]`, overriding the input URL path.
    #[arg(long, env = "ESDUMP_INPUT_INDEX", value_parser = ContainerRef::parse)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_index: Option<ContainerRef>,

    /// Output container as `index[/type]`, overriding the output URL path.
    #[arg(long, env = "ESDUMP_OUTPUT_INDEX", value_parser = ContainerRef::parse)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_index: Option<ContainerRef>,

    /// What to transfer.
    #[arg(short = 't', long = "type", env = "ESDUMP_TYPE", value_enum, default_value_t)]
    #[serde(default)]
    pub kind: TransferType,

    /// Records per batch.
    #[arg(short = 'l', long, env = "ESDUMP_LIMIT", default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,

    /// Records to skip before the first transferred one.
    #[arg(long, env = "ESDUMP_OFFSET", default_value_t = 0)]
    #[serde(default)]
    pub offset: u64,

    /// Search body (`{"query": ...}`) or bare query restricting the
    /// documents read.
    #[arg(long, env = "ESDUMP_SEARCH_BODY")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_body: Option<String>,

    /// Write document payloads without `_index`/`_type`/`_id`.
    #[arg(long, env = "ESDUMP_SOURCE_ONLY")]
    #[serde(default)]
    pub source_only: bool,

    /// One JSON value per line (`true`) or a single JSON array (`false`).
    #[arg(
        long,
        env = "ESDUMP_LINE_FORMAT",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub line_format: bool,

    /// Delete transferred records from the input after the last write.
    #[arg(long, env = "ESDUMP_DELETE")]
    #[serde(default)]
    pub delete: bool,

    /// How long the input keeps a scroll alive between batches.
    #[arg(
        long = "scroll-time",
        env = "ESDUMP_SCROLL_TIME",
        value_parser = esdump_core::parse_duration,
        default_value = "10m"
    )]
    #[serde(with = "humantime_serde")]
    pub scroll_time: Duration,

    /// Transfer every index of the input.
    #[arg(long, env = "ESDUMP_ALL")]
    #[serde(default)]
    pub all: bool,

    /// Indices skipped by `--all` (comma separated).
    #[arg(long, env = "ESDUMP_EXCLUDE", value_delimiter = ',')]
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Indices transferred at once by `--all`.
    #[arg(long, env = "ESDUMP_CONCURRENCY", default_value_t = 1)]
    pub concurrency: usize,
}

impl TransferArgs {
    /// Parses the search body.
    pub fn filter(&self) -> anyhow::Result<Option<Value>> {
        self.search_body
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .context("--search-body is not valid JSON")
    }

    /// Builds the engine options.
    pub fn options(&self, retry: RetryConfig) -> anyhow::Result<TransferOptions> {
        let mut builder = TransferOptions::builder()
            .with_limit(self.limit)
            .with_offset(self.offset)
            .with_kind(self.kind)
            .with_source_only(self.source_only)
            .with_line_format(self.line_format)
            .with_delete_after_transfer(self.delete)
            .with_cursor_lease(self.scroll_time)
            .with_fan_out_all(self.all)
            .with_exclude(self.exclude.clone())
            .with_fan_out_concurrency(self.concurrency)
            .with_retry(retry);
        if let Some(filter) = self.filter()? {
            builder = builder.with_filter(filter);
        }
        builder.build().context("invalid transfer options")
    }

    /// Logs the transfer options.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            kind = %self.kind,
            limit = self.limit,
            offset = self.offset,
            filtered = self.search_body.is_some(),
            source_only = self.source_only,
            line_format = self.line_format,
            delete = self.delete,
            all = self.all,
            concurrency = self.concurrency,
            "Transfer configuration"
        );
    }
}
